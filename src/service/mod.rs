pub mod checks;
pub mod management;
pub mod query_service;
