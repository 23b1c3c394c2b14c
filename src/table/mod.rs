pub mod partition;
pub mod table;
pub mod database;
