pub mod identity;
pub mod permissions;
pub mod secure_database;
