pub mod types;
pub mod config;
pub mod details;
pub mod error;
