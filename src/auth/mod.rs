pub mod principal;
pub mod cache;
pub mod claims;
pub mod authorization;
