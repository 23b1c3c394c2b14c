pub mod layout;
pub mod file_lock;
pub mod partition_file;
pub mod serialization;
