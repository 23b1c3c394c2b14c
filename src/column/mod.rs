pub mod string_block;
pub mod column;
