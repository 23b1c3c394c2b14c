pub mod ast;
pub mod parser;
pub mod types;
pub mod engine;
pub mod select;
pub mod distinct;
pub mod aggregate;
pub mod results;
pub mod params;
pub mod join;
pub mod intellisense;
