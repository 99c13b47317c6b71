//! Task checklist parsing

pub mod parser;

pub use parser::*;
