// Oracle output parsing
pub mod parser;

pub use parser::AdviceParser;
