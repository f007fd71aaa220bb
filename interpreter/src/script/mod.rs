//! The embedded statement and expression language run by [`crate::ScriptEvaluator`].

pub mod ast;
pub mod lexer;
pub mod parser;

pub use parser::{parse_expression, parse_program};
