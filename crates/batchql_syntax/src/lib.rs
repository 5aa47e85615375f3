//! Syntax layer for batchql.
//!
//! This crate provides:
//! - `token`: Token kinds and token structures
//! - `lexer`: Tokenization
//! - `ast`: Owned abstract syntax tree for executable and type system documents
//! - `parser`: Recursive descent parser

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::*;
pub use lexer::Lexer;
pub use parser::{parse, ParseResult};
pub use token::{Token, TokenKind};
