//! The Devin interpreter
//!
//! Devin is a small educational imperative language with unbounded integers,
//! exact rationals, booleans, arrays, nested function declarations,
//! pass-by-value and pass-by-reference parameters, and structured control
//! flow. This crate implements the whole pipeline:
//!
//! ```text
//! Source Code (.dv)
//!       │
//!       ▼
//! ┌─────────────┐
//! │    Lexer    │  → Tokens
//! └─────────────┘
//!       │
//!       ▼
//! ┌─────────────┐
//! │   Parser    │  → AST
//! └─────────────┘
//!       │
//!       ▼
//! ┌─────────────┐
//! │  Type Check │  → Typed AST + diagnostics
//! └─────────────┘
//!       │
//!       ▼
//! ┌─────────────┐
//! │  Evaluator  │  → final state / runtime error
//! └─────────────┘
//! ```
//!
//! The stages compose linearly: a fatal diagnostic from an earlier stage
//! prevents the later ones. Everything runs single-threaded and strictly
//! left to right; there are no suspension points.

pub mod lexer;
pub mod token;
pub mod span;
pub mod ast;
pub mod parser;
pub mod typeck;
pub mod eval;

// Re-exports for convenience
pub use lexer::Lexer;
pub use span::Span;
pub use token::{Token, TokenKind};

/// Interpreter version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// File extension for Devin source files
pub const FILE_EXTENSION: &str = "dv";
