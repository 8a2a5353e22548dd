//! Runtime errors
//!
//! Every runtime error is fatal: it unwinds the entire evaluation and
//! carries the span of the offending node. The `UnknownVariable`,
//! `UnknownFunction`, `MissingReturnValue` and `TypeMismatch` kinds are
//! defenses against evaluating an unchecked AST; a checked program cannot
//! reach them.

use crate::span::Span;
use num_bigint::BigInt;
use std::fmt;
use thiserror::Error;

/// A fatal runtime error with the span it originated at
#[derive(Debug, Clone, PartialEq)]
pub struct EvalError {
    pub kind: EvalErrorKind,
    pub span: Span,
}

impl EvalError {
    pub fn new(kind: EvalErrorKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Kind of runtime error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalErrorKind {
    #[error("index {index} out of bounds for array of length {len}")]
    IndexOutOfBounds { index: BigInt, len: usize },

    #[error("division by zero")]
    DivisionByZero,

    #[error("assertion failed")]
    AssertionFailure,

    #[error("ref parameter expects an l-value argument")]
    RefExpectsLValue,

    #[error("no function `main` taking no arguments")]
    NoMain,

    #[error("function finished without returning a value")]
    MissingReturnValue,

    #[error("call stack depth exceeded")]
    StackOverflow,

    #[error("unknown variable `{0}`")]
    UnknownVariable(String),

    #[error("no matching function `{0}`")]
    UnknownFunction(String),

    #[error("value of unexpected type reached the interpreter")]
    TypeMismatch,
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.kind, self.span)
    }
}

impl std::error::Error for EvalError {}
