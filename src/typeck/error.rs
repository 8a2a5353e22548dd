//! Type diagnostics
//!
//! Diagnostics are accumulated, never thrown: the checker keeps going after
//! each one, substituting `Ty::Error` to suppress cascades. Evaluation is
//! skipped whenever the diagnostics list is non-empty; warnings are kept on
//! a separate channel and block nothing.

use crate::ast::{AssignOp, BinaryOp, UnaryOp};
use crate::span::Span;
use crate::typeck::Ty;
use std::fmt;

/// A type-checking diagnostic
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDiagnostic {
    pub kind: TypeDiagnosticKind,
    pub span: Span,
}

/// Kind of type-checking diagnostic
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDiagnosticKind {
    UnknownType { name: String },
    UnknownVariable { name: String },
    UnknownFunction { name: String, args: Vec<Ty> },
    FunctionRedefinition { name: String },
    InvalidUnary { op: UnaryOp, operand: Ty },
    InvalidBinary { op: BinaryOp, left: Ty, right: Ty },
    InvalidAssign { op: AssignOp, target: Ty, value: Ty },
    InvalidType { expected: Ty, found: Ty },
    InvalidReturnType { expected: Ty, found: Ty },
    MissingReturnValue { expected: Ty },
    MissingReturnPath { name: String },
}

impl TypeDiagnostic {
    pub fn new(kind: TypeDiagnosticKind, span: Span) -> Self {
        Self { kind, span }
    }

    // ============ Constructors ============

    pub fn unknown_type(name: String, span: Span) -> Self {
        Self::new(TypeDiagnosticKind::UnknownType { name }, span)
    }

    pub fn unknown_variable(name: String, span: Span) -> Self {
        Self::new(TypeDiagnosticKind::UnknownVariable { name }, span)
    }

    pub fn unknown_function(name: String, args: Vec<Ty>, span: Span) -> Self {
        Self::new(TypeDiagnosticKind::UnknownFunction { name, args }, span)
    }

    pub fn function_redefinition(name: String, span: Span) -> Self {
        Self::new(TypeDiagnosticKind::FunctionRedefinition { name }, span)
    }

    pub fn invalid_unary(op: UnaryOp, operand: Ty, span: Span) -> Self {
        Self::new(TypeDiagnosticKind::InvalidUnary { op, operand }, span)
    }

    pub fn invalid_binary(op: BinaryOp, left: Ty, right: Ty, span: Span) -> Self {
        Self::new(TypeDiagnosticKind::InvalidBinary { op, left, right }, span)
    }

    pub fn invalid_assign(op: AssignOp, target: Ty, value: Ty, span: Span) -> Self {
        Self::new(TypeDiagnosticKind::InvalidAssign { op, target, value }, span)
    }

    pub fn invalid_type(expected: Ty, found: Ty, span: Span) -> Self {
        Self::new(TypeDiagnosticKind::InvalidType { expected, found }, span)
    }

    pub fn invalid_return_type(expected: Ty, found: Ty, span: Span) -> Self {
        Self::new(TypeDiagnosticKind::InvalidReturnType { expected, found }, span)
    }

    pub fn missing_return_value(expected: Ty, span: Span) -> Self {
        Self::new(TypeDiagnosticKind::MissingReturnValue { expected }, span)
    }

    pub fn missing_return_path(name: String, span: Span) -> Self {
        Self::new(TypeDiagnosticKind::MissingReturnPath { name }, span)
    }
}

impl fmt::Display for TypeDiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDiagnosticKind::UnknownType { name } => {
                write!(f, "unknown type `{}`", name)
            }
            TypeDiagnosticKind::UnknownVariable { name } => {
                write!(f, "unknown variable `{}`", name)
            }
            TypeDiagnosticKind::UnknownFunction { name, args } => {
                write!(f, "no function `{}` accepting (", name)?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ")")
            }
            TypeDiagnosticKind::FunctionRedefinition { name } => {
                write!(f, "function `{}` is already defined with this signature", name)
            }
            TypeDiagnosticKind::InvalidUnary { op, operand } => {
                write!(f, "unary `{}` cannot be applied to {}", op, operand)
            }
            TypeDiagnosticKind::InvalidBinary { op, left, right } => {
                write!(f, "`{}` cannot be applied to {} and {}", op, left, right)
            }
            TypeDiagnosticKind::InvalidAssign { op, target, value } => {
                write!(f, "cannot assign with `{}` from {} to {}", op, value, target)
            }
            TypeDiagnosticKind::InvalidType { expected, found } => {
                write!(f, "expected {}, found {}", expected, found)
            }
            TypeDiagnosticKind::InvalidReturnType { expected, found } => {
                write!(f, "return type mismatch: expected {}, found {}", expected, found)
            }
            TypeDiagnosticKind::MissingReturnValue { expected } => {
                write!(f, "bare `return` in a function returning {}", expected)
            }
            TypeDiagnosticKind::MissingReturnPath { name } => {
                write!(f, "function `{}` may finish without returning a value", name)
            }
        }
    }
}

impl fmt::Display for TypeDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.kind, self.span)
    }
}

/// A non-fatal warning; never blocks evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct TypeWarning {
    pub kind: TypeWarningKind,
    pub span: Span,
}

/// Kind of type-checking warning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeWarningKind {
    /// An expression statement with no call or assignment anywhere inside
    /// it cannot have an effect
    NoSideEffects,
}

impl fmt::Display for TypeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TypeWarningKind::NoSideEffects => {
                write!(f, "expression statement has no effect at {}", self.span)
            }
        }
    }
}
