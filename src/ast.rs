//! Abstract Syntax Tree (AST) for Devin
//!
//! The AST represents the structure of a Devin program after parsing.
//! Each node carries the half-open byte span of the source text it was
//! parsed from; child spans nest strictly within their parents. Every node
//! renders a canonical source-equivalent string through [`fmt::Display`],
//! which the diagnostics use and which round-trips through the parser.

use crate::span::{Span, Spanned};
use num_bigint::BigInt;
use num_rational::BigRational;
use std::collections::HashMap;
use std::fmt;

/// A complete Devin program: an ordered list of top-level declarations
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub decls: Vec<Declaration>,
    pub span: Span,
}

/// Top-level (or nested) declarations
#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    /// Variable declaration: `var x: Int = 1;`
    Variable(VarDecl),

    /// Function declaration: `def f(ref a, i: Int): Int { ... }`
    Function(FnDecl),
}

impl Declaration {
    pub fn span(&self) -> Span {
        match self {
            Declaration::Variable(v) => v.span,
            Declaration::Function(f) => f.span,
        }
    }
}

/// Variable declaration
#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub name: Ident,
    pub annotation: Option<TypeExpr>,
    pub value: Expression,
    pub span: Span,
}

/// Function declaration
#[derive(Debug, Clone, PartialEq)]
pub struct FnDecl {
    pub name: Ident,
    pub params: Vec<Param>,
    pub return_type: Option<TypeExpr>,
    pub body: Statement,
    pub span: Span,
}

/// Function parameter, optionally pass-by-reference and optionally annotated
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Ident,
    pub is_ref: bool,
    pub annotation: Option<TypeExpr>,
    pub span: Span,
}

/// Identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}

/// A written type annotation
#[derive(Debug, Clone, PartialEq)]
pub struct TypeExpr {
    pub kind: TypeExprKind,
    pub span: Span,
}

/// Kind of written type
#[derive(Debug, Clone, PartialEq)]
pub enum TypeExprKind {
    /// Named type: `Int`, `Bool`, `Float`, `Unit` or a user id
    Named(String),

    /// Array type: `[Int]`
    Array(Box<TypeExpr>),
}

// ============ Statements ============

/// Statement
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StmtKind,
    pub span: Span,
}

/// Kind of statement
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// Expression statement: `f(x);`
    Expression(Expression),

    /// `if p s`
    If {
        predicate: Expression,
        then_branch: Box<Statement>,
    },

    /// `if p s1 else s2`
    IfElse {
        predicate: Expression,
        then_branch: Box<Statement>,
        else_branch: Box<Statement>,
    },

    /// `while p s`
    While {
        predicate: Expression,
        body: Box<Statement>,
    },

    /// `do s while p;` — the body runs at least once
    DoWhile {
        body: Box<Statement>,
        predicate: Expression,
    },

    /// `return;` or `return e;`
    Return(Option<Expression>),

    /// `assert e;`
    Assert(Expression),

    /// Block: `{ ... }`, a sequence of declarations-or-statements
    Block(Vec<Statement>),

    /// A declaration in statement position
    Declaration(Box<Declaration>),
}

impl Spanned for Statement {
    fn span(&self) -> Span {
        self.span
    }
}

// ============ Expressions ============

/// Expression
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub kind: ExprKind,
    pub span: Span,
}

/// Kind of expression
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Integer literal: `42` (unbounded)
    Integer(BigInt),

    /// Rational literal: `3.14` (exact)
    Rational(BigRational),

    /// Boolean literal: `true`, `false`
    Boolean(bool),

    /// Variable reference: `x`
    Variable(Ident),

    /// Array literal: `[1, 2, 3]`
    Array(Vec<Expression>),

    /// Function call: `f(a, b)`
    Call {
        callee: Ident,
        args: Vec<Expression>,
    },

    /// Unary operation: `-x`, `not b`, `len a`
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },

    /// Binary operation: `a + b`
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },

    /// Assignment: `x = v`, `a[i] += v`
    Assign {
        op: AssignOp,
        target: Box<Expression>,
        value: Box<Expression>,
    },

    /// Array indexing: `a[i]`
    Access {
        array: Box<Expression>,
        index: Box<Expression>,
    },

    /// Parenthesized expression: `(e)`
    Parenthesized(Box<Expression>),
}

impl Spanned for Expression {
    fn span(&self) -> Span {
        self.span
    }
}

/// Unary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    Not,
    Len,
}

impl UnaryOp {
    /// Word operators render with a space before their operand
    pub fn is_word(&self) -> bool {
        matches!(self, UnaryOp::Not | UnaryOp::Len)
    }
}

/// Binary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Rem,

    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    // Logical
    And,
    Or,
    Xor,
}

/// Assignment operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    RemAssign,
}

impl AssignOp {
    /// The arithmetic operator a compound assignment applies, if any
    pub fn binary_op(&self) -> Option<BinaryOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::AddAssign => Some(BinaryOp::Add),
            AssignOp::SubAssign => Some(BinaryOp::Sub),
            AssignOp::MulAssign => Some(BinaryOp::Mul),
            AssignOp::DivAssign => Some(BinaryOp::Div),
            AssignOp::RemAssign => Some(BinaryOp::Rem),
        }
    }
}

// ============ Canonical rendering ============

/// Render an exact rational as a decimal string.
///
/// When the reduced denominator has only 2 and 5 as prime factors the
/// expansion terminates; otherwise the repeating cycle is wrapped in
/// parentheses, e.g. `1/3` renders as `0.(3)`.
pub fn decimal_string(value: &BigRational) -> String {
    use num_traits::{Signed, Zero};

    let mut out = String::new();
    if value.is_negative() {
        out.push('-');
    }
    let numer = value.numer().abs();
    let denom = value.denom().clone();

    out.push_str((&numer / &denom).to_string().as_str());
    out.push('.');

    let mut rem = &numer % &denom;
    if rem.is_zero() {
        out.push('0');
        return out;
    }

    let ten = BigInt::from(10);
    let mut seen: HashMap<BigInt, usize> = HashMap::new();
    let mut digits = String::new();
    while !rem.is_zero() {
        if let Some(&at) = seen.get(&rem) {
            // The remainder recurred: everything from its first occurrence
            // on is the repeating cycle.
            digits.insert(at, '(');
            digits.push(')');
            break;
        }
        seen.insert(rem.clone(), digits.len());
        rem *= &ten;
        digits.push_str((&rem / &denom).to_string().as_str());
        rem %= &denom;
    }
    out.push_str(&digits);
    out
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, decl) in self.decls.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", decl)?;
        }
        Ok(())
    }
}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Declaration::Variable(v) => {
                write!(f, "var {}", v.name.name)?;
                if let Some(ty) = &v.annotation {
                    write!(f, ": {}", ty)?;
                }
                write!(f, " = {};", v.value)
            }
            Declaration::Function(d) => {
                write!(f, "def {}(", d.name.name)?;
                for (i, p) in d.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ")")?;
                if let Some(ty) = &d.return_type {
                    write!(f, ": {}", ty)?;
                }
                write!(f, " {}", d.body)
            }
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ref {
            write!(f, "ref ")?;
        }
        write!(f, "{}", self.name.name)?;
        if let Some(ty) = &self.annotation {
            write!(f, ": {}", ty)?;
        }
        Ok(())
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TypeExprKind::Named(name) => write!(f, "{}", name),
            TypeExprKind::Array(elem) => write!(f, "[{}]", elem),
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            StmtKind::Expression(e) => write!(f, "{};", e),
            StmtKind::If {
                predicate,
                then_branch,
            } => write!(f, "if {} {}", predicate, then_branch),
            StmtKind::IfElse {
                predicate,
                then_branch,
                else_branch,
            } => write!(f, "if {} {} else {}", predicate, then_branch, else_branch),
            StmtKind::While { predicate, body } => write!(f, "while {} {}", predicate, body),
            StmtKind::DoWhile { body, predicate } => {
                write!(f, "do {} while {};", body, predicate)
            }
            StmtKind::Return(None) => write!(f, "return;"),
            StmtKind::Return(Some(e)) => write!(f, "return {};", e),
            StmtKind::Assert(e) => write!(f, "assert {};", e),
            StmtKind::Block(stmts) => {
                if stmts.is_empty() {
                    return write!(f, "{{}}");
                }
                write!(f, "{{")?;
                for stmt in stmts {
                    write!(f, " {}", stmt)?;
                }
                write!(f, " }}")
            }
            StmtKind::Declaration(decl) => write!(f, "{}", decl),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Integer(i) => write!(f, "{}", i),
            ExprKind::Rational(r) => write!(f, "{}", decimal_string(r)),
            ExprKind::Boolean(b) => write!(f, "{}", b),
            ExprKind::Variable(id) => write!(f, "{}", id.name),
            ExprKind::Array(elems) => {
                write!(f, "[")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, "]")
            }
            ExprKind::Call { callee, args } => {
                write!(f, "{}(", callee.name)?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ")")
            }
            ExprKind::Unary { op, operand } => {
                if op.is_word() {
                    write!(f, "{} {}", op, operand)
                } else {
                    write!(f, "{}{}", op, operand)
                }
            }
            ExprKind::Binary { op, left, right } => write!(f, "{} {} {}", left, op, right),
            ExprKind::Assign { op, target, value } => write!(f, "{} {} {}", target, op, value),
            ExprKind::Access { array, index } => write!(f, "{}[{}]", array, index),
            ExprKind::Parenthesized(inner) => write!(f, "({})", inner),
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnaryOp::Plus => "+",
            UnaryOp::Minus => "-",
            UnaryOp::Not => "not",
            UnaryOp::Len => "len",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for AssignOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AssignOp::Assign => "=",
            AssignOp::AddAssign => "+=",
            AssignOp::SubAssign => "-=",
            AssignOp::MulAssign => "*=",
            AssignOp::DivAssign => "/=",
            AssignOp::RemAssign => "%=",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::One;

    fn rational(numer: i64, denom: i64) -> BigRational {
        BigRational::new(BigInt::from(numer), BigInt::from(denom))
    }

    #[test]
    fn test_decimal_string_terminating() {
        assert_eq!(decimal_string(&rational(1, 2)), "0.5");
        assert_eq!(decimal_string(&rational(5, 2)), "2.5");
        assert_eq!(decimal_string(&rational(-314, 100)), "-3.14");
        assert_eq!(decimal_string(&BigRational::one()), "1.0");
        assert_eq!(decimal_string(&rational(1, 40)), "0.025");
    }

    #[test]
    fn test_decimal_string_repeating() {
        assert_eq!(decimal_string(&rational(1, 3)), "0.(3)");
        assert_eq!(decimal_string(&rational(1, 7)), "0.(142857)");
        assert_eq!(decimal_string(&rational(1, 6)), "0.1(6)");
        assert_eq!(decimal_string(&rational(-4, 3)), "-1.(3)");
    }

    #[test]
    fn test_expression_display() {
        let span = Span::default();
        let expr = Expression {
            kind: ExprKind::Binary {
                op: BinaryOp::Add,
                left: Box::new(Expression {
                    kind: ExprKind::Integer(BigInt::from(1)),
                    span,
                }),
                right: Box::new(Expression {
                    kind: ExprKind::Unary {
                        op: UnaryOp::Minus,
                        operand: Box::new(Expression {
                            kind: ExprKind::Variable(Ident::new("x", span)),
                            span,
                        }),
                    },
                    span,
                }),
            },
            span,
        };
        assert_eq!(expr.to_string(), "1 + -x");
    }

    #[test]
    fn test_statement_display() {
        let span = Span::default();
        let predicate = Expression {
            kind: ExprKind::Boolean(true),
            span,
        };
        let body = Statement {
            kind: StmtKind::Block(vec![]),
            span,
        };
        let stmt = Statement {
            kind: StmtKind::While {
                predicate,
                body: Box::new(body),
            },
            span,
        };
        assert_eq!(stmt.to_string(), "while true {}");
    }
}
