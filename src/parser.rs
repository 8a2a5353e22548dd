//! Parser for Devin
//!
//! This is a recursive descent parser that converts tokens into an AST.
//! Expression precedence is implemented as a sequence of left-folding
//! layers, one per level. The parser does not recover: the first failure
//! aborts the parse and is reported alone, with the expected-set of the
//! deepest alternative.

use crate::ast::*;
use crate::lexer::Lexer;
use crate::span::Span;
use crate::token::{Token, TokenKind};
use num_bigint::BigInt;
use num_rational::BigRational;
use std::cmp::Ordering;
use thiserror::Error;

/// Parse failure: position, expected set, and whether the parser had
/// already committed to the failing production.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("expected {}, found {found} at {span}", expected_list(.expected))]
pub struct ParseError {
    pub span: Span,
    pub found: TokenKind,
    pub expected: Vec<String>,
    pub committed: bool,
}

impl ParseError {
    /// Combine the failures of two alternatives: the one that got further
    /// wins; at the same position the expected sets are unioned.
    pub fn merge(self, other: ParseError) -> ParseError {
        match self.span.start.cmp(&other.span.start) {
            Ordering::Greater => self,
            Ordering::Less => other,
            Ordering::Equal => {
                let mut expected = self.expected;
                for e in other.expected {
                    if !expected.contains(&e) {
                        expected.push(e);
                    }
                }
                ParseError { expected, ..self }
            }
        }
    }
}

fn expected_list(items: &[String]) -> String {
    match items.split_last() {
        None => "nothing".to_string(),
        Some((last, [])) => last.clone(),
        Some((last, rest)) => format!("{} or {}", rest.join(", "), last),
    }
}

/// Parse result
pub type ParseResult<T> = Result<T, ParseError>;

/// The parser for Devin
pub struct Parser<'src> {
    lexer: Lexer<'src>,
    current: Token,
    previous: Token,
}

impl<'src> Parser<'src> {
    /// Create a new parser
    pub fn new(source: &'src str) -> Self {
        let mut lexer = Lexer::new(source);
        let current = lexer
            .next_token()
            .unwrap_or(Token::new(TokenKind::Eof, Span::new(source.len(), source.len())));
        let previous = current.clone();

        Self {
            lexer,
            current,
            previous,
        }
    }

    /// Get the source code
    pub fn source(&self) -> &'src str {
        self.lexer.source()
    }

    /// Advance to next token
    fn advance(&mut self) -> Token {
        self.previous = self.current.clone();
        self.current = self.lexer.next_token().unwrap_or(Token::new(
            TokenKind::Eof,
            Span::new(self.source().len(), self.source().len()),
        ));
        self.previous.clone()
    }

    /// Check if current token matches
    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    /// Check if at end of file
    fn is_at_end(&self) -> bool {
        self.check(TokenKind::Eof)
    }

    /// Consume token if it matches, otherwise error
    fn expect(&mut self, kind: TokenKind) -> ParseResult<Token> {
        if self.check(kind.clone()) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(vec![kind.to_string()], true))
        }
    }

    /// Consume token if it matches
    fn consume(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Get text of a token
    fn text(&self, token: &Token) -> &'src str {
        token.text(self.source())
    }

    /// Build a failure at the current token
    fn unexpected(&self, expected: Vec<String>, committed: bool) -> ParseError {
        ParseError {
            span: self.current.span,
            found: self.current.kind.clone(),
            expected,
            committed,
        }
    }

    // ============ Top-level parsing ============

    /// Parse a complete program
    pub fn parse_program(&mut self) -> ParseResult<Program> {
        let start = self.current.span.start;
        let mut decls = Vec::new();

        while !self.is_at_end() {
            decls.push(self.parse_declaration()?);
        }

        let end = self.previous.span.end;
        Ok(Program {
            decls,
            span: Span::new(start, end),
        })
    }

    /// Parse a declaration (`var` or `def`)
    fn parse_declaration(&mut self) -> ParseResult<Declaration> {
        match self.current.kind {
            TokenKind::Var => self.parse_var_decl().map(Declaration::Variable),
            TokenKind::Def => self.parse_fn_decl().map(Declaration::Function),
            _ => Err(self.unexpected(vec!["var".to_string(), "def".to_string()], false)),
        }
    }

    fn parse_var_decl(&mut self) -> ParseResult<VarDecl> {
        let start = self.current.span.start;
        self.expect(TokenKind::Var)?;
        let name = self.parse_ident()?;

        let annotation = if self.consume(TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };

        self.expect(TokenKind::Eq)?;
        let value = self.parse_expression()?;
        self.expect(TokenKind::Semicolon)?;

        Ok(VarDecl {
            name,
            annotation,
            value,
            span: Span::new(start, self.previous.span.end),
        })
    }

    fn parse_fn_decl(&mut self) -> ParseResult<FnDecl> {
        let start = self.current.span.start;
        self.expect(TokenKind::Def)?;
        let name = self.parse_ident()?;

        self.expect(TokenKind::LParen)?;
        let params = self.parse_params()?;
        self.expect(TokenKind::RParen)?;

        let return_type = if self.consume(TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };

        let body = self.parse_statement()?;

        Ok(FnDecl {
            name,
            params,
            return_type,
            body,
            span: Span::new(start, self.previous.span.end),
        })
    }

    fn parse_params(&mut self) -> ParseResult<Vec<Param>> {
        let mut params = Vec::new();

        if !self.check(TokenKind::RParen) {
            loop {
                params.push(self.parse_param()?);
                if !self.consume(TokenKind::Comma) {
                    break;
                }
            }
        }

        Ok(params)
    }

    fn parse_param(&mut self) -> ParseResult<Param> {
        let start = self.current.span.start;
        let is_ref = self.consume(TokenKind::Ref);
        let name = self.parse_ident()?;

        let annotation = if self.consume(TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };

        Ok(Param {
            name,
            is_ref,
            annotation,
            span: Span::new(start, self.previous.span.end),
        })
    }

    fn parse_ident(&mut self) -> ParseResult<Ident> {
        if self.check(TokenKind::Ident) {
            let token = self.advance();
            Ok(Ident::new(self.text(&token), token.span))
        } else {
            Err(self.unexpected(vec!["identifier".to_string()], true))
        }
    }

    /// Parse a written type: an identifier or `[` type `]`
    fn parse_type(&mut self) -> ParseResult<TypeExpr> {
        let start = self.current.span.start;
        match self.current.kind {
            TokenKind::Ident => {
                let token = self.advance();
                Ok(TypeExpr {
                    kind: TypeExprKind::Named(self.text(&token).to_string()),
                    span: token.span,
                })
            }
            TokenKind::LBracket => {
                self.advance();
                let elem = self.parse_type()?;
                self.expect(TokenKind::RBracket)?;
                Ok(TypeExpr {
                    kind: TypeExprKind::Array(Box::new(elem)),
                    span: Span::new(start, self.previous.span.end),
                })
            }
            _ => Err(self.unexpected(vec!["identifier".to_string(), "[".to_string()], true)),
        }
    }

    // ============ Statement parsing ============

    fn parse_statement(&mut self) -> ParseResult<Statement> {
        match self.current.kind {
            TokenKind::LBrace => self.parse_block(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::Do => self.parse_do_while(),
            TokenKind::Return => self.parse_return(),
            TokenKind::Assert => self.parse_assert(),
            TokenKind::Var | TokenKind::Def => {
                let decl = self.parse_declaration()?;
                let span = decl.span();
                Ok(Statement {
                    kind: StmtKind::Declaration(Box::new(decl)),
                    span,
                })
            }
            _ => {
                // Expression statement, or nothing valid at all: report the
                // union of what an expression and a statement could start
                // with, unless the expression parser got further.
                let start = self.current.span.start;
                let alternative = self.unexpected(
                    vec![
                        "if".to_string(),
                        "while".to_string(),
                        "do".to_string(),
                        "return".to_string(),
                        "assert".to_string(),
                        "var".to_string(),
                        "def".to_string(),
                        "{".to_string(),
                    ],
                    false,
                );
                let expr = self
                    .parse_expression()
                    .map_err(|e| if e.committed { e } else { e.merge(alternative) })?;
                self.expect(TokenKind::Semicolon)?;
                Ok(Statement {
                    span: Span::new(start, self.previous.span.end),
                    kind: StmtKind::Expression(expr),
                })
            }
        }
    }

    fn parse_block(&mut self) -> ParseResult<Statement> {
        let start = self.current.span.start;
        self.expect(TokenKind::LBrace)?;

        let mut stmts = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            stmts.push(self.parse_statement()?);
        }

        self.expect(TokenKind::RBrace)?;
        Ok(Statement {
            kind: StmtKind::Block(stmts),
            span: Span::new(start, self.previous.span.end),
        })
    }

    fn parse_if(&mut self) -> ParseResult<Statement> {
        let start = self.current.span.start;
        self.expect(TokenKind::If)?;
        let predicate = self.parse_expression()?;
        let then_branch = Box::new(self.parse_statement()?);

        // `else` binds to the nearest open `if`
        let kind = if self.consume(TokenKind::Else) {
            let else_branch = Box::new(self.parse_statement()?);
            StmtKind::IfElse {
                predicate,
                then_branch,
                else_branch,
            }
        } else {
            StmtKind::If {
                predicate,
                then_branch,
            }
        };

        Ok(Statement {
            kind,
            span: Span::new(start, self.previous.span.end),
        })
    }

    fn parse_while(&mut self) -> ParseResult<Statement> {
        let start = self.current.span.start;
        self.expect(TokenKind::While)?;
        let predicate = self.parse_expression()?;
        let body = Box::new(self.parse_statement()?);

        Ok(Statement {
            kind: StmtKind::While { predicate, body },
            span: Span::new(start, self.previous.span.end),
        })
    }

    fn parse_do_while(&mut self) -> ParseResult<Statement> {
        let start = self.current.span.start;
        self.expect(TokenKind::Do)?;
        let body = Box::new(self.parse_statement()?);
        self.expect(TokenKind::While)?;
        let predicate = self.parse_expression()?;
        self.expect(TokenKind::Semicolon)?;

        Ok(Statement {
            kind: StmtKind::DoWhile { body, predicate },
            span: Span::new(start, self.previous.span.end),
        })
    }

    fn parse_return(&mut self) -> ParseResult<Statement> {
        let start = self.current.span.start;
        self.expect(TokenKind::Return)?;

        let value = if self.consume(TokenKind::Semicolon) {
            None
        } else {
            let value = self.parse_expression()?;
            self.expect(TokenKind::Semicolon)?;
            Some(value)
        };

        Ok(Statement {
            kind: StmtKind::Return(value),
            span: Span::new(start, self.previous.span.end),
        })
    }

    fn parse_assert(&mut self) -> ParseResult<Statement> {
        let start = self.current.span.start;
        self.expect(TokenKind::Assert)?;
        let expr = self.parse_expression()?;
        self.expect(TokenKind::Semicolon)?;

        Ok(Statement {
            kind: StmtKind::Assert(expr),
            span: Span::new(start, self.previous.span.end),
        })
    }

    // ============ Expression parsing ============

    pub fn parse_expression(&mut self) -> ParseResult<Expression> {
        self.parse_logical()
    }

    fn parse_logical(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_equality()?;

        loop {
            let op = match self.current.kind {
                TokenKind::And => BinaryOp::And,
                TokenKind::Or => BinaryOp::Or,
                TokenKind::Xor => BinaryOp::Xor,
                _ => break,
            };
            self.advance();
            let start = expr.span.start;
            let right = self.parse_equality()?;
            expr = Expression {
                kind: ExprKind::Binary {
                    op,
                    left: Box::new(expr),
                    right: Box::new(right),
                },
                span: Span::new(start, self.previous.span.end),
            };
        }

        Ok(expr)
    }

    fn parse_equality(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_relational()?;

        loop {
            let op = match self.current.kind {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::Ne,
                _ => break,
            };
            self.advance();
            let start = expr.span.start;
            let right = self.parse_relational()?;
            expr = Expression {
                kind: ExprKind::Binary {
                    op,
                    left: Box::new(expr),
                    right: Box::new(right),
                },
                span: Span::new(start, self.previous.span.end),
            };
        }

        Ok(expr)
    }

    fn parse_relational(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_additive()?;

        loop {
            let op = match self.current.kind {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::LtEq => BinaryOp::Le,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::GtEq => BinaryOp::Ge,
                _ => break,
            };
            self.advance();
            let start = expr.span.start;
            let right = self.parse_additive()?;
            expr = Expression {
                kind: ExprKind::Binary {
                    op,
                    left: Box::new(expr),
                    right: Box::new(right),
                },
                span: Span::new(start, self.previous.span.end),
            };
        }

        Ok(expr)
    }

    fn parse_additive(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_multiplicative()?;

        loop {
            let op = match self.current.kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let start = expr.span.start;
            let right = self.parse_multiplicative()?;
            expr = Expression {
                kind: ExprKind::Binary {
                    op,
                    left: Box::new(expr),
                    right: Box::new(right),
                },
                span: Span::new(start, self.previous.span.end),
            };
        }

        Ok(expr)
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_postfix()?;

        loop {
            let op = match self.current.kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Rem,
                _ => break,
            };
            self.advance();
            let start = expr.span.start;
            let right = self.parse_postfix()?;
            expr = Expression {
                kind: ExprKind::Binary {
                    op,
                    left: Box::new(expr),
                    right: Box::new(right),
                },
                span: Span::new(start, self.previous.span.end),
            };
        }

        Ok(expr)
    }

    /// Index chains, then an optional trailing assignment. The parser
    /// accepts any indexable expression as an assignment target; l-value
    /// validity is the type checker's concern.
    fn parse_postfix(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_primary()?;

        while self.consume(TokenKind::LBracket) {
            let index = self.parse_expression()?;
            self.expect(TokenKind::RBracket)?;
            let start = expr.span.start;
            expr = Expression {
                kind: ExprKind::Access {
                    array: Box::new(expr),
                    index: Box::new(index),
                },
                span: Span::new(start, self.previous.span.end),
            };
        }

        let op = match self.current.kind {
            TokenKind::Eq => Some(AssignOp::Assign),
            TokenKind::PlusEq => Some(AssignOp::AddAssign),
            TokenKind::MinusEq => Some(AssignOp::SubAssign),
            TokenKind::StarEq => Some(AssignOp::MulAssign),
            TokenKind::SlashEq => Some(AssignOp::DivAssign),
            TokenKind::PercentEq => Some(AssignOp::RemAssign),
            _ => None,
        };

        if let Some(op) = op {
            self.advance();
            let start = expr.span.start;
            let value = self.parse_expression()?;
            expr = Expression {
                kind: ExprKind::Assign {
                    op,
                    target: Box::new(expr),
                    value: Box::new(value),
                },
                span: Span::new(start, self.previous.span.end),
            };
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> ParseResult<Expression> {
        let start = self.current.span.start;

        match self.current.kind {
            TokenKind::IntLiteral => {
                let token = self.advance();
                let value = self.int_literal(&token)?;
                Ok(Expression {
                    kind: ExprKind::Integer(value),
                    span: token.span,
                })
            }
            TokenKind::FloatLiteral => {
                let token = self.advance();
                let value = self.rational_literal(&token)?;
                Ok(Expression {
                    kind: ExprKind::Rational(value),
                    span: token.span,
                })
            }
            TokenKind::True => {
                let token = self.advance();
                Ok(Expression {
                    kind: ExprKind::Boolean(true),
                    span: token.span,
                })
            }
            TokenKind::False => {
                let token = self.advance();
                Ok(Expression {
                    kind: ExprKind::Boolean(false),
                    span: token.span,
                })
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elems = Vec::new();
                if !self.check(TokenKind::RBracket) {
                    loop {
                        elems.push(self.parse_expression()?);
                        if !self.consume(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RBracket)?;
                Ok(Expression {
                    kind: ExprKind::Array(elems),
                    span: Span::new(start, self.previous.span.end),
                })
            }
            TokenKind::Plus | TokenKind::Minus | TokenKind::Not | TokenKind::Len => {
                let op = match self.current.kind {
                    TokenKind::Plus => UnaryOp::Plus,
                    TokenKind::Minus => UnaryOp::Minus,
                    TokenKind::Not => UnaryOp::Not,
                    _ => UnaryOp::Len,
                };
                self.advance();
                let operand = self.parse_postfix()?;
                Ok(Expression {
                    kind: ExprKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                    span: Span::new(start, self.previous.span.end),
                })
            }
            TokenKind::Ident => {
                let name = self.parse_ident()?;
                if self.consume(TokenKind::LParen) {
                    let mut args = Vec::new();
                    if !self.check(TokenKind::RParen) {
                        loop {
                            args.push(self.parse_expression()?);
                            if !self.consume(TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(TokenKind::RParen)?;
                    Ok(Expression {
                        kind: ExprKind::Call { callee: name, args },
                        span: Span::new(start, self.previous.span.end),
                    })
                } else {
                    let span = name.span;
                    Ok(Expression {
                        kind: ExprKind::Variable(name),
                        span,
                    })
                }
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(TokenKind::RParen)?;
                Ok(Expression {
                    kind: ExprKind::Parenthesized(Box::new(inner)),
                    span: Span::new(start, self.previous.span.end),
                })
            }
            _ => Err(self.unexpected(
                vec![
                    "integer".to_string(),
                    "rational".to_string(),
                    "true".to_string(),
                    "false".to_string(),
                    "identifier".to_string(),
                    "[".to_string(),
                    "(".to_string(),
                    "+".to_string(),
                    "-".to_string(),
                    "not".to_string(),
                    "len".to_string(),
                ],
                false,
            )),
        }
    }

    // ============ Literal conversion ============

    fn int_literal(&self, token: &Token) -> ParseResult<BigInt> {
        self.text(token).parse().map_err(|_| ParseError {
            span: token.span,
            found: TokenKind::IntLiteral,
            expected: vec!["integer".to_string()],
            committed: true,
        })
    }

    fn rational_literal(&self, token: &Token) -> ParseResult<BigRational> {
        let text = self.text(token);
        let malformed = || ParseError {
            span: token.span,
            found: TokenKind::FloatLiteral,
            expected: vec!["rational".to_string()],
            committed: true,
        };
        let (whole, frac) = text.split_once('.').ok_or_else(malformed)?;
        let digits = format!("{}{}", whole, frac);
        let numer: BigInt = digits.parse().map_err(|_| malformed())?;
        let denom = BigInt::from(10).pow(frac.len() as u32);
        Ok(BigRational::new(numer, denom))
    }
}

/// Parse source code into an AST
pub fn parse(source: &str) -> (Program, Vec<ParseError>) {
    let mut parser = Parser::new(source);
    match parser.parse_program() {
        Ok(program) => (program, Vec::new()),
        Err(error) => (
            Program {
                decls: Vec::new(),
                span: Span::new(0, source.len()),
            },
            vec![error],
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Program {
        let (program, errors) = parse(source);
        assert!(errors.is_empty(), "Parse errors: {:?}", errors);
        program
    }

    fn parse_err(source: &str) -> ParseError {
        let (_, mut errors) = parse(source);
        assert_eq!(errors.len(), 1, "Expected a parse error for {:?}", source);
        errors.remove(0)
    }

    fn parse_expr(source: &str) -> Expression {
        let program = parse_ok(&format!("var it = {};", source));
        match program.decls.into_iter().next() {
            Some(Declaration::Variable(v)) => v.value,
            other => panic!("Expected variable declaration, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_program() {
        let program = parse_ok("");
        assert!(program.decls.is_empty());
    }

    #[test]
    fn test_var_declaration() {
        let program = parse_ok("var x = 1;");
        if let Declaration::Variable(v) = &program.decls[0] {
            assert_eq!(v.name.name, "x");
            assert!(v.annotation.is_none());
        } else {
            panic!("Expected variable declaration");
        }
    }

    #[test]
    fn test_var_declaration_with_annotation() {
        let program = parse_ok("var xs: [Int] = [];");
        if let Declaration::Variable(v) = &program.decls[0] {
            let ann = v.annotation.as_ref().expect("annotation");
            assert_eq!(ann.to_string(), "[Int]");
        } else {
            panic!("Expected variable declaration");
        }
    }

    #[test]
    fn test_function_declaration() {
        let program = parse_ok("def update(ref a: [Int], i: Int, v: Int): Unit { a[i] = v; }");
        if let Declaration::Function(d) = &program.decls[0] {
            assert_eq!(d.name.name, "update");
            assert_eq!(d.params.len(), 3);
            assert!(d.params[0].is_ref);
            assert!(!d.params[1].is_ref);
            assert_eq!(d.return_type.as_ref().map(|t| t.to_string()), Some("Unit".into()));
        } else {
            panic!("Expected function declaration");
        }
    }

    #[test]
    fn test_multiplicative_binds_tighter_than_additive() {
        let expr = parse_expr("1 + 2 * 3");
        assert_eq!(expr.to_string(), "1 + 2 * 3");
        if let ExprKind::Binary { op, right, .. } = &expr.kind {
            assert_eq!(*op, BinaryOp::Add);
            assert!(matches!(
                right.kind,
                ExprKind::Binary {
                    op: BinaryOp::Mul,
                    ..
                }
            ));
        } else {
            panic!("Expected binary expression");
        }
    }

    #[test]
    fn test_logical_is_lowest() {
        let expr = parse_expr("x == 1 and y < 2");
        if let ExprKind::Binary { op, left, right } = &expr.kind {
            assert_eq!(*op, BinaryOp::And);
            assert!(matches!(left.kind, ExprKind::Binary { op: BinaryOp::Eq, .. }));
            assert!(matches!(right.kind, ExprKind::Binary { op: BinaryOp::Lt, .. }));
        } else {
            panic!("Expected logical expression");
        }
    }

    #[test]
    fn test_left_associativity() {
        let expr = parse_expr("1 - 2 - 3");
        if let ExprKind::Binary { op, left, .. } = &expr.kind {
            assert_eq!(*op, BinaryOp::Sub);
            assert!(matches!(left.kind, ExprKind::Binary { op: BinaryOp::Sub, .. }));
        } else {
            panic!("Expected binary expression");
        }
    }

    #[test]
    fn test_unary_binds_to_postfix() {
        let expr = parse_expr("-a[0]");
        if let ExprKind::Unary { op, operand } = &expr.kind {
            assert_eq!(*op, UnaryOp::Minus);
            assert!(matches!(operand.kind, ExprKind::Access { .. }));
        } else {
            panic!("Expected unary expression");
        }
    }

    #[test]
    fn test_len_of_call() {
        let expr = parse_expr("len tail(xs)");
        if let ExprKind::Unary { op, operand } = &expr.kind {
            assert_eq!(*op, UnaryOp::Len);
            assert!(matches!(operand.kind, ExprKind::Call { .. }));
        } else {
            panic!("Expected unary expression");
        }
    }

    #[test]
    fn test_index_chain() {
        let expr = parse_expr("m[0][1]");
        if let ExprKind::Access { array, .. } = &expr.kind {
            assert!(matches!(array.kind, ExprKind::Access { .. }));
        } else {
            panic!("Expected access expression");
        }
    }

    #[test]
    fn test_assignment_is_right_nested() {
        let expr = parse_expr("x = y = 1");
        if let ExprKind::Assign { op, value, .. } = &expr.kind {
            assert_eq!(*op, AssignOp::Assign);
            assert!(matches!(value.kind, ExprKind::Assign { .. }));
        } else {
            panic!("Expected assignment");
        }
    }

    #[test]
    fn test_compound_assignment_to_element() {
        let expr = parse_expr("a[1] += 2");
        if let ExprKind::Assign { op, target, .. } = &expr.kind {
            assert_eq!(*op, AssignOp::AddAssign);
            assert!(matches!(target.kind, ExprKind::Access { .. }));
        } else {
            panic!("Expected assignment");
        }
    }

    #[test]
    fn test_array_literals() {
        assert!(matches!(parse_expr("[]").kind, ExprKind::Array(ref v) if v.is_empty()));
        assert!(matches!(parse_expr("[1, 2, 3]").kind, ExprKind::Array(ref v) if v.len() == 3));
        assert!(
            matches!(parse_expr("[[1, 2], [3, 4]]").kind, ExprKind::Array(ref v) if v.len() == 2)
        );
    }

    #[test]
    fn test_call_vs_variable() {
        assert!(matches!(parse_expr("f(1, 2)").kind, ExprKind::Call { .. }));
        assert!(matches!(parse_expr("f").kind, ExprKind::Variable(_)));
    }

    #[test]
    fn test_rational_literal_is_exact() {
        let expr = parse_expr("2.50");
        if let ExprKind::Rational(r) = &expr.kind {
            assert_eq!(
                *r,
                BigRational::new(BigInt::from(5), BigInt::from(2))
            );
        } else {
            panic!("Expected rational literal");
        }
    }

    #[test]
    fn test_else_binds_to_nearest_if() {
        let program = parse_ok("def f() { if a if b return 1; else return 2; }");
        if let Declaration::Function(d) = &program.decls[0] {
            if let StmtKind::Block(stmts) = &d.body.kind {
                assert!(matches!(stmts[0].kind, StmtKind::If { .. }));
                if let StmtKind::If { then_branch, .. } = &stmts[0].kind {
                    assert!(matches!(then_branch.kind, StmtKind::IfElse { .. }));
                }
            } else {
                panic!("Expected block body");
            }
        } else {
            panic!("Expected function");
        }
    }

    #[test]
    fn test_do_while() {
        let program = parse_ok("def f() { do { x += 1; } while x < 10; }");
        if let Declaration::Function(d) = &program.decls[0] {
            if let StmtKind::Block(stmts) = &d.body.kind {
                assert!(matches!(stmts[0].kind, StmtKind::DoWhile { .. }));
            } else {
                panic!("Expected block body");
            }
        } else {
            panic!("Expected function");
        }
    }

    #[test]
    fn test_nested_function_declaration() {
        let program = parse_ok("def outer() { def inner(): Int { return 1; } return; }");
        if let Declaration::Function(d) = &program.decls[0] {
            if let StmtKind::Block(stmts) = &d.body.kind {
                assert!(matches!(stmts[0].kind, StmtKind::Declaration(_)));
            } else {
                panic!("Expected block body");
            }
        } else {
            panic!("Expected function");
        }
    }

    #[test]
    fn test_spans_cover_input() {
        let source = "def main() { assert 1 == 1; }";
        let program = parse_ok(source);
        assert_eq!(program.span, Span::new(0, source.len()));
        let decl_span = program.decls[0].span();
        assert!(program.span.contains(decl_span));
    }

    #[test]
    fn test_display_round_trip() {
        let sources = [
            "var x = 1;",
            "var xs: [Int] = [1, -2, 3];",
            "def main() { var z = 2 * y + x; assert z == 5; }",
            "def f(ref a, i) { a[i] = (a[i] + 1) * 2; }",
            "def g(): Int { if x > 0 return 1; else return -1; }",
            "def h() { do { x -= 1.5; } while x > 0.0; }",
            "def k() { while not done or len xs != 0 { step(); } }",
        ];
        for source in sources {
            let first = parse_ok(source).to_string();
            let second = parse_ok(&first).to_string();
            assert_eq!(first, second, "Round trip failed for {:?}", source);
        }
    }

    #[test]
    fn test_error_position_and_expected_set() {
        let error = parse_err("var x = ;");
        assert_eq!(error.span.start, 8);
        assert!(error.expected.contains(&"integer".to_string()));
        assert!(error.expected.contains(&"identifier".to_string()));
    }

    #[test]
    fn test_statement_error_merges_expected_sets() {
        let error = parse_err("def f() { ] }");
        assert!(error.expected.contains(&"identifier".to_string()));
        assert!(error.expected.contains(&"return".to_string()));
        assert!(error.expected.contains(&"if".to_string()));
    }

    #[test]
    fn test_missing_semicolon() {
        let error = parse_err("var x = 1");
        assert_eq!(error.expected, vec![";".to_string()]);
        assert!(error.committed);
    }

    #[test]
    fn test_declaration_expected_at_top_level() {
        let error = parse_err("42;");
        assert_eq!(error.expected, vec!["var".to_string(), "def".to_string()]);
    }
}
