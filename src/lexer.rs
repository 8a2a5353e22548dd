//! Lexer for Devin
//!
//! The lexer converts source code into a stream of tokens.
//! It uses the `logos` crate for efficient lexing.

use crate::span::Span;
use crate::token::{Token, TokenKind};
use logos::Logos;
use thiserror::Error;

/// Lexer errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LexerError {
    #[error("unexpected character at position {0}")]
    UnexpectedChar(usize),
}

/// The lexer for Devin
pub struct Lexer<'src> {
    source: &'src str,
    inner: logos::Lexer<'src, TokenKind>,
    peeked: Option<Token>,
    errors: Vec<LexerError>,
}

impl<'src> Lexer<'src> {
    /// Create a new lexer for the given source code
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            inner: TokenKind::lexer(source),
            peeked: None,
            errors: Vec::new(),
        }
    }

    /// Get the source code
    pub fn source(&self) -> &'src str {
        self.source
    }

    /// Get any errors that occurred during lexing
    pub fn errors(&self) -> &[LexerError] {
        &self.errors
    }

    /// Peek at the next token without consuming it
    pub fn peek(&mut self) -> Option<&Token> {
        if self.peeked.is_none() {
            self.peeked = self.next_token();
        }
        self.peeked.as_ref()
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Option<Token> {
        // Return peeked token if available
        if let Some(token) = self.peeked.take() {
            return Some(token);
        }

        loop {
            match self.inner.next() {
                Some(Ok(kind)) => {
                    let span = self.inner.span();
                    return Some(Token::new(kind, Span::new(span.start, span.end)));
                }
                Some(Err(())) => {
                    // Skip invalid tokens and record error
                    let span = self.inner.span();
                    self.errors.push(LexerError::UnexpectedChar(span.start));
                    continue;
                }
                None => {
                    // End of input - return EOF token
                    let pos = self.source.len();
                    return Some(Token::new(TokenKind::Eof, Span::new(pos, pos)));
                }
            }
        }
    }

    /// Collect all tokens into a vector
    pub fn tokenize(mut self) -> (Vec<Token>, Vec<LexerError>) {
        let mut tokens = Vec::new();

        loop {
            match self.next_token() {
                Some(token) if token.kind == TokenKind::Eof => {
                    tokens.push(token);
                    break;
                }
                Some(token) => tokens.push(token),
                None => break,
            }
        }

        (tokens, self.errors)
    }
}

impl<'src> Iterator for Lexer<'src> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        let token = self.next_token()?;
        if token.kind == TokenKind::Eof {
            None
        } else {
            Some(token)
        }
    }
}

/// Helper function to lex source code
pub fn lex(source: &str) -> (Vec<Token>, Vec<LexerError>) {
    Lexer::new(source).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_kinds(source: &str) -> Vec<TokenKind> {
        let (tokens, _) = lex(source);
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_empty_source() {
        let kinds = token_kinds("");
        assert_eq!(kinds, vec![TokenKind::Eof]);
    }

    #[test]
    fn test_whitespace_only() {
        let kinds = token_kinds("   \t\n  ");
        assert_eq!(kinds, vec![TokenKind::Eof]);
    }

    #[test]
    fn test_integers() {
        let kinds = token_kinds("42 0 1729");
        assert_eq!(
            kinds,
            vec![
                TokenKind::IntLiteral,
                TokenKind::IntLiteral,
                TokenKind::IntLiteral,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_rationals() {
        let kinds = token_kinds("3.14 0.5");
        assert_eq!(
            kinds,
            vec![TokenKind::FloatLiteral, TokenKind::FloatLiteral, TokenKind::Eof]
        );
    }

    #[test]
    fn test_rational_requires_both_sides() {
        // "1." is an integer followed by a stray dot, not a rational
        let (tokens, errors) = lex("1.");
        assert_eq!(tokens[0].kind, TokenKind::IntLiteral);
        assert_eq!(errors, vec![LexerError::UnexpectedChar(1)]);
    }

    #[test]
    fn test_keywords() {
        let kinds = token_kinds("var def if else while do return assert ref");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Var,
                TokenKind::Def,
                TokenKind::If,
                TokenKind::Else,
                TokenKind::While,
                TokenKind::Do,
                TokenKind::Return,
                TokenKind::Assert,
                TokenKind::Ref,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_word_operators() {
        let kinds = token_kinds("and or xor not len");
        assert_eq!(
            kinds,
            vec![
                TokenKind::And,
                TokenKind::Or,
                TokenKind::Xor,
                TokenKind::Not,
                TokenKind::Len,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_operators() {
        let kinds = token_kinds("+ - * / % == != < > <= >= = += -= *= /= %=");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Plus,
                TokenKind::Minus,
                TokenKind::Star,
                TokenKind::Slash,
                TokenKind::Percent,
                TokenKind::EqEq,
                TokenKind::NotEq,
                TokenKind::Lt,
                TokenKind::Gt,
                TokenKind::LtEq,
                TokenKind::GtEq,
                TokenKind::Eq,
                TokenKind::PlusEq,
                TokenKind::MinusEq,
                TokenKind::StarEq,
                TokenKind::SlashEq,
                TokenKind::PercentEq,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_delimiters() {
        let kinds = token_kinds("( ) [ ] { }");
        assert_eq!(
            kinds,
            vec![
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::LBracket,
                TokenKind::RBracket,
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_identifiers() {
        let kinds = token_kinds("foo bar_baz _private variable");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Ident,
                TokenKind::Ident,
                TokenKind::Ident,
                TokenKind::Ident,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_unicode_identifiers() {
        let kinds = token_kinds("über λx _π2");
        assert_eq!(
            kinds,
            vec![TokenKind::Ident, TokenKind::Ident, TokenKind::Ident, TokenKind::Eof]
        );
    }

    #[test]
    fn test_keywords_are_not_identifier_prefixes() {
        // "lens" and "iffy" are identifiers, not keyword + suffix
        let kinds = token_kinds("lens iffy");
        assert_eq!(kinds, vec![TokenKind::Ident, TokenKind::Ident, TokenKind::Eof]);
    }

    #[test]
    fn test_function_declaration() {
        let source = "def update(ref a, i, v) { a[i] = v; }";
        let kinds = token_kinds(source);
        assert_eq!(
            kinds,
            vec![
                TokenKind::Def,
                TokenKind::Ident, // update
                TokenKind::LParen,
                TokenKind::Ref,
                TokenKind::Ident, // a
                TokenKind::Comma,
                TokenKind::Ident, // i
                TokenKind::Comma,
                TokenKind::Ident, // v
                TokenKind::RParen,
                TokenKind::LBrace,
                TokenKind::Ident, // a
                TokenKind::LBracket,
                TokenKind::Ident, // i
                TokenKind::RBracket,
                TokenKind::Eq,
                TokenKind::Ident, // v
                TokenKind::Semicolon,
                TokenKind::RBrace,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_comments() {
        let kinds = token_kinds(
            r#"
            // This is a comment
            var x = 42; // inline comment
        "#,
        );
        assert_eq!(
            kinds,
            vec![
                TokenKind::Var,
                TokenKind::Ident,
                TokenKind::Eq,
                TokenKind::IntLiteral,
                TokenKind::Semicolon,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_span_tracking() {
        let source = "var x = 42;";
        let (tokens, _) = lex(source);

        assert_eq!(tokens[0].span.text(source), "var");
        assert_eq!(tokens[1].span.text(source), "x");
        assert_eq!(tokens[2].span.text(source), "=");
        assert_eq!(tokens[3].span.text(source), "42");
    }
}
