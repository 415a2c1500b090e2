//! Recursive-descent parser for the selector expression grammar:
//!
//! ```text
//! expr    := or
//! or      := and ('||' and)*
//! and     := unary ('&&' unary)*
//! unary   := '!' unary | primary
//! primary := '(' expr ')' | literal | path (cmp-op operand)?
//! cmp-op  := '==' | '!=' | 'contains' | 'starts-with' | 'equals'
//! operand := literal | path
//! path    := ident ('.' ident | '[' string ']')*
//! literal := string | int | 'true' | 'false'
//! ```

use crate::ast::{CmpOp, Expr};
use crate::error::{ExprError, Result};
use crate::lexer::{Lexer, Token, TokenKind};

/// Parse an expression string into the AST.
pub fn parse(input: &str) -> Result<Expr> {
    let tokens = Lexer::new(input).tokenize()?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    parser.expect(TokenKind::Eof)?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        while self.peek().kind == TokenKind::OrOr {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        while self.peek().kind == TokenKind::AndAnd {
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.peek().kind == TokenKind::Bang {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::OpenParen => {
                self.advance();
                let inner = self.parse_or()?;
                self.expect(TokenKind::CloseParen)?;
                Ok(inner)
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::Bool(true))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::Bool(false))
            }
            TokenKind::StringLiteral => {
                self.advance();
                Ok(Expr::Str(token.text))
            }
            TokenKind::IntLiteral => {
                self.advance();
                Ok(Expr::Int(self.parse_int(&token)?))
            }
            TokenKind::Identifier => {
                let path = self.parse_path()?;
                self.maybe_comparison(Expr::Path(path))
            }
            other => Err(self.err(&token, format!("expected expression, found {other}"))),
        }
    }

    /// After a path, an optional comparison operator and operand.
    fn maybe_comparison(&mut self, lhs: Expr) -> Result<Expr> {
        let op = match self.peek().kind {
            TokenKind::EqEq | TokenKind::EqualsWord => CmpOp::Eq,
            TokenKind::NotEq => CmpOp::Ne,
            TokenKind::Contains => CmpOp::Contains,
            TokenKind::StartsWith => CmpOp::StartsWith,
            _ => return Ok(lhs),
        };
        self.advance();

        let token = self.peek().clone();
        let rhs = match token.kind {
            TokenKind::StringLiteral => {
                self.advance();
                Expr::Str(token.text)
            }
            TokenKind::IntLiteral => {
                self.advance();
                Expr::Int(self.parse_int(&token)?)
            }
            TokenKind::True => {
                self.advance();
                Expr::Bool(true)
            }
            TokenKind::False => {
                self.advance();
                Expr::Bool(false)
            }
            TokenKind::Identifier => Expr::Path(self.parse_path()?),
            other => {
                return Err(self.err(&token, format!("expected literal or path, found {other}")));
            }
        };
        Ok(Expr::cmp(op, lhs, rhs))
    }

    fn parse_path(&mut self) -> Result<Vec<String>> {
        let root = self.expect(TokenKind::Identifier)?;
        let mut segments = vec![root.text];
        loop {
            match self.peek().kind {
                TokenKind::Dot => {
                    self.advance();
                    let seg = self.expect(TokenKind::Identifier)?;
                    segments.push(seg.text);
                }
                TokenKind::OpenBracket => {
                    self.advance();
                    let key = self.expect(TokenKind::StringLiteral)?;
                    self.expect(TokenKind::CloseBracket)?;
                    segments.push(key.text);
                }
                _ => break,
            }
        }
        Ok(segments)
    }

    fn parse_int(&self, token: &Token) -> Result<i64> {
        token
            .text
            .parse::<i64>()
            .map_err(|_| self.err(token, format!("integer out of range: {}", token.text)))
    }

    fn peek(&self) -> &Token {
        // The token stream always ends with Eof, so indexing is safe;
        // clamp anyway to stay panic-free on malformed streams.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        let token = self.peek().clone();
        if token.kind == kind {
            self.advance();
            Ok(token)
        } else {
            Err(self.err(&token, format!("expected {kind}, found {}", token.kind)))
        }
    }

    fn err(&self, token: &Token, message: impl Into<String>) -> ExprError {
        ExprError::Parse {
            line: token.line,
            col: token.col,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_boolean() {
        assert_eq!(parse("true").unwrap(), Expr::Bool(true));
        assert_eq!(parse("false").unwrap(), Expr::Bool(false));
    }

    #[test]
    fn test_comparison() {
        let expr = parse("resource.kind == \"Node\"").unwrap();
        assert_eq!(
            expr,
            Expr::cmp(
                CmpOp::Eq,
                Expr::Path(vec!["resource".into(), "kind".into()]),
                Expr::Str("Node".into()),
            )
        );
    }

    #[test]
    fn test_index_access_folds_into_path() {
        let expr = parse("resource.metadata[\"region\"] != \"eu\"").unwrap();
        assert_eq!(
            expr,
            Expr::cmp(
                CmpOp::Ne,
                Expr::Path(vec!["resource".into(), "metadata".into(), "region".into()]),
                Expr::Str("eu".into()),
            )
        );
    }

    #[test]
    fn test_path_to_path() {
        let expr = parse("from.config.vpc == to.config.vpc").unwrap();
        assert_eq!(
            expr,
            Expr::cmp(
                CmpOp::Eq,
                Expr::Path(vec!["from".into(), "config".into(), "vpc".into()]),
                Expr::Path(vec!["to".into(), "config".into(), "vpc".into()]),
            )
        );
    }

    #[test]
    fn test_precedence_and_binds_tighter() {
        // a == 1 || b == 2 && c == 3  parses as  a==1 || (b==2 && c==3)
        let expr = parse("a == 1 || b == 2 && c == 3").unwrap();
        match expr {
            Expr::Or(_, rhs) => assert!(matches!(*rhs, Expr::And(_, _))),
            other => panic!("expected Or at the root, got {other:?}"),
        }
    }

    #[test]
    fn test_negation_and_parens() {
        let expr = parse("!(a == 1 || b == 2)").unwrap();
        assert!(matches!(expr, Expr::Not(_)));
    }

    #[test]
    fn test_word_operators() {
        let expr = parse("resource.name starts-with \"prod-\"").unwrap();
        assert!(matches!(expr, Expr::Cmp { op: CmpOp::StartsWith, .. }));
        let expr = parse("resource.name equals \"web\"").unwrap();
        assert!(matches!(expr, Expr::Cmp { op: CmpOp::Eq, .. }));
    }

    #[test]
    fn test_bare_path_is_valid() {
        // A bare path is allowed and is truthy iff it holds `true`.
        let expr = parse("resource.config.enabled").unwrap();
        assert!(matches!(expr, Expr::Path(_)));
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        assert!(parse("true true").is_err());
        assert!(parse("a == ").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn test_error_position() {
        let err = parse("a == &&").unwrap_err();
        match err {
            ExprError::Parse { line, col, .. } => {
                assert_eq!(line, 1);
                assert_eq!(col, 6);
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }
}
