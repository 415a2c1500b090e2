//! Lexer for the selector expression language.
//!
//! Produces a flat token stream for the parser. Handles identifiers,
//! string and integer literals, the word operators (`contains`,
//! `starts-with`, `equals`), and the structural tokens.

use crate::error::{ExprError, Result};

/// A token with its source position (1-based).
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: usize,
    pub col: usize,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, line: usize, col: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            line,
            col,
        }
    }
}

/// Token types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    StringLiteral,
    IntLiteral,
    True,
    False,

    // Word operators
    Contains,
    StartsWith,
    EqualsWord,

    // Symbolic operators
    EqEq,   // ==
    NotEq,  // !=
    AndAnd, // &&
    OrOr,   // ||
    Bang,   // !

    // Structural
    Dot,
    OpenBracket,
    CloseBracket,
    OpenParen,
    CloseParen,

    Eof,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Identifier => write!(f, "identifier"),
            Self::StringLiteral => write!(f, "string literal"),
            Self::IntLiteral => write!(f, "integer"),
            Self::True => write!(f, "true"),
            Self::False => write!(f, "false"),
            Self::Contains => write!(f, "contains"),
            Self::StartsWith => write!(f, "starts-with"),
            Self::EqualsWord => write!(f, "equals"),
            Self::EqEq => write!(f, "=="),
            Self::NotEq => write!(f, "!="),
            Self::AndAnd => write!(f, "&&"),
            Self::OrOr => write!(f, "||"),
            Self::Bang => write!(f, "!"),
            Self::Dot => write!(f, "."),
            Self::OpenBracket => write!(f, "["),
            Self::CloseBracket => write!(f, "]"),
            Self::OpenParen => write!(f, "("),
            Self::CloseParen => write!(f, ")"),
            Self::Eof => write!(f, "end of input"),
        }
    }
}

/// Lexer over the raw expression text.
pub struct Lexer {
    input: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    /// Tokenize the entire input.
    pub fn tokenize(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            if self.pos >= self.input.len() {
                tokens.push(Token::new(TokenKind::Eof, "", self.line, self.col));
                break;
            }

            let (line, col) = (self.line, self.col);
            let c = self.input[self.pos];

            let token = match c {
                '"' | '\'' => self.lex_string(c)?,
                '=' => {
                    if self.peek_next() == Some('=') {
                        self.advance();
                        self.advance();
                        Token::new(TokenKind::EqEq, "==", line, col)
                    } else {
                        return Err(self.err(line, col, "expected '==' after '='"));
                    }
                }
                '!' => {
                    if self.peek_next() == Some('=') {
                        self.advance();
                        self.advance();
                        Token::new(TokenKind::NotEq, "!=", line, col)
                    } else {
                        self.advance();
                        Token::new(TokenKind::Bang, "!", line, col)
                    }
                }
                '&' => {
                    if self.peek_next() == Some('&') {
                        self.advance();
                        self.advance();
                        Token::new(TokenKind::AndAnd, "&&", line, col)
                    } else {
                        return Err(self.err(line, col, "expected '&&' after '&'"));
                    }
                }
                '|' => {
                    if self.peek_next() == Some('|') {
                        self.advance();
                        self.advance();
                        Token::new(TokenKind::OrOr, "||", line, col)
                    } else {
                        return Err(self.err(line, col, "expected '||' after '|'"));
                    }
                }
                '.' => {
                    self.advance();
                    Token::new(TokenKind::Dot, ".", line, col)
                }
                '[' => {
                    self.advance();
                    Token::new(TokenKind::OpenBracket, "[", line, col)
                }
                ']' => {
                    self.advance();
                    Token::new(TokenKind::CloseBracket, "]", line, col)
                }
                '(' => {
                    self.advance();
                    Token::new(TokenKind::OpenParen, "(", line, col)
                }
                ')' => {
                    self.advance();
                    Token::new(TokenKind::CloseParen, ")", line, col)
                }
                c if c.is_ascii_digit() || c == '-' => self.lex_int()?,
                c if c.is_alphabetic() || c == '_' => self.lex_word(),
                other => {
                    return Err(self.err(line, col, format!("unexpected character '{other}'")));
                }
            };
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn lex_string(&mut self, quote: char) -> Result<Token> {
        let (line, col) = (self.line, self.col);
        self.advance(); // opening quote
        let mut text = String::new();
        loop {
            match self.current() {
                None => return Err(self.err(line, col, "unterminated string literal")),
                Some('\\') => {
                    self.advance();
                    match self.current() {
                        Some('n') => text.push('\n'),
                        Some('t') => text.push('\t'),
                        Some(c) => text.push(c),
                        None => return Err(self.err(line, col, "unterminated escape")),
                    }
                    self.advance();
                }
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                Some(c) => {
                    text.push(c);
                    self.advance();
                }
            }
        }
        Ok(Token::new(TokenKind::StringLiteral, text, line, col))
    }

    fn lex_int(&mut self) -> Result<Token> {
        let (line, col) = (self.line, self.col);
        let mut text = String::new();
        if self.current() == Some('-') {
            text.push('-');
            self.advance();
            if !self.current().is_some_and(|c| c.is_ascii_digit()) {
                return Err(self.err(line, col, "expected digit after '-'"));
            }
        }
        while let Some(c) = self.current() {
            if c.is_ascii_digit() {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        Ok(Token::new(TokenKind::IntLiteral, text, line, col))
    }

    fn lex_word(&mut self) -> Token {
        let (line, col) = (self.line, self.col);
        let mut text = String::new();
        while let Some(c) = self.current() {
            // '-' is allowed mid-word so `starts-with` lexes as one token;
            // identifiers in entity paths never contain it.
            if c.is_alphanumeric() || c == '_' || c == '-' {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        let kind = match text.as_str() {
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "contains" => TokenKind::Contains,
            "starts-with" => TokenKind::StartsWith,
            "equals" => TokenKind::EqualsWord,
            _ => TokenKind::Identifier,
        };
        Token::new(kind, text, line, col)
    }

    fn current(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.input.get(self.pos + 1).copied()
    }

    fn advance(&mut self) {
        if let Some(c) = self.current() {
            self.pos += 1;
            if c == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
        }
    }

    fn skip_whitespace(&mut self) {
        while self.current().is_some_and(|c| c.is_whitespace()) {
            self.advance();
        }
    }

    fn err(&self, line: usize, col: usize, message: impl Into<String>) -> ExprError {
        ExprError::Lex {
            line,
            col,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_simple_comparison() {
        assert_eq!(
            kinds("resource.kind == \"Node\""),
            vec![
                TokenKind::Identifier,
                TokenKind::Dot,
                TokenKind::Identifier,
                TokenKind::EqEq,
                TokenKind::StringLiteral,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_index_access() {
        assert_eq!(
            kinds("resource.metadata[\"region\"] == \"us-east-1\""),
            vec![
                TokenKind::Identifier,
                TokenKind::Dot,
                TokenKind::Identifier,
                TokenKind::OpenBracket,
                TokenKind::StringLiteral,
                TokenKind::CloseBracket,
                TokenKind::EqEq,
                TokenKind::StringLiteral,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_word_operators() {
        assert_eq!(
            kinds("name starts-with \"prod-\" && kind contains \"Node\""),
            vec![
                TokenKind::Identifier,
                TokenKind::StartsWith,
                TokenKind::StringLiteral,
                TokenKind::AndAnd,
                TokenKind::Identifier,
                TokenKind::Contains,
                TokenKind::StringLiteral,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_booleans_and_negation() {
        assert_eq!(
            kinds("!false || true"),
            vec![
                TokenKind::Bang,
                TokenKind::False,
                TokenKind::OrOr,
                TokenKind::True,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_negative_int() {
        let tokens = Lexer::new("version.metadata[\"build\"] != -1")
            .tokenize()
            .unwrap();
        let int = tokens.iter().find(|t| t.kind == TokenKind::IntLiteral).unwrap();
        assert_eq!(int.text, "-1");
    }

    #[test]
    fn test_unterminated_string() {
        let err = Lexer::new("name == \"oops").tokenize().unwrap_err();
        assert!(matches!(err, ExprError::Lex { .. }));
    }

    #[test]
    fn test_lone_ampersand() {
        let err = Lexer::new("true & false").tokenize().unwrap_err();
        assert!(matches!(err, ExprError::Lex { .. }));
    }

    #[test]
    fn test_positions() {
        let tokens = Lexer::new("a == b").tokenize().unwrap();
        assert_eq!((tokens[0].line, tokens[0].col), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].col), (1, 3));
        assert_eq!((tokens[2].line, tokens[2].col), (1, 6));
    }
}
