//! Errors produced while compiling selectors and expressions.

use thiserror::Error;

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, ExprError>;

/// Compilation errors. Evaluation itself is total and never errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExprError {
    #[error("Lex error at {line}:{col}: {message}")]
    Lex {
        line: usize,
        col: usize,
        message: String,
    },

    #[error("Parse error at {line}:{col}: {message}")]
    Parse {
        line: usize,
        col: usize,
        message: String,
    },

    #[error("Invalid JSON selector: {0}")]
    InvalidJsonSelector(String),
}
