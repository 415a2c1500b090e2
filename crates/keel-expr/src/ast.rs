//! The boolean AST both selector forms compile to.

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// `==` / `equals`.
    Eq,
    /// `!=`.
    Ne,
    /// Substring (strings) or membership (arrays).
    Contains,
    /// String prefix.
    StartsWith,
}

/// A compiled expression.
///
/// Paths are rooted at a context binding name (`resource`, `from`,
/// `entity`, ...); the remaining segments index into the bound
/// `serde_json::Value` by object key.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Bool(bool),
    Str(String),
    Int(i64),
    Path(Vec<String>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Cmp {
        op: CmpOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    /// Shorthand for a comparison node.
    pub fn cmp(op: CmpOp, lhs: Expr, rhs: Expr) -> Self {
        Self::Cmp {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }
}
