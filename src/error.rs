//! Error taxonomy for the interpreter.
//!
//! The eight numbered kinds are spec's entire error surface (§7); everything
//! the evaluator, memory region, and primitives can fail with maps onto one
//! of them. `Custom` exists purely for host-level plumbing (CLI/file I/O)
//! that never reaches a Lisp-level `catch`.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LispError {
    #[error("not a pair")]
    NotAPair,

    #[error("break")]
    Break,

    #[error("unbound symbol: {0}")]
    UnboundSymbol(String),

    #[error("cannot apply: {0}")]
    CannotApply(String),

    #[error("bad arguments: {0}")]
    BadArguments(String),

    #[error("stack overflow")]
    StackOverflow,

    #[error("out of memory")]
    OutOfMemory,

    #[error("syntax error: {0}")]
    Syntax(String),

    /// Raised by the `throw` primitive with a user-chosen code, rather than
    /// one of the eight fixed kinds above (spec §7's `catch`/`throw`).
    #[error("thrown: {0}")]
    Thrown(i64),

    #[error("{0}")]
    Custom(String),
}

impl LispError {
    /// The small positive integer code from spec §7's table. `Custom` has no
    /// code: it is never meant to reach a Lisp-level `catch`.
    pub fn code(&self) -> Option<i64> {
        match self {
            LispError::NotAPair => Some(1),
            LispError::Break => Some(2),
            LispError::UnboundSymbol(_) => Some(3),
            LispError::CannotApply(_) => Some(4),
            LispError::BadArguments(_) => Some(5),
            LispError::StackOverflow => Some(6),
            LispError::OutOfMemory => Some(7),
            LispError::Syntax(_) => Some(8),
            LispError::Thrown(n) => Some(*n),
            LispError::Custom(_) => None,
        }
    }
}

pub type LispResult<T> = Result<T, LispError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_spec_table() {
        assert_eq!(LispError::NotAPair.code(), Some(1));
        assert_eq!(LispError::Break.code(), Some(2));
        assert_eq!(LispError::UnboundSymbol("x".into()).code(), Some(3));
        assert_eq!(LispError::CannotApply("x".into()).code(), Some(4));
        assert_eq!(LispError::BadArguments("x".into()).code(), Some(5));
        assert_eq!(LispError::StackOverflow.code(), Some(6));
        assert_eq!(LispError::OutOfMemory.code(), Some(7));
        assert_eq!(LispError::Syntax("x".into()).code(), Some(8));
    }

    #[test]
    fn custom_has_no_code() {
        assert_eq!(LispError::Custom("boom".into()).code(), None);
    }
}
