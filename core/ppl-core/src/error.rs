//! Error types for the PPL query core.
//!
//! All public APIs return `PplResult<T>`: no panics in library code.

use crate::ppl::lexer::Position;
use thiserror::Error;

/// Unified error type for every compilation and execution stage.
#[derive(Debug, Error)]
pub enum PplError {
    /// Unrecognized character sequence in the query text
    #[error("lex error at {position}: {reason}")]
    Lex { position: Position, reason: String },

    /// Token stream does not match the grammar
    #[error("parse error at {position}: expected {expected}, found {found}")]
    Parse {
        position: Position,
        expected: String,
        found: String,
    },

    /// Unresolvable field/function, type mismatch or invalid group-by
    #[error("semantic error at {position}: {message}")]
    Semantic { message: String, position: Position },

    /// Operator-level failure while executing a plan
    #[error("execution error in {operator}: {cause}")]
    Execution { operator: String, cause: String },

    /// Per-query deadline expired
    #[error("query timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// Combined operator memory exceeded the configured ceiling
    #[error("memory limit exceeded: requested {requested} bytes, {used} of {limit} bytes in use")]
    MemoryLimit {
        requested: usize,
        used: usize,
        limit: usize,
    },

    /// An aggregate produced more distinct group keys than allowed
    #[error("too many groups: aggregate exceeded {limit} distinct keys")]
    TooManyGroups { limit: usize },

    /// Invariant violation inside the compiler pipeline
    #[error("internal error: {0}")]
    Internal(String),

    /// Invalid engine configuration
    #[error("config error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Apache Arrow error (result conversion)
    #[error("arrow error: {source}")]
    Arrow {
        #[from]
        source: arrow::error::ArrowError,
    },
}

/// Result type alias for all PPL operations.
pub type PplResult<T> = Result<T, PplError>;

impl PplError {
    /// Shorthand for an [`PplError::Execution`] raised by `operator`.
    pub fn execution(operator: impl Into<String>, cause: impl Into<String>) -> Self {
        PplError::Execution {
            operator: operator.into(),
            cause: cause.into(),
        }
    }

    /// Re-tags an execution error with the operator that observed it.
    ///
    /// Expression evaluation reports errors under a generic operator name;
    /// the owning iterator rewrites it so callers see which stage failed.
    pub fn in_operator(self, operator: &str) -> Self {
        match self {
            PplError::Execution { cause, .. } => PplError::Execution {
                operator: operator.to_string(),
                cause,
            },
            other => other,
        }
    }

    /// Timeout or resource-ceiling failures. A caller may retry these with
    /// a narrower query; every other error is final for the query text.
    pub fn is_resource_limit(&self) -> bool {
        matches!(
            self,
            PplError::Timeout { .. } | PplError::MemoryLimit { .. } | PplError::TooManyGroups { .. }
        )
    }

    /// Errors raised before execution starts (no backend call was issued).
    pub fn is_compile_error(&self) -> bool {
        matches!(
            self,
            PplError::Lex { .. } | PplError::Parse { .. } | PplError::Semantic { .. }
        )
    }
}

impl From<serde_json::Error> for PplError {
    fn from(err: serde_json::Error) -> Self {
        PplError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos() -> Position {
        Position {
            offset: 7,
            line: 1,
            column: 8,
        }
    }

    #[test]
    fn error_display_parse() {
        let err = PplError::Parse {
            position: pos(),
            expected: "'='".to_string(),
            found: "'|'".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "parse error at line 1, column 8: expected '=', found '|'"
        );
    }

    #[test]
    fn error_display_execution() {
        let err = PplError::execution("Eval", "division by zero");
        assert_eq!(err.to_string(), "execution error in Eval: division by zero");
    }

    #[test]
    fn in_operator_retags_execution_only() {
        let err = PplError::execution("expression", "overflow").in_operator("Filter");
        assert!(matches!(err, PplError::Execution { ref operator, .. } if operator == "Filter"));

        let err = PplError::TooManyGroups { limit: 3 }.in_operator("Filter");
        assert!(matches!(err, PplError::TooManyGroups { limit: 3 }));
    }

    #[test]
    fn resource_limits_are_distinguishable() {
        assert!(PplError::Timeout { elapsed_ms: 10 }.is_resource_limit());
        assert!(
            PplError::MemoryLimit {
                requested: 1,
                used: 2,
                limit: 2
            }
            .is_resource_limit()
        );
        assert!(!PplError::execution("Sort", "boom").is_resource_limit());
        assert!(!PplError::Internal("x".into()).is_resource_limit());
    }

    #[test]
    fn compile_errors_are_classified() {
        let err = PplError::Semantic {
            message: "unknown field `nope`".into(),
            position: pos(),
        };
        assert!(err.is_compile_error());
        assert!(!PplError::Timeout { elapsed_ms: 1 }.is_compile_error());
    }

    #[test]
    fn serde_error_converts() {
        let err: PplError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, PplError::Serialization(_)));
    }
}
