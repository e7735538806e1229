//! Error and outcome types for expression operations

use thiserror::Error;

/// Expression operation errors
#[derive(Debug, Error)]
pub enum ExprError {
    /// Malformed expression syntax, rejected at compile time
    #[error("parse error: {0}")]
    Parse(String),

    /// Runtime evaluation failure (missing variable, bad operand, ...)
    #[error("evaluation error: {0}")]
    Evaluation(String),

    /// Operand or result of an unsupported type
    #[error("type error: {0}")]
    Type(String),

    /// Expression evaluated, but not to a boolean
    #[error("expression did not yield a boolean result")]
    NonBoolean,
}

/// Result type for expression operations
pub type Result<T> = std::result::Result<T, ExprError>;

/// Classification of a runtime evaluation failure
///
/// Lets audit consumers separate security-relevant type problems
/// (malformed policy data) from transient data errors (an attribute
/// missing on one request).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalFailureKind {
    /// Evaluation failed (unknown variable, missing field, bad operand)
    Evaluation,
    /// A value of an unsupported or mismatched type was encountered
    Type,
}

/// Tagged outcome of evaluating a compiled expression
///
/// Runtime failures are values, never panics or bubbled errors, so the
/// decision algorithm can treat "condition could not be evaluated"
/// uniformly as "condition is false".
#[derive(Debug, Clone, PartialEq)]
pub enum EvalOutcome {
    /// Evaluation succeeded with a value
    Value(serde_json::Value),
    /// Evaluation failed; the kind and message describe why
    Failed {
        /// Failure classification
        kind: EvalFailureKind,
        /// Human-readable description
        message: String,
    },
}

impl EvalOutcome {
    /// True when evaluation produced a value
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    /// The value, when evaluation succeeded
    pub fn value(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Value(v) => Some(v),
            Self::Failed { .. } => None,
        }
    }

    /// True only when the outcome is exactly boolean `true`
    pub fn is_true(&self) -> bool {
        matches!(self, Self::Value(serde_json::Value::Bool(true)))
    }
}
