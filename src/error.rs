//! Error types for the authorization engine

use thiserror::Error;

/// Authorization engine errors
///
/// Only load-time structural problems (bad expression syntax, invalid
/// scopes, malformed policies) surface as hard errors. Per-rule and
/// per-action failures during a check are absorbed and resolve to DENY.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Malformed expression rejected at compile time
    #[error("expression parse error: {0}")]
    Parse(String),

    /// Runtime expression evaluation failure
    #[error("expression evaluation error: {0}")]
    Evaluation(String),

    /// Invalid scope format, depth, or character set
    #[error("scope validation error: {0}")]
    ScopeValidation(String),

    /// Invalid policy or derived-role definition
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;

impl From<crate::expr::ExprError> for AuthzError {
    fn from(err: crate::expr::ExprError) -> Self {
        use crate::expr::ExprError;
        match err {
            ExprError::Parse(msg) => Self::Parse(msg),
            other => Self::Evaluation(other.to_string()),
        }
    }
}
