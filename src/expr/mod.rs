//! Condition expression engine
//!
//! Compiles CEL-style boolean conditions into reusable programs, caches
//! them with TTL + batch eviction, and evaluates them against a structured
//! request context. The fail-closed [`Evaluator::evaluate_bool`] entry
//! point underpins the engine's deny-by-default guarantees.

pub mod context;
pub mod convert;
pub mod error;
pub mod evaluator;
pub mod functions;

pub use context::EvalContext;
pub use error::{EvalFailureKind, EvalOutcome, ExprError};
pub use evaluator::{CacheStats, Evaluator, EvaluatorConfig};
