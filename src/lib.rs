//! # Keystone Authorization Engine
//!
//! Policy-based authorization decision engine: given a principal, a
//! resource, and candidate actions, it returns an ALLOW/DENY effect per
//! action with full attribution of the policy and rule that decided it.
//!
//! ## Features
//!
//! - **Deny-overrides evaluation** - any matching DENY rule suppresses
//!   every ALLOW rule for the same action
//! - **Derived roles** - roles computed per request from parent roles
//!   plus a condition over principal/resource attributes
//! - **CEL conditions** - sandboxed boolean expressions with compiled
//!   program caching and a fail-closed boolean entry point
//! - **Hierarchical scopes** - dot-delimited multi-tenant scoping with
//!   wildcard patterns and most-specific-wins resolution
//!
//! Storage drivers, transports, and audit sinks are external
//! collaborators: the engine consumes a read-only policy snapshot and
//! emits plain structured decision metadata.
//!
//! ## Example
//!
//! ```
//! use keystone_authz::{
//!     CheckRequest, DecisionEngine, Effect, MemoryPolicyStore, PolicyRule, Principal,
//!     Resource, ResourcePolicy,
//! };
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), keystone_authz::AuthzError> {
//! let store = Arc::new(MemoryPolicyStore::new());
//! store
//!     .upsert_policy(
//!         ResourcePolicy::new("document", "1")
//!             .with_rule(PolicyRule::new(vec!["read".to_string()], Effect::Allow)),
//!     )
//!     .await?;
//!
//! let engine = DecisionEngine::new(store);
//! let request = CheckRequest::new(
//!     Principal::new("user:alice"),
//!     Resource::new("document", "doc-1"),
//!     vec!["read".to_string()],
//! );
//!
//! let response = engine.check(&request).await?;
//! assert!(response.is_allowed("read"));
//! # Ok(())
//! # }
//! ```

pub mod derived_roles;
pub mod engine;
pub mod error;
pub mod expr;
pub mod policy;
pub mod scope;
pub mod types;

pub use derived_roles::{DerivedRoleDefinition, DerivedRoleSet};
pub use engine::{DecisionEngine, EngineCacheStats, EngineConfig, DEFAULT_DENY_POLICY};
pub use error::{AuthzError, Result};
pub use expr::{EvalContext, EvalOutcome, Evaluator, EvaluatorConfig, ExprError};
pub use policy::{
    MemoryPolicyStore, PolicyRule, PolicySnapshot, PolicyStore, ResourcePolicy, ACTION_WILDCARD,
};
pub use scope::{match_scope, Scope, ScopeResolution, ScopeResolver, GLOBAL_SCOPE};
pub use types::{
    ActionResult, CheckRequest, CheckResponse, Effect, EvaluationMeta, Principal, Resource,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
