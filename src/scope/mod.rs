//! Hierarchical scope resolution
//!
//! Scopes select which policy set applies in multi-tenant deployments.
//! Resolution walks the dot-hierarchy from most to least specific and is
//! strictly most-specific-wins: a match fully replaces, never merges
//! with, anything less specific.

pub mod resolver;
pub mod types;

pub use resolver::{CacheStats, ScopeResolution, ScopeResolver};
pub use types::{
    match_scope, validate_scope, validate_scope_pattern, Scope, GLOBAL_SCOPE, MAX_SCOPE_DEPTH,
};
