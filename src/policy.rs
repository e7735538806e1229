//! Policy model, snapshots, and storage
//!
//! Policies are validated into this strongly-typed model when they are
//! loaded; the decision engine never re-validates structure at request
//! time. The engine consumes an immutable [`PolicySnapshot`] per check -
//! reloads swap the snapshot, they never mutate one in place.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::derived_roles::DerivedRoleSet;
use crate::error::{AuthzError, Result};
use crate::expr::Evaluator;
use crate::scope::{match_scope, validate_scope, validate_scope_pattern};
use crate::types::Effect;

/// Wildcard matching any action
pub const ACTION_WILDCARD: &str = "*";

/// A single rule inside a resource policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Optional rule name, surfaced in decision attribution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Actions this rule covers; may contain the wildcard `"*"`
    pub actions: Vec<String>,

    /// Effect when the rule matches
    pub effect: Effect,

    /// Base roles this rule is restricted to; empty means unrestricted
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,

    /// Derived roles this rule is restricted to; empty means unrestricted
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub derived_roles: Vec<String>,

    /// Optional condition expression, compiled lazily at evaluation time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl PolicyRule {
    /// Create a rule covering a set of actions
    pub fn new(actions: Vec<String>, effect: Effect) -> Self {
        Self {
            name: None,
            actions,
            effect,
            roles: Vec::new(),
            derived_roles: Vec::new(),
            condition: None,
        }
    }

    /// Name the rule for attribution
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Restrict the rule to base roles
    pub fn for_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = roles;
        self
    }

    /// Restrict the rule to derived roles
    pub fn for_derived_roles(mut self, derived_roles: Vec<String>) -> Self {
        self.derived_roles = derived_roles;
        self
    }

    /// Gate the rule on a condition expression
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Does this rule cover the action (directly or via wildcard)?
    pub fn covers_action(&self, action: &str) -> bool {
        self.actions
            .iter()
            .any(|a| a == action || a == ACTION_WILDCARD)
    }

    /// True when the rule carries no role restriction at all
    pub fn is_unrestricted(&self) -> bool {
        self.roles.is_empty() && self.derived_roles.is_empty()
    }
}

/// A resource policy: an ordered rule set for one resource kind
///
/// Rule order is a tie-break within the same effect class only; DENY
/// rules are always consulted before ALLOW rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcePolicy {
    /// Resource kind the policy governs
    pub resource_kind: String,

    /// Policy version label
    pub version: String,

    /// Optional scope or scope pattern this policy is bound to;
    /// `None` makes it a global policy for its resource kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Names of [`DerivedRoleSet`]s this policy imports
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub import_derived_roles: Vec<String>,

    /// The rules, in declaration order
    pub rules: Vec<PolicyRule>,
}

impl ResourcePolicy {
    /// Create a global policy for a resource kind
    pub fn new(resource_kind: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            resource_kind: resource_kind.into(),
            version: version.into(),
            scope: None,
            import_derived_roles: Vec::new(),
            rules: Vec::new(),
        }
    }

    /// Bind the policy to a scope or scope pattern
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Import derived-role sets by name
    pub fn importing(mut self, sets: Vec<String>) -> Self {
        self.import_derived_roles = sets;
        self
    }

    /// Append a rule
    pub fn with_rule(mut self, rule: PolicyRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Identity used in decision attribution,
    /// e.g. `resource.document.v1/acme.corp`
    pub fn identifier(&self) -> String {
        match &self.scope {
            Some(scope) => format!("resource.{}.v{}/{}", self.resource_kind, self.version, scope),
            None => format!("resource.{}.v{}", self.resource_kind, self.version),
        }
    }

    /// True when the policy's scope contains a wildcard segment
    pub fn has_scope_pattern(&self) -> bool {
        self.scope
            .as_deref()
            .map(|s| s.split('.').any(|seg| seg == "*" || seg == "**"))
            .unwrap_or(false)
    }

    /// Validate the policy at load time
    ///
    /// Malformed policies are rejected here so the engine only ever
    /// evaluates well-formed rules.
    pub fn validate(&self) -> Result<()> {
        if self.resource_kind.is_empty() {
            return Err(AuthzError::InvalidPolicy(
                "resource kind cannot be empty".to_string(),
            ));
        }
        if self.version.is_empty() {
            return Err(AuthzError::InvalidPolicy(format!(
                "policy for '{}' has an empty version",
                self.resource_kind
            )));
        }
        if self.rules.is_empty() {
            return Err(AuthzError::InvalidPolicy(format!(
                "policy '{}' has no rules",
                self.identifier()
            )));
        }

        if let Some(scope) = &self.scope {
            if self.has_scope_pattern() {
                validate_scope_pattern(scope)?;
            } else {
                validate_scope(scope)?;
                if scope.is_empty() {
                    return Err(AuthzError::InvalidPolicy(format!(
                        "policy for '{}' declares an empty scope; omit it instead",
                        self.resource_kind
                    )));
                }
            }
        }

        for (idx, rule) in self.rules.iter().enumerate() {
            if rule.actions.is_empty() {
                return Err(AuthzError::InvalidPolicy(format!(
                    "rule {} of policy '{}' covers no actions",
                    idx,
                    self.identifier()
                )));
            }
            if rule.actions.iter().any(|a| a.is_empty()) {
                return Err(AuthzError::InvalidPolicy(format!(
                    "rule {} of policy '{}' has an empty action",
                    idx,
                    self.identifier()
                )));
            }
            if let Some(condition) = &rule.condition {
                Evaluator::validate(condition).map_err(|e| {
                    AuthzError::InvalidPolicy(format!(
                        "rule {} of policy '{}' has an invalid condition: {}",
                        idx,
                        self.identifier(),
                        e
                    ))
                })?;
            }
        }

        Ok(())
    }
}

/// Immutable view of the loaded policy set, consumed by the engine
///
/// Built once per store mutation; checks in flight keep whatever snapshot
/// they started with.
#[derive(Debug, Default)]
pub struct PolicySnapshot {
    /// Concretely-scoped policies, keyed by `(scope, resource_kind)`
    scoped: HashMap<(String, String), Arc<ResourcePolicy>>,

    /// Pattern-scoped policies, matched against chain scopes in load order
    wildcard: Vec<Arc<ResourcePolicy>>,

    /// Global (unscoped) policies, keyed by resource kind
    global: HashMap<String, Arc<ResourcePolicy>>,

    /// Derived-role sets, keyed by import name
    derived_roles: HashMap<String, Arc<DerivedRoleSet>>,
}

impl PolicySnapshot {
    /// Policy for a concrete scope and resource kind, if any
    ///
    /// Exact entries win over pattern entries; among patterns, load order
    /// decides.
    pub fn scoped_policy(&self, scope: &str, resource_kind: &str) -> Option<Arc<ResourcePolicy>> {
        if let Some(policy) = self
            .scoped
            .get(&(scope.to_string(), resource_kind.to_string()))
        {
            return Some(policy.clone());
        }

        self.wildcard
            .iter()
            .find(|p| {
                p.resource_kind == resource_kind
                    && p.scope
                        .as_deref()
                        .map(|pattern| match_scope(pattern, scope))
                        .unwrap_or(false)
            })
            .cloned()
    }

    /// Global policy for a resource kind, if any
    pub fn global_policy(&self, resource_kind: &str) -> Option<Arc<ResourcePolicy>> {
        self.global.get(resource_kind).cloned()
    }

    /// Derived-role set by import name
    pub fn derived_role_set(&self, name: &str) -> Option<Arc<DerivedRoleSet>> {
        self.derived_roles.get(name).cloned()
    }

    /// The derived-role sets a policy imports, unknown names skipped
    pub fn imported_sets(&self, policy: &ResourcePolicy) -> Vec<Arc<DerivedRoleSet>> {
        policy
            .import_derived_roles
            .iter()
            .filter_map(|name| self.derived_role_set(name))
            .collect()
    }

    /// Number of loaded policies
    pub fn policy_count(&self) -> usize {
        self.scoped.len() + self.wildcard.len() + self.global.len()
    }
}

/// Source of the current policy snapshot
///
/// Implementations own loading and hot-reload; the engine only ever asks
/// for the current snapshot and treats it as read-only.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// The current snapshot
    async fn snapshot(&self) -> Arc<PolicySnapshot>;
}

#[derive(Default)]
struct StoreState {
    policies: Vec<ResourcePolicy>,
    role_sets: Vec<DerivedRoleSet>,
    snapshot: Arc<PolicySnapshot>,
}

impl StoreState {
    fn rebuild(&mut self) {
        let mut snapshot = PolicySnapshot::default();

        for policy in &self.policies {
            let policy = Arc::new(policy.clone());
            match &policy.scope {
                None => {
                    snapshot
                        .global
                        .insert(policy.resource_kind.clone(), policy);
                }
                Some(scope) => {
                    if policy.has_scope_pattern() {
                        snapshot.wildcard.push(policy);
                    } else {
                        snapshot
                            .scoped
                            .insert((scope.clone(), policy.resource_kind.clone()), policy);
                    }
                }
            }
        }

        for set in &self.role_sets {
            snapshot
                .derived_roles
                .insert(set.name.clone(), Arc::new(set.clone()));
        }

        self.snapshot = Arc::new(snapshot);
    }
}

/// In-memory policy store
///
/// Validates everything on the way in and rebuilds the snapshot on every
/// mutation. Suitable as the backing store for tests and for external
/// loaders that push parsed policies at reload time.
pub struct MemoryPolicyStore {
    state: RwLock<StoreState>,
}

impl MemoryPolicyStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
        }
    }

    /// Insert or replace a policy
    ///
    /// Replaces an existing policy with the same `(resource_kind, scope)`
    /// binding. Rejected policies leave the store untouched.
    pub async fn upsert_policy(&self, policy: ResourcePolicy) -> Result<()> {
        policy.validate()?;

        let mut state = self.state.write().await;
        state
            .policies
            .retain(|p| !(p.resource_kind == policy.resource_kind && p.scope == policy.scope));
        info!(policy = %policy.identifier(), "policy loaded");
        state.policies.push(policy);
        state.rebuild();
        Ok(())
    }

    /// Insert or replace a derived-role set
    pub async fn upsert_derived_roles(&self, set: DerivedRoleSet) -> Result<()> {
        set.validate()?;

        let mut state = self.state.write().await;
        state.role_sets.retain(|s| s.name != set.name);
        info!(set = %set.name, "derived role set loaded");
        state.role_sets.push(set);
        state.rebuild();
        Ok(())
    }

    /// Remove a policy by its `(resource_kind, scope)` binding
    pub async fn remove_policy(&self, resource_kind: &str, scope: Option<&str>) {
        let mut state = self.state.write().await;
        state
            .policies
            .retain(|p| !(p.resource_kind == resource_kind && p.scope.as_deref() == scope));
        state.rebuild();
    }

    /// Number of loaded policies
    pub async fn policy_count(&self) -> usize {
        self.state.read().await.policies.len()
    }
}

impl Default for MemoryPolicyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PolicyStore for MemoryPolicyStore {
    async fn snapshot(&self) -> Arc<PolicySnapshot> {
        self.state.read().await.snapshot.clone()
    }
}
