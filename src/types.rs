//! Core request and response types for the decision pipeline

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Effect of a policy rule or decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Effect {
    /// Allow the action
    Allow,
    /// Deny the action
    Deny,
}

impl Effect {
    /// Returns true for [`Effect::Allow`]
    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Principal (user, service account, agent) making a request
///
/// Immutable for the duration of a check; the engine never mutates the
/// role set during evaluation. Roles are a set; order carries no meaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    /// Principal identifier (e.g., "user:alice@example.com")
    pub id: String,

    /// Base roles held by the principal
    #[serde(default)]
    pub roles: Vec<String>,

    /// Additional attributes exposed to condition expressions
    #[serde(default)]
    pub attributes: HashMap<String, Value>,

    /// Optional scope the principal is declared in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl Principal {
    /// Create a new principal with no roles or attributes
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            roles: Vec::new(),
            attributes: HashMap::new(),
            scope: None,
        }
    }

    /// Add a role to the principal
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// Replace the principal's roles
    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = roles;
        self
    }

    /// Add an attribute to the principal
    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Declare the principal's scope
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Check if the principal holds a role
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Resource a request targets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Resource kind (e.g., "document", "payment")
    pub kind: String,

    /// Resource identifier
    pub id: String,

    /// Additional attributes exposed to condition expressions
    #[serde(default)]
    pub attributes: HashMap<String, Value>,

    /// Optional scope the resource is declared in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl Resource {
    /// Create a new resource with no attributes
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            attributes: HashMap::new(),
            scope: None,
        }
    }

    /// Add an attribute to the resource
    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Declare the resource's scope
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }
}

/// Authorization check request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRequest {
    /// Caller-supplied request id; generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// Principal making the request
    pub principal: Principal,

    /// Resource being accessed
    pub resource: Resource,

    /// Candidate actions to decide, one result each
    pub actions: Vec<String>,

    /// Auxiliary data exposed to condition expressions under `aux`
    #[serde(default)]
    pub aux_data: HashMap<String, Value>,

    /// Explicit request scope, overriding principal/resource scopes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl CheckRequest {
    /// Create a request for a set of actions
    pub fn new(principal: Principal, resource: Resource, actions: Vec<String>) -> Self {
        Self {
            request_id: None,
            principal,
            resource,
            actions,
            aux_data: HashMap::new(),
            scope: None,
        }
    }

    /// Attach a caller request id
    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    /// Attach auxiliary data
    pub fn with_aux_data(mut self, aux: HashMap<String, Value>) -> Self {
        self.aux_data = aux;
        self
    }

    /// Pin the request to an explicit scope
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }
}

/// Per-action decision with policy/rule attribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    /// The action this result decides
    pub action: String,

    /// Decided effect
    pub effect: Effect,

    /// Identity of the policy that produced the effect
    pub policy: String,

    /// Name of the matching rule, when the rule is named
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
}

/// Evaluation metadata carried on every response
///
/// Emitted as plain structured values for an external audit/metrics sink;
/// the engine performs no I/O with it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationMeta {
    /// Scope whose policy decided the request, or the global sentinel
    pub matched_scope: String,

    /// Every scope examined during resolution, most specific first
    pub inheritance_chain: Vec<String>,

    /// Wall-clock evaluation time in microseconds
    pub duration_micros: u64,

    /// Identities of policies consulted during evaluation
    pub policies_consulted: Vec<String>,

    /// Absorbed per-action failures (forced to DENY), for audit consumers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Aggregated response: exactly one [`ActionResult`] per requested action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResponse {
    /// Request id, echoed or generated
    pub request_id: String,

    /// One result per requested action, in request order
    pub results: Vec<ActionResult>,

    /// Derived roles active for this request
    pub derived_roles: Vec<String>,

    /// Evaluation metadata
    pub meta: EvaluationMeta,
}

impl CheckResponse {
    /// Effect decided for an action, if it was part of the request
    pub fn effect_for(&self, action: &str) -> Option<Effect> {
        self.results
            .iter()
            .find(|r| r.action == action)
            .map(|r| r.effect)
    }

    /// Convenience: was the action allowed?
    pub fn is_allowed(&self, action: &str) -> bool {
        self.effect_for(action) == Some(Effect::Allow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_principal_builder() {
        let principal = Principal::new("user:alice@example.com")
            .with_role("employee")
            .with_attribute("department", json!("engineering"))
            .with_scope("acme.corp");

        assert_eq!(principal.id, "user:alice@example.com");
        assert!(principal.has_role("employee"));
        assert!(!principal.has_role("admin"));
        assert_eq!(principal.scope.as_deref(), Some("acme.corp"));
    }

    #[test]
    fn test_resource_builder() {
        let resource = Resource::new("document", "doc-123")
            .with_attribute("owner", json!("user:alice@example.com"));

        assert_eq!(resource.kind, "document");
        assert_eq!(resource.attributes["owner"], json!("user:alice@example.com"));
    }

    #[test]
    fn test_effect_serde_uppercase() {
        assert_eq!(serde_json::to_string(&Effect::Allow).unwrap(), "\"ALLOW\"");
        assert_eq!(serde_json::to_string(&Effect::Deny).unwrap(), "\"DENY\"");
    }

    #[test]
    fn test_response_lookup() {
        let response = CheckResponse {
            request_id: "r1".to_string(),
            results: vec![
                ActionResult {
                    action: "read".to_string(),
                    effect: Effect::Allow,
                    policy: "resource.document.v1".to_string(),
                    rule: None,
                },
                ActionResult {
                    action: "delete".to_string(),
                    effect: Effect::Deny,
                    policy: "default-deny".to_string(),
                    rule: None,
                },
            ],
            derived_roles: vec![],
            meta: EvaluationMeta::default(),
        };

        assert!(response.is_allowed("read"));
        assert!(!response.is_allowed("delete"));
        assert_eq!(response.effect_for("write"), None);
    }
}
