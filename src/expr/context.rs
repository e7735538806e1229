//! Evaluation context for condition expressions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::types::{CheckRequest, Principal, Resource};

/// Context containing all variables available during expression evaluation
///
/// Built fresh per check from immutable inputs; evaluating an expression
/// never mutates it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvalContext {
    /// Principal identifier
    pub principal_id: String,

    /// Principal's roles as seen by expressions
    pub principal_roles: Vec<String>,

    /// Principal attributes
    pub principal_attrs: HashMap<String, Value>,

    /// Resource kind
    pub resource_kind: String,

    /// Resource identifier
    pub resource_id: String,

    /// Resource attributes
    pub resource_attrs: HashMap<String, Value>,

    /// Auxiliary request data, exposed under `aux`
    pub aux: HashMap<String, Value>,

    /// Evaluation timestamp, exposed as `now` and `nowMillis`
    pub now: DateTime<Utc>,
}

impl EvalContext {
    /// Create an empty context stamped with the current time
    pub fn new() -> Self {
        Self {
            now: Utc::now(),
            ..Self::default()
        }
    }

    /// Build a context from a check request
    pub fn from_request(request: &CheckRequest) -> Self {
        Self::of(&request.principal, &request.resource, &request.aux_data)
    }

    /// Build a context from principal, resource, and auxiliary data
    pub fn of(
        principal: &Principal,
        resource: &Resource,
        aux: &HashMap<String, Value>,
    ) -> Self {
        Self {
            principal_id: principal.id.clone(),
            principal_roles: principal.roles.clone(),
            principal_attrs: principal.attributes.clone(),
            resource_kind: resource.kind.clone(),
            resource_id: resource.id.clone(),
            resource_attrs: resource.attributes.clone(),
            aux: aux.clone(),
            now: Utc::now(),
        }
    }

    /// Replace principal attributes
    pub fn with_principal_attrs(mut self, attrs: HashMap<String, Value>) -> Self {
        self.principal_attrs = attrs;
        self
    }

    /// Replace resource attributes
    pub fn with_resource_attrs(mut self, attrs: HashMap<String, Value>) -> Self {
        self.resource_attrs = attrs;
        self
    }

    /// Replace auxiliary data
    pub fn with_aux(mut self, aux: HashMap<String, Value>) -> Self {
        self.aux = aux;
        self
    }

    /// Pin the evaluation timestamp (tests, replay)
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Flatten into the variable bindings expressions see
    ///
    /// Policies are written against both the shorthand (`P`, `R`) and the
    /// fully-qualified (`principal`, `resource`) forms, and against
    /// attributes both merged at the top level and under `attr`. All four
    /// spellings must keep working.
    pub fn to_variables(&self) -> HashMap<String, Value> {
        let mut vars = HashMap::new();

        let principal = self.principal_object();
        vars.insert("principal".to_string(), principal.clone());
        vars.insert("P".to_string(), principal);

        let resource = self.resource_object();
        vars.insert("resource".to_string(), resource.clone());
        vars.insert("R".to_string(), resource);

        vars.insert("aux".to_string(), json!(self.aux));

        vars.insert("now".to_string(), json!(self.now.to_rfc3339()));
        vars.insert("nowMillis".to_string(), json!(self.now.timestamp_millis()));

        vars
    }

    fn principal_object(&self) -> Value {
        let mut obj = serde_json::Map::new();

        // Merged attributes first; id/roles/attr always win on collision.
        for (k, v) in &self.principal_attrs {
            obj.insert(k.clone(), v.clone());
        }
        obj.insert("id".to_string(), json!(self.principal_id));
        obj.insert("roles".to_string(), json!(self.principal_roles));
        obj.insert("attr".to_string(), json!(self.principal_attrs));

        Value::Object(obj)
    }

    fn resource_object(&self) -> Value {
        let mut obj = serde_json::Map::new();

        for (k, v) in &self.resource_attrs {
            obj.insert(k.clone(), v.clone());
        }
        obj.insert("kind".to_string(), json!(self.resource_kind));
        obj.insert("id".to_string(), json!(self.resource_id));
        obj.insert("attr".to_string(), json!(self.resource_attrs));

        Value::Object(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_context() -> EvalContext {
        let principal = Principal::new("user:alice")
            .with_role("employee")
            .with_attribute("department", json!("engineering"));
        let resource = Resource::new("document", "doc-1")
            .with_attribute("owner", json!("user:alice"));

        EvalContext::of(&principal, &resource, &HashMap::new())
    }

    #[test]
    fn test_shorthand_and_qualified_forms_agree() {
        let vars = sample_context().to_variables();

        assert_eq!(vars.get("principal"), vars.get("P"));
        assert_eq!(vars.get("resource"), vars.get("R"));
    }

    #[test]
    fn test_attributes_exposed_merged_and_namespaced() {
        let vars = sample_context().to_variables();
        let principal = vars.get("principal").unwrap();

        assert_eq!(principal["department"], json!("engineering"));
        assert_eq!(principal["attr"]["department"], json!("engineering"));
    }

    #[test]
    fn test_reserved_keys_win_over_attributes() {
        let principal = Principal::new("user:alice").with_attribute("id", json!("spoofed"));
        let resource = Resource::new("document", "doc-1");
        let vars = EvalContext::of(&principal, &resource, &HashMap::new()).to_variables();

        assert_eq!(vars.get("principal").unwrap()["id"], json!("user:alice"));
    }

    #[test]
    fn test_now_exposed_in_both_forms() {
        let vars = sample_context().to_variables();

        assert!(vars.get("now").unwrap().is_string());
        assert!(vars.get("nowMillis").unwrap().is_i64());
    }
}
