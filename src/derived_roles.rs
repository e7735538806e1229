//! Derived role definitions and request-time activation
//!
//! A derived role is computed per request: it is active iff the principal
//! holds at least one of its parent roles and its condition (when present)
//! evaluates to true against the request context.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AuthzError, Result};
use crate::expr::{EvalContext, Evaluator};

/// A single derived-role definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedRoleDefinition {
    /// Unique role name within its set (e.g., "document_owner")
    pub name: String,

    /// Base roles that can activate this role; holding any one suffices
    pub parent_roles: Vec<String>,

    /// Optional condition gating activation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl DerivedRoleDefinition {
    /// Create an unconditional definition
    pub fn new(name: impl Into<String>, parent_roles: Vec<String>) -> Self {
        Self {
            name: name.into(),
            parent_roles,
            condition: None,
        }
    }

    /// Gate activation on a condition expression
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Validate the definition at load time
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(AuthzError::InvalidPolicy(
                "derived role name cannot be empty".to_string(),
            ));
        }

        if self.parent_roles.is_empty() {
            return Err(AuthzError::InvalidPolicy(format!(
                "derived role '{}' must have at least one parent role",
                self.name
            )));
        }

        for parent in &self.parent_roles {
            if parent.is_empty() {
                return Err(AuthzError::InvalidPolicy(format!(
                    "derived role '{}' has an empty parent role",
                    self.name
                )));
            }
            if parent == &self.name {
                return Err(AuthzError::InvalidPolicy(format!(
                    "derived role '{}' cannot be its own parent",
                    self.name
                )));
            }
        }

        if let Some(condition) = &self.condition {
            Evaluator::validate(condition).map_err(|e| {
                AuthzError::InvalidPolicy(format!(
                    "derived role '{}' has an invalid condition: {}",
                    self.name, e
                ))
            })?;
        }

        Ok(())
    }

    /// Does the principal hold at least one parent role?
    pub fn holds_parent(&self, principal_roles: &[String]) -> bool {
        self.parent_roles
            .iter()
            .any(|parent| principal_roles.iter().any(|role| role == parent))
    }
}

/// A named, importable bundle of derived-role definitions
///
/// Resource policies reference sets by name via `import_derived_roles`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedRoleSet {
    /// Import name of the set
    pub name: String,

    /// The definitions in this set
    pub definitions: Vec<DerivedRoleDefinition>,
}

impl DerivedRoleSet {
    /// Create a set from definitions
    pub fn new(name: impl Into<String>, definitions: Vec<DerivedRoleDefinition>) -> Self {
        Self {
            name: name.into(),
            definitions,
        }
    }

    /// Validate the set and every definition at load time
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(AuthzError::InvalidPolicy(
                "derived role set name cannot be empty".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for definition in &self.definitions {
            definition.validate()?;
            if !seen.insert(definition.name.as_str()) {
                return Err(AuthzError::InvalidPolicy(format!(
                    "duplicate derived role '{}' in set '{}'",
                    definition.name, self.name
                )));
            }
        }

        Ok(())
    }
}

/// Compute the active derived roles for a request
///
/// Definitions are evaluated against the principal's base roles only;
/// an activated role never feeds back into another definition's parent
/// set. Conditions go through the fail-closed boolean evaluator, so a
/// broken condition deactivates the role rather than erroring the check.
/// The result is sorted and de-duplicated.
pub fn activate<'a>(
    sets: impl IntoIterator<Item = &'a DerivedRoleSet>,
    principal_roles: &[String],
    evaluator: &Evaluator,
    ctx: &EvalContext,
) -> Vec<String> {
    let mut active = Vec::new();

    for set in sets {
        for definition in &set.definitions {
            if !definition.holds_parent(principal_roles) {
                continue;
            }

            let condition_holds = match &definition.condition {
                None => true,
                Some(condition) => evaluator.evaluate_bool(condition, ctx),
            };

            if condition_holds {
                debug!(role = %definition.name, set = %set.name, "derived role active");
                active.push(definition.name.clone());
            }
        }
    }

    active.sort();
    active.dedup();
    active
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Principal, Resource};
    use serde_json::json;
    use std::collections::HashMap;

    fn context_for(principal: &Principal, resource: &Resource) -> EvalContext {
        EvalContext::of(principal, resource, &HashMap::new())
    }

    #[test]
    fn test_definition_validation() {
        let valid = DerivedRoleDefinition::new("approver", vec!["reviewer".to_string()]);
        assert!(valid.validate().is_ok());

        let empty_name = DerivedRoleDefinition::new("", vec!["reviewer".to_string()]);
        assert!(empty_name.validate().is_err());

        let no_parents = DerivedRoleDefinition::new("approver", vec![]);
        assert!(no_parents.validate().is_err());

        let self_parent = DerivedRoleDefinition::new("approver", vec!["approver".to_string()]);
        assert!(self_parent.validate().is_err());
    }

    #[test]
    fn test_definition_rejects_malformed_condition() {
        let definition = DerivedRoleDefinition::new("approver", vec!["reviewer".to_string()])
            .with_condition("1 + ");
        assert!(definition.validate().is_err());
    }

    #[test]
    fn test_set_rejects_duplicate_names() {
        let set = DerivedRoleSet::new(
            "common",
            vec![
                DerivedRoleDefinition::new("approver", vec!["reviewer".to_string()]),
                DerivedRoleDefinition::new("approver", vec!["manager".to_string()]),
            ],
        );
        assert!(set.validate().is_err());
    }

    #[test]
    fn test_holds_parent_any_semantics() {
        let definition = DerivedRoleDefinition::new(
            "approver",
            vec!["reviewer".to_string(), "manager".to_string()],
        );

        assert!(definition.holds_parent(&["manager".to_string()]));
        assert!(definition.holds_parent(&["reviewer".to_string()]));
        assert!(!definition.holds_parent(&["intern".to_string()]));
    }

    #[test]
    fn test_unconditional_activation() {
        let evaluator = Evaluator::new();
        let principal = Principal::new("user:alice").with_role("employee");
        let resource = Resource::new("document", "doc-1");
        let ctx = context_for(&principal, &resource);

        let set = DerivedRoleSet::new(
            "common",
            vec![DerivedRoleDefinition::new(
                "staff",
                vec!["employee".to_string()],
            )],
        );

        let active = activate([&set], &principal.roles, &evaluator, &ctx);
        assert_eq!(active, vec!["staff".to_string()]);
    }

    #[test]
    fn test_conditional_activation() {
        let evaluator = Evaluator::new();
        let principal = Principal::new("user:alice").with_role("employee");
        let resource =
            Resource::new("document", "doc-1").with_attribute("owner", json!("user:alice"));
        let ctx = context_for(&principal, &resource);

        let set = DerivedRoleSet::new(
            "common",
            vec![
                DerivedRoleDefinition::new("owner", vec!["employee".to_string()])
                    .with_condition("resource.attr.owner == principal.id"),
                DerivedRoleDefinition::new("other_owner", vec!["employee".to_string()])
                    .with_condition("resource.attr.owner == 'user:bob'"),
            ],
        );

        let active = activate([&set], &principal.roles, &evaluator, &ctx);
        assert_eq!(active, vec!["owner".to_string()]);
    }

    #[test]
    fn test_activation_requires_parent_role() {
        let evaluator = Evaluator::new();
        let principal = Principal::new("user:alice").with_role("contractor");
        let resource = Resource::new("document", "doc-1");
        let ctx = context_for(&principal, &resource);

        let set = DerivedRoleSet::new(
            "common",
            vec![DerivedRoleDefinition::new(
                "staff",
                vec!["employee".to_string()],
            )],
        );

        let active = activate([&set], &principal.roles, &evaluator, &ctx);
        assert!(active.is_empty());
    }

    #[test]
    fn test_broken_condition_fails_closed() {
        let evaluator = Evaluator::new();
        let principal = Principal::new("user:alice").with_role("employee");
        let resource = Resource::new("document", "doc-1");
        let ctx = context_for(&principal, &resource);

        let set = DerivedRoleSet::new(
            "common",
            vec![
                DerivedRoleDefinition::new("broken", vec!["employee".to_string()])
                    .with_condition("missing.attribute == true"),
            ],
        );

        let active = activate([&set], &principal.roles, &evaluator, &ctx);
        assert!(active.is_empty());
    }

    #[test]
    fn test_activation_deduplicates_across_sets() {
        let evaluator = Evaluator::new();
        let principal = Principal::new("user:alice").with_role("employee");
        let resource = Resource::new("document", "doc-1");
        let ctx = context_for(&principal, &resource);

        let set_a = DerivedRoleSet::new(
            "a",
            vec![DerivedRoleDefinition::new(
                "staff",
                vec!["employee".to_string()],
            )],
        );
        let set_b = DerivedRoleSet::new(
            "b",
            vec![DerivedRoleDefinition::new(
                "staff",
                vec!["employee".to_string()],
            )],
        );

        let active = activate([&set_a, &set_b], &principal.roles, &evaluator, &ctx);
        assert_eq!(active, vec!["staff".to_string()]);
    }
}
