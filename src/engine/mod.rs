//! Decision engine: the per-request evaluation pipeline
//!
//! ```text
//! CheckRequest → effective scope → ScopeResolver → derived roles → per-action
//!                                                                  deny-overrides
//!                     [resolution cache]      [expression cache]        ↓
//!                                                               CheckResponse
//! ```
//!
//! The pipeline is stateless per request; the expression cache and the
//! resolution cache are the only shared mutable state. Every action gets
//! exactly one result, and anything ambiguous resolves to DENY.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::derived_roles;
use crate::error::Result;
use crate::expr::{self, EvalContext, EvalOutcome, Evaluator, EvaluatorConfig};
use crate::policy::{PolicyRule, PolicyStore, ResourcePolicy};
use crate::scope::{self, validate_scope, ScopeResolver};
use crate::types::{ActionResult, CheckRequest, CheckResponse, Effect, EvaluationMeta};

/// Policy identity reported when no rule decides an action
pub const DEFAULT_DENY_POLICY: &str = "default-deny";

/// Engine configuration
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Expression-evaluator cache settings
    pub expression_cache: EvaluatorConfig,

    /// Scope-resolution cache TTL; `None` keeps the resolver default
    pub resolution_cache_ttl: Option<Duration>,
}

/// Cache statistics for both engine-owned caches
#[derive(Debug, Clone)]
pub struct EngineCacheStats {
    /// Compiled-expression cache
    pub expression: expr::CacheStats,

    /// Scope-resolution cache
    pub resolution: scope::CacheStats,
}

/// Policy decision engine
///
/// One long-lived instance serves many concurrent checks; all methods
/// take `&self` and the internal caches support concurrent readers.
pub struct DecisionEngine {
    evaluator: Arc<Evaluator>,
    resolver: Arc<ScopeResolver>,
    store: Arc<dyn PolicyStore>,
}

impl DecisionEngine {
    /// Create an engine with default configuration
    pub fn new(store: Arc<dyn PolicyStore>) -> Self {
        Self::with_config(EngineConfig::default(), store)
    }

    /// Create an engine with custom cache configuration
    pub fn with_config(config: EngineConfig, store: Arc<dyn PolicyStore>) -> Self {
        let resolver = match config.resolution_cache_ttl {
            Some(ttl) => ScopeResolver::with_ttl(ttl),
            None => ScopeResolver::new(),
        };

        Self {
            evaluator: Arc::new(Evaluator::with_config(config.expression_cache)),
            resolver: Arc::new(resolver),
            store,
        }
    }

    /// Decide every requested action
    ///
    /// The request's explicit scope wins when set; otherwise the
    /// effective scope is computed from the principal's and resource's
    /// declared scopes. Business-level outcomes never error - the only
    /// failure mode is a structurally invalid request scope.
    pub async fn check(&self, request: &CheckRequest) -> Result<CheckResponse> {
        let scope = match &request.scope {
            Some(scope) => {
                validate_scope(scope)?;
                scope.clone()
            }
            None => self.resolver.compute_effective_scope(
                request.principal.scope.as_deref(),
                request.resource.scope.as_deref(),
            )?,
        };

        self.check_scoped(request, &scope).await
    }

    /// Decide every requested action under an explicit scope
    pub async fn check_with_scope(
        &self,
        request: &CheckRequest,
        scope: &str,
    ) -> Result<CheckResponse> {
        validate_scope(scope)?;
        self.check_scoped(request, scope).await
    }

    /// Clear the expression and resolution caches
    ///
    /// Hook for the external policy source to call on reload events.
    pub fn clear_caches(&self) {
        self.evaluator.clear_cache();
        self.resolver.clear_cache();
        info!("engine caches cleared");
    }

    /// Statistics for both engine-owned caches
    pub fn cache_stats(&self) -> EngineCacheStats {
        EngineCacheStats {
            expression: self.evaluator.cache_stats(),
            resolution: self.resolver.cache_stats(),
        }
    }

    /// The engine's expression evaluator, for administrative tooling
    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// The engine's scope resolver, for administrative tooling
    pub fn resolver(&self) -> &ScopeResolver {
        &self.resolver
    }

    async fn check_scoped(&self, request: &CheckRequest, scope: &str) -> Result<CheckResponse> {
        let start = Instant::now();

        debug!(
            principal = %request.principal.id,
            resource = %request.resource.kind,
            actions = request.actions.len(),
            scope,
            "check started"
        );

        let snapshot = self.store.snapshot().await;
        let resolution =
            self.resolver
                .resolve_policies_for_scope(scope, &request.resource.kind, &snapshot);
        let ctx = EvalContext::from_request(request);

        let mut errors = Vec::new();
        let (results, active_derived_roles, policies_consulted) =
            match &resolution.effective_policy {
                None => {
                    debug!(kind = %request.resource.kind, "no applicable policy, default deny");
                    let results = request
                        .actions
                        .iter()
                        .map(|action| default_deny(action))
                        .collect();
                    (results, Vec::new(), Vec::new())
                }
                Some(policy) => {
                    let sets = snapshot.imported_sets(policy);
                    let active = derived_roles::activate(
                        sets.iter().map(|set| &**set),
                        &request.principal.roles,
                        &self.evaluator,
                        &ctx,
                    );

                    let results = request
                        .actions
                        .iter()
                        .map(|action| {
                            self.evaluate_action(
                                action,
                                policy,
                                &request.principal.roles,
                                &active,
                                &ctx,
                                &mut errors,
                            )
                        })
                        .collect();

                    (results, active, vec![policy.identifier()])
                }
            };

        let response = CheckResponse {
            request_id: request
                .request_id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            results,
            derived_roles: active_derived_roles,
            meta: EvaluationMeta {
                matched_scope: resolution.matched_scope.clone(),
                inheritance_chain: resolution.inheritance_chain.clone(),
                duration_micros: start.elapsed().as_micros() as u64,
                policies_consulted,
                errors,
            },
        };

        info!(
            request_id = %response.request_id,
            matched_scope = %response.meta.matched_scope,
            allowed = response.results.iter().filter(|r| r.effect.is_allow()).count(),
            denied = response.results.iter().filter(|r| !r.effect.is_allow()).count(),
            duration_micros = response.meta.duration_micros,
            "check complete"
        );

        Ok(response)
    }

    /// Deny-overrides evaluation of a single action
    ///
    /// Phase A scans DENY rules, phase B scans ALLOW rules, phase C is
    /// the default deny. Failures while matching are absorbed into
    /// `errors` and the action stays DENY - one bad action never aborts
    /// its batch.
    fn evaluate_action(
        &self,
        action: &str,
        policy: &ResourcePolicy,
        base_roles: &[String],
        derived_roles: &[String],
        ctx: &EvalContext,
        errors: &mut Vec<String>,
    ) -> ActionResult {
        for effect in [Effect::Deny, Effect::Allow] {
            let matched = policy
                .rules
                .iter()
                .filter(|rule| rule.effect == effect)
                .find(|rule| {
                    rule.covers_action(action)
                        && rule_roles_match(rule, base_roles, derived_roles)
                        && self.condition_holds(rule, policy, action, ctx, errors)
                });

            if let Some(rule) = matched {
                debug!(action, effect = ?effect, policy = %policy.identifier(), "rule matched");
                return ActionResult {
                    action: action.to_string(),
                    effect,
                    policy: policy.identifier(),
                    rule: rule.name.clone(),
                };
            }
        }

        debug!(action, "no rule matched, default deny");
        default_deny(action)
    }

    /// Fail-closed condition gate
    ///
    /// Identical semantics to [`Evaluator::evaluate_bool`]: only an
    /// outcome of exactly `true` passes. Evaluation failures are
    /// additionally recorded for the response metadata.
    fn condition_holds(
        &self,
        rule: &PolicyRule,
        policy: &ResourcePolicy,
        action: &str,
        ctx: &EvalContext,
        errors: &mut Vec<String>,
    ) -> bool {
        let Some(condition) = &rule.condition else {
            return true;
        };

        let outcome = self.evaluator.evaluate_expr(condition, ctx);
        if let EvalOutcome::Failed { ref message, .. } = outcome {
            warn!(
                action,
                policy = %policy.identifier(),
                error = %message,
                "condition evaluation failed, treating as false"
            );
            errors.push(format!(
                "action '{}': condition of policy '{}' failed: {}",
                action,
                policy.identifier(),
                message
            ));
        }
        outcome.is_true()
    }
}

/// Does the rule's role restriction admit this principal?
///
/// An unrestricted rule matches everyone. Otherwise the rule's role and
/// derived-role sets are intersected with the principal's base roles
/// united with the request's active derived roles.
fn rule_roles_match(rule: &PolicyRule, base_roles: &[String], derived_roles: &[String]) -> bool {
    if rule.is_unrestricted() {
        return true;
    }

    let held = |role: &String| {
        base_roles.iter().any(|r| r == role) || derived_roles.iter().any(|r| r == role)
    };

    rule.roles.iter().any(held) || rule.derived_roles.iter().any(held)
}

fn default_deny(action: &str) -> ActionResult {
    ActionResult {
        action: action.to_string(),
        effect: Effect::Deny,
        policy: DEFAULT_DENY_POLICY.to_string(),
        rule: None,
    }
}
