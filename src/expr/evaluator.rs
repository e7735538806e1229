//! Condition expression evaluator with compiled-program caching

use cel_interpreter::{Context, ExecutionError, Program};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::expr::{
    context::EvalContext,
    convert::{cel_to_json, json_to_cel},
    error::{EvalFailureKind, EvalOutcome, ExprError, Result},
    functions,
};

/// Default compiled-program cache capacity
const DEFAULT_CACHE_CAPACITY: usize = 1_000;

/// Default compiled-program cache TTL (1 hour)
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3_600);

/// Evaluator configuration
#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    /// Maximum number of cached compiled programs
    pub cache_capacity: usize,

    /// Time-to-live for cached compiled programs
    pub cache_ttl: Duration,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

/// Cached compiled program with its compile timestamp
struct CacheEntry {
    program: Arc<Program>,
    compiled_at: Instant,
}

impl CacheEntry {
    fn new(program: Arc<Program>) -> Self {
        Self {
            program,
            compiled_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.compiled_at.elapsed() > ttl
    }
}

/// Compiled-program cache statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses (including expired entries)
    pub misses: u64,
    /// Current number of cached programs
    pub entries: usize,
    /// Configured capacity
    pub capacity: usize,
}

impl CacheStats {
    /// Cache hit rate in [0, 1]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Sandboxed boolean-expression evaluator
///
/// Compiles condition expressions into reusable programs, caches them by
/// raw expression text, and evaluates them against an [`EvalContext`].
/// Runtime failures are tagged outcomes, never panics; the fail-closed
/// [`Evaluator::evaluate_bool`] is the only entry point the decision
/// engine consults for rule conditions.
pub struct Evaluator {
    cache: DashMap<String, CacheEntry>,
    config: EvaluatorConfig,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Evaluator {
    /// Create an evaluator with default cache settings
    pub fn new() -> Self {
        Self::with_config(EvaluatorConfig::default())
    }

    /// Create an evaluator with custom cache settings
    pub fn with_config(config: EvaluatorConfig) -> Self {
        Self {
            cache: DashMap::new(),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Compile an expression, serving repeats from the cache
    ///
    /// Successful compiles are cached keyed by the raw expression text.
    /// Expired entries count as misses and are recompiled in place.
    ///
    /// # Errors
    ///
    /// Returns [`ExprError::Parse`] for malformed syntax.
    pub fn compile(&self, expr: &str) -> Result<Arc<Program>> {
        if let Some(entry) = self.cache.get(expr) {
            if !entry.is_expired(self.config.cache_ttl) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(entry.program.clone());
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let program = Arc::new(
            Program::compile(expr).map_err(|e| ExprError::Parse(format!("{:?}", e)))?,
        );

        if self.cache.len() >= self.config.cache_capacity {
            self.evict_oldest_batch();
        }
        self.cache
            .insert(expr.to_string(), CacheEntry::new(program.clone()));

        Ok(program)
    }

    /// Validate an expression without touching the cache
    ///
    /// Used by policy loading to reject malformed conditions before a
    /// policy is activated.
    pub fn validate(expr: &str) -> Result<()> {
        Program::compile(expr)
            .map(|_| ())
            .map_err(|e| ExprError::Parse(format!("{:?}", e)))
    }

    /// Evaluate a compiled program against a context
    ///
    /// Never returns an error for runtime failures; type mismatches and
    /// missing fields come back as a tagged [`EvalOutcome::Failed`].
    pub fn evaluate(&self, program: &Program, ctx: &EvalContext) -> EvalOutcome {
        let mut cel_context = Context::default();
        functions::register(&mut cel_context);

        for (key, value) in ctx.to_variables() {
            cel_context.add_variable_from_value(key, json_to_cel(&value));
        }

        match program.execute(&cel_context) {
            Ok(value) => match cel_to_json(&value) {
                Ok(json) => EvalOutcome::Value(json),
                Err(e) => EvalOutcome::Failed {
                    kind: EvalFailureKind::Type,
                    message: e.to_string(),
                },
            },
            Err(e) => {
                let kind = match &e {
                    ExecutionError::UnexpectedType { .. } => EvalFailureKind::Type,
                    _ => EvalFailureKind::Evaluation,
                };
                EvalOutcome::Failed {
                    kind,
                    message: format!("{:?}", e),
                }
            }
        }
    }

    /// Compile and evaluate an expression in one call
    pub fn evaluate_expr(&self, expr: &str, ctx: &EvalContext) -> EvalOutcome {
        match self.compile(expr) {
            Ok(program) => self.evaluate(&program, ctx),
            Err(e) => EvalOutcome::Failed {
                kind: EvalFailureKind::Evaluation,
                message: e.to_string(),
            },
        }
    }

    /// Fail-closed boolean evaluation
    ///
    /// Any compile failure, evaluation failure, or result other than
    /// exactly boolean `true` yields `false`. The security posture of the
    /// decision engine depends on this never defaulting open.
    pub fn evaluate_bool(&self, expr: &str, ctx: &EvalContext) -> bool {
        let outcome = self.evaluate_expr(expr, ctx);
        if let EvalOutcome::Failed { ref message, .. } = outcome {
            debug!(expr, error = %message, "condition failed closed");
        }
        outcome.is_true()
    }

    /// Clear the cache and reset the hit/miss counters
    ///
    /// Invoked externally on policy reload; the evaluator never clears
    /// itself.
    pub fn clear_cache(&self) {
        self.cache.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    /// Current cache statistics
    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.cache.len(),
            capacity: self.config.cache_capacity,
        }
    }

    /// Drop the oldest ~10% of cached programs
    ///
    /// Approximate LRU: entries are aged by compile time, not by last
    /// access, and evicted in a batch. Per-access recency bookkeeping is
    /// deliberately avoided.
    fn evict_oldest_batch(&self) {
        let batch = (self.config.cache_capacity / 10).max(1);

        let mut entries: Vec<(String, Instant)> = self
            .cache
            .iter()
            .map(|e| (e.key().clone(), e.value().compiled_at))
            .collect();
        entries.sort_by_key(|(_, compiled_at)| *compiled_at);

        for (key, _) in entries.into_iter().take(batch) {
            self.cache.remove(&key);
        }
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Principal, Resource};
    use serde_json::json;
    use std::collections::HashMap;

    fn test_context() -> EvalContext {
        let principal = Principal::new("user:alice")
            .with_role("admin")
            .with_role("editor")
            .with_attribute("department", json!("engineering"));
        let resource = Resource::new("document", "doc-1")
            .with_attribute("owner", json!("user:alice"));

        EvalContext::of(&principal, &resource, &HashMap::new())
    }

    #[test]
    fn test_simple_expressions() {
        let evaluator = Evaluator::new();
        let ctx = test_context();

        assert!(evaluator.evaluate_bool("true", &ctx));
        assert!(!evaluator.evaluate_bool("false", &ctx));
        assert!(evaluator.evaluate_bool("1 == 1", &ctx));
    }

    #[test]
    fn test_variable_access_both_forms() {
        let evaluator = Evaluator::new();
        let ctx = test_context();

        assert!(evaluator.evaluate_bool("principal.id == 'user:alice'", &ctx));
        assert!(evaluator.evaluate_bool("P.id == 'user:alice'", &ctx));
        assert!(evaluator.evaluate_bool("resource.kind == 'document'", &ctx));
        assert!(evaluator.evaluate_bool("R.kind == 'document'", &ctx));
    }

    #[test]
    fn test_role_membership() {
        let evaluator = Evaluator::new();
        let ctx = test_context();

        assert!(evaluator.evaluate_bool("'admin' in principal.roles", &ctx));
        assert!(!evaluator.evaluate_bool("'viewer' in principal.roles", &ctx));
    }

    #[test]
    fn test_fail_closed_on_parse_error() {
        let evaluator = Evaluator::new();
        let ctx = test_context();

        assert!(!evaluator.evaluate_bool("1 + ", &ctx));
        assert!(!evaluator.evaluate_bool("@@invalid@@", &ctx));
    }

    #[test]
    fn test_fail_closed_on_non_boolean() {
        let evaluator = Evaluator::new();
        let ctx = test_context();

        assert!(!evaluator.evaluate_bool("'hello'", &ctx));
        assert!(!evaluator.evaluate_bool("42", &ctx));
    }

    #[test]
    fn test_fail_closed_on_unknown_variable() {
        let evaluator = Evaluator::new();
        let ctx = test_context();

        assert!(!evaluator.evaluate_bool("nonexistent.field == 1", &ctx));
    }

    #[test]
    fn test_compile_error_kind() {
        let evaluator = Evaluator::new();

        let result = evaluator.compile("1 + ");
        assert!(matches!(result, Err(ExprError::Parse(_))));
    }

    #[test]
    fn test_cache_hit_on_second_compile() {
        let evaluator = Evaluator::new();

        evaluator.compile("principal.id == 'x'").unwrap();
        let stats = evaluator.cache_stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 1);

        evaluator.compile("principal.id == 'x'").unwrap();
        let stats = evaluator.cache_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert!(stats.hit_rate() > 0.49);
    }

    #[test]
    fn test_cached_program_equivalent_to_fresh_parse() {
        let evaluator = Evaluator::new();
        let ctx = test_context();

        let first = evaluator.evaluate_bool("'admin' in principal.roles", &ctx);
        let second = evaluator.evaluate_bool("'admin' in principal.roles", &ctx);
        assert_eq!(first, second);
        assert!(first);
    }

    #[test]
    fn test_cache_expiry_counts_as_miss() {
        let evaluator = Evaluator::with_config(EvaluatorConfig {
            cache_capacity: 10,
            cache_ttl: Duration::from_millis(10),
        });

        evaluator.compile("true").unwrap();
        std::thread::sleep(Duration::from_millis(30));
        evaluator.compile("true").unwrap();

        let stats = evaluator.cache_stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_batch_eviction_keeps_cache_bounded() {
        let evaluator = Evaluator::with_config(EvaluatorConfig {
            cache_capacity: 10,
            cache_ttl: Duration::from_secs(3600),
        });

        for i in 0..25 {
            evaluator.compile(&format!("{} == {}", i, i)).unwrap();
        }

        assert!(evaluator.cache_stats().entries <= 11);
    }

    #[test]
    fn test_clear_cache() {
        let evaluator = Evaluator::new();

        evaluator.compile("true").unwrap();
        assert_eq!(evaluator.cache_stats().entries, 1);

        evaluator.clear_cache();
        let stats = evaluator.cache_stats();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn test_evaluate_returns_tagged_failure() {
        let evaluator = Evaluator::new();
        let ctx = test_context();

        let program = evaluator.compile("missing.attr == 'x'").unwrap();
        let outcome = evaluator.evaluate(&program, &ctx);
        assert!(!outcome.is_success());
        assert!(!outcome.is_true());
    }

    #[test]
    fn test_builtin_functions_available() {
        let evaluator = Evaluator::new();
        let ctx = test_context();

        assert!(evaluator.evaluate_bool("durationMillis('30s') == 30000", &ctx));
        assert!(evaluator.evaluate_bool("typeName(principal.id) == 'string'", &ctx));
        assert!(evaluator.evaluate_bool("ipInRange('10.0.0.5', '10.0.0.0/24')", &ctx));
    }
}
