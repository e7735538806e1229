//! Scope resolution with hierarchical chain building and caching

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::{AuthzError, Result};
use crate::policy::{PolicySnapshot, ResourcePolicy};
use crate::scope::types::{validate_scope, GLOBAL_SCOPE};

/// Default resolution cache TTL (60 seconds)
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Cache entry with TTL
#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    created_at: Instant,
}

impl<T> CacheEntry<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            created_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }
}

/// Scope-resolution cache statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses (including expired entries)
    pub misses: u64,
    /// Current number of cached entries (chains + resolutions)
    pub entries: usize,
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

/// Outcome of resolving which policy applies for a scope
///
/// Produced fresh per lookup. The chain always starts at the most
/// specific scope requested and ends at the matching scope or the
/// global sentinel.
#[derive(Debug, Clone)]
pub struct ScopeResolution {
    /// Scope whose policy was selected, or [`GLOBAL_SCOPE`]
    pub matched_scope: String,

    /// The selected policy; `None` when nothing matched even globally
    /// (not an error - the caller decides the default effect)
    pub effective_policy: Option<Arc<ResourcePolicy>>,

    /// Every scope examined, most specific first
    pub inheritance_chain: Vec<String>,
}

/// Resolves dot-hierarchical scopes to the policy set that applies
///
/// Resolution is strictly most-specific-wins with no merging: a policy
/// at a more specific scope completely replaces any policy at a less
/// specific scope for the same resource kind.
pub struct ScopeResolver {
    chain_cache: DashMap<String, CacheEntry<Vec<String>>>,
    resolution_cache: DashMap<(String, String), CacheEntry<ScopeResolution>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ScopeResolver {
    /// Create a resolver with the default cache TTL
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_CACHE_TTL)
    }

    /// Create a resolver with a custom cache TTL
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            chain_cache: DashMap::new(),
            resolution_cache: DashMap::new(),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Build the candidate-scope chain for a request scope
    ///
    /// Returns every dot-prefix from most specific (the full scope) to
    /// least specific (the first segment alone). The empty scope yields
    /// an empty chain.
    ///
    /// ```
    /// use keystone_authz::scope::ScopeResolver;
    ///
    /// let resolver = ScopeResolver::new();
    /// assert_eq!(
    ///     resolver.build_scope_chain("acme.corp.engineering.team1"),
    ///     vec!["acme.corp.engineering.team1", "acme.corp.engineering", "acme.corp", "acme"]
    /// );
    /// assert!(resolver.build_scope_chain("").is_empty());
    /// ```
    pub fn build_scope_chain(&self, scope: &str) -> Vec<String> {
        if scope.is_empty() {
            return Vec::new();
        }

        if let Some(entry) = self.chain_cache.get(scope) {
            if !entry.is_expired(self.ttl) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return entry.value.clone();
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let segments: Vec<&str> = scope.split('.').collect();
        let mut chain = Vec::with_capacity(segments.len());
        for end in (1..=segments.len()).rev() {
            chain.push(segments[..end].join("."));
        }

        self.chain_cache
            .insert(scope.to_string(), CacheEntry::new(chain.clone()));
        chain
    }

    /// Resolve the policy that applies for a scope and resource kind
    ///
    /// Walks the scope chain from most to least specific, taking the
    /// first scope with a policy for the resource kind; falls back to the
    /// global policy set, recording the [`GLOBAL_SCOPE`] sentinel in the
    /// chain. A miss even at the global level is reported, not raised.
    pub fn resolve_policies_for_scope(
        &self,
        request_scope: &str,
        resource_kind: &str,
        snapshot: &PolicySnapshot,
    ) -> ScopeResolution {
        let cache_key = (request_scope.to_string(), resource_kind.to_string());
        if let Some(entry) = self.resolution_cache.get(&cache_key) {
            if !entry.is_expired(self.ttl) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return entry.value.clone();
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let mut examined = Vec::new();
        let mut resolution = None;

        for scope in self.build_scope_chain(request_scope) {
            examined.push(scope.clone());
            if let Some(policy) = snapshot.scoped_policy(&scope, resource_kind) {
                debug!(scope = %scope, kind = resource_kind, "scoped policy matched");
                resolution = Some(ScopeResolution {
                    matched_scope: scope,
                    effective_policy: Some(policy),
                    inheritance_chain: examined.clone(),
                });
                break;
            }
        }

        let resolution = resolution.unwrap_or_else(|| {
            examined.push(GLOBAL_SCOPE.to_string());
            let policy = snapshot.global_policy(resource_kind);
            debug!(
                kind = resource_kind,
                found = policy.is_some(),
                "fell back to global policy set"
            );
            ScopeResolution {
                matched_scope: GLOBAL_SCOPE.to_string(),
                effective_policy: policy,
                inheritance_chain: examined,
            }
        });

        self.resolution_cache
            .insert(cache_key, CacheEntry::new(resolution.clone()));
        resolution
    }

    /// Combine declared principal and resource scopes into the scope a
    /// request is evaluated under
    ///
    /// One side present makes it authoritative; neither present means
    /// global. When both are present they must share a common ancestor:
    /// the longest common segment prefix wins, and fully disjoint scopes
    /// are rejected (fail-closed) rather than guessed at.
    pub fn compute_effective_scope(
        &self,
        principal_scope: Option<&str>,
        resource_scope: Option<&str>,
    ) -> Result<String> {
        match (unset_to_none(principal_scope), unset_to_none(resource_scope)) {
            (None, None) => Ok(String::new()),
            (Some(scope), None) | (None, Some(scope)) => {
                validate_scope(scope)?;
                Ok(scope.to_string())
            }
            (Some(principal), Some(resource)) => {
                validate_scope(principal)?;
                validate_scope(resource)?;

                if principal == resource {
                    return Ok(principal.to_string());
                }

                let common: Vec<&str> = principal
                    .split('.')
                    .zip(resource.split('.'))
                    .take_while(|(a, b)| a == b)
                    .map(|(a, _)| a)
                    .collect();

                if common.is_empty() {
                    return Err(AuthzError::ScopeValidation(format!(
                        "principal scope '{}' and resource scope '{}' share no common ancestor",
                        principal, resource
                    )));
                }

                Ok(common.join("."))
            }
        }
    }

    /// Clear both caches and reset the counters
    ///
    /// Invoked externally on policy reload; the resolver never clears
    /// itself.
    pub fn clear_cache(&self) {
        self.chain_cache.clear();
        self.resolution_cache.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    /// Current cache statistics
    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.chain_cache.len() + self.resolution_cache.len(),
        }
    }
}

impl Default for ScopeResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Treat an explicitly empty scope the same as an absent one
fn unset_to_none(scope: Option<&str>) -> Option<&str> {
    scope.filter(|s| !s.is_empty())
}
