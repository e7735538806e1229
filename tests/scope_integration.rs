//! Scope chain building, pattern matching, and resolution behavior

use keystone_authz::{
    match_scope, scope::validate_scope, Effect, MemoryPolicyStore, PolicyRule, PolicyStore,
    ResourcePolicy, ScopeResolver, GLOBAL_SCOPE,
};
use proptest::prelude::*;
use std::sync::Arc;

fn allow_read() -> PolicyRule {
    PolicyRule::new(vec!["read".to_string()], Effect::Allow)
}

// ============================================================================
// CHAIN BUILDING
// ============================================================================

#[test]
fn chain_orders_most_to_least_specific() {
    let resolver = ScopeResolver::new();

    assert_eq!(
        resolver.build_scope_chain("acme.corp.engineering.team1"),
        vec![
            "acme.corp.engineering.team1",
            "acme.corp.engineering",
            "acme.corp",
            "acme"
        ]
    );
    assert_eq!(resolver.build_scope_chain(""), Vec::<String>::new());
    assert_eq!(resolver.build_scope_chain("acme"), vec!["acme"]);
}

// ============================================================================
// PATTERN MATCHING
// ============================================================================

#[test]
fn wildcard_matching_table() {
    // Exact
    assert!(match_scope("acme.corp", "acme.corp"));

    // Single-segment wildcard: exactly one segment
    assert!(match_scope("acme.*", "acme.corp"));
    assert!(!match_scope("acme.*", "acme.corp.eng"));

    // Multi-segment wildcard at the end
    assert!(match_scope("acme.**", "acme.corp.eng.team1"));

    // Multi-segment wildcard at the start
    assert!(match_scope("**.engineering", "acme.corp.engineering"));

    // Multi-segment wildcard in the middle
    assert!(match_scope("acme.**.team1", "acme.corp.eng.team1"));
    assert!(match_scope("acme.**.team1", "acme.team1"));

    // Non-matches
    assert!(!match_scope("other.*", "acme.corp"));
    assert!(!match_scope("acme.corp", "acme"));
}

// ============================================================================
// VALIDATION
// ============================================================================

#[test]
fn scope_validation_enforces_depth_and_charset() {
    assert!(validate_scope("acme.corp-inc.team_1").is_ok());
    assert!(validate_scope("").is_ok());

    assert!(validate_scope("acme..corp").is_err());
    assert!(validate_scope("acme.cor p").is_err());
    assert!(validate_scope("acme.corp!").is_err());
    assert!(validate_scope(&vec!["s"; 11].join(".")).is_err());
}

// ============================================================================
// RESOLUTION
// ============================================================================

#[tokio::test]
async fn resolution_walks_chain_and_reports_it() {
    let store = MemoryPolicyStore::new();
    store
        .upsert_policy(
            ResourcePolicy::new("document", "root")
                .with_scope("acme")
                .with_rule(allow_read()),
        )
        .await
        .unwrap();
    store
        .upsert_policy(
            ResourcePolicy::new("document", "eng")
                .with_scope("acme.corp.engineering")
                .with_rule(allow_read()),
        )
        .await
        .unwrap();
    let snapshot = store.snapshot().await;

    let resolver = ScopeResolver::new();
    let resolution = resolver.resolve_policies_for_scope(
        "acme.corp.engineering.team1",
        "document",
        &snapshot,
    );

    assert_eq!(resolution.matched_scope, "acme.corp.engineering");
    assert_eq!(
        resolution.inheritance_chain,
        vec!["acme.corp.engineering.team1", "acme.corp.engineering"]
    );
    assert_eq!(resolution.effective_policy.unwrap().version, "eng");
}

#[tokio::test]
async fn resolution_is_idempotent() {
    let store = MemoryPolicyStore::new();
    store
        .upsert_policy(
            ResourcePolicy::new("document", "1")
                .with_scope("acme")
                .with_rule(allow_read()),
        )
        .await
        .unwrap();
    let snapshot = store.snapshot().await;

    let resolver = ScopeResolver::new();
    let first = resolver.resolve_policies_for_scope("acme.corp.eng", "document", &snapshot);
    let second = resolver.resolve_policies_for_scope("acme.corp.eng", "document", &snapshot);

    assert_eq!(first.matched_scope, second.matched_scope);
    assert_eq!(first.inheritance_chain, second.inheritance_chain);
}

#[tokio::test]
async fn unknown_resource_kind_resolves_to_nothing() {
    let store = MemoryPolicyStore::new();
    let snapshot = store.snapshot().await;

    let resolver = ScopeResolver::new();
    let resolution = resolver.resolve_policies_for_scope("acme", "unknown", &snapshot);

    assert!(resolution.effective_policy.is_none());
    assert_eq!(resolution.matched_scope, GLOBAL_SCOPE);
    assert_eq!(resolution.inheritance_chain, vec!["acme", GLOBAL_SCOPE]);
}

#[tokio::test]
async fn resolution_shared_across_threads() {
    let store = MemoryPolicyStore::new();
    store
        .upsert_policy(
            ResourcePolicy::new("document", "1")
                .with_scope("acme")
                .with_rule(allow_read()),
        )
        .await
        .unwrap();
    let snapshot = store.snapshot().await;
    let resolver = Arc::new(ScopeResolver::new());

    let mut handles = Vec::new();
    for i in 0..8 {
        let resolver = Arc::clone(&resolver);
        let snapshot = Arc::clone(&snapshot);
        handles.push(std::thread::spawn(move || {
            let scope = format!("acme.dept{}", i % 2);
            resolver
                .resolve_policies_for_scope(&scope, "document", &snapshot)
                .matched_scope
        }));
    }

    for handle in handles {
        assert_eq!(handle.join().unwrap(), "acme");
    }
}

// ============================================================================
// PROPERTIES
// ============================================================================

fn segment_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,6}"
}

fn scope_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(segment_strategy(), 1..=6).prop_map(|segments| segments.join("."))
}

proptest! {
    #[test]
    fn chain_starts_at_input_and_shrinks_by_one_segment(scope in scope_strategy()) {
        let resolver = ScopeResolver::new();
        let chain = resolver.build_scope_chain(&scope);
        let depth = scope.split('.').count();

        prop_assert_eq!(chain.len(), depth);
        prop_assert_eq!(&chain[0], &scope);
        for window in chain.windows(2) {
            let parent = &window[1];
            let child = &window[0];
            prop_assert!(child.starts_with(parent.as_str()));
            prop_assert_eq!(parent.split('.').count() + 1, child.split('.').count());
        }
    }

    #[test]
    fn every_scope_matches_itself(scope in scope_strategy()) {
        prop_assert!(match_scope(&scope, &scope));
    }

    #[test]
    fn trailing_multi_wildcard_matches_all_descendants(
        base in scope_strategy(),
        tail in prop::collection::vec(segment_strategy(), 0..=3),
    ) {
        let pattern = format!("{}.{}", base, "**");
        let mut scope = base.clone();
        for segment in tail {
            scope.push('.');
            scope.push_str(&segment);
        }
        prop_assert!(match_scope(&pattern, &scope));
    }

    #[test]
    fn valid_scopes_pass_validation(scope in scope_strategy()) {
        prop_assert!(validate_scope(&scope).is_ok());
    }
}
