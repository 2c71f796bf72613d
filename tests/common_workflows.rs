//! Integration tests for common Flagpole workflows.
//!
//! These tests verify that the most common use cases work correctly through
//! the facade crate.

use flagpole::*;
use flagpole_testing::{RecordingStore, team, user};
use serde_json::json;
use std::sync::Arc;

// =============================================================================
// Rollout Tests
// =============================================================================

#[tokio::test]
async fn test_gradual_rollout_then_launch() {
    let store = Arc::new(MemoryStore::new());
    let mut resolver = FeatureResolver::builder()
        .store(store.clone())
        .define(FeatureDefinition::percentage("new-checkout", 20))
        .build()
        .await
        .unwrap();

    let mut enabled = 0;
    for id in 0..500 {
        if resolver.is_active("new-checkout", &user(id)).await.unwrap() {
            enabled += 1;
        }
    }
    assert!((50..=150).contains(&enabled), "{} of 500 enabled", enabled);
    assert_eq!(store.rows_for("new-checkout"), 500);

    // Launch: every context already seen flips on
    resolver.activate_for_everyone("new-checkout").await.unwrap();
    for id in 0..500 {
        assert!(resolver.is_active("new-checkout", &user(id)).await.unwrap());
    }
}

#[tokio::test]
async fn test_rollout_is_sticky_across_units_of_work() {
    let store = Arc::new(MemoryStore::new());
    let base = FeatureResolver::builder()
        .store(store)
        .define(FeatureDefinition::percentage("beta", 50))
        .build()
        .await
        .unwrap();

    let mut first = base.fork();
    let mut second = base.fork();
    for id in 0..50 {
        assert_eq!(
            first.resolve("beta", &user(id)).await.unwrap(),
            second.resolve("beta", &user(id)).await.unwrap()
        );
    }
}

// =============================================================================
// Rich Value Tests
// =============================================================================

#[tokio::test]
async fn test_rich_values_per_plan() {
    let mut resolver = FeatureResolver::builder()
        .define(FeatureDefinition::new("api-limits", |context: &Context| {
            match context.identity() {
                Identity::Entity { kind, .. } if kind == "Team" => json!({"rpm": 1000}),
                Identity::Null => json!(false),
                _ => json!({"rpm": 60}),
            }
        }))
        .build()
        .await
        .unwrap();

    let team_limits = resolver.resolve("api-limits", &team(1)).await.unwrap();
    assert_eq!(team_limits.payload(), Some(&json!({"rpm": 1000})));

    let user_limits = resolver.resolve("api-limits", &user(1)).await.unwrap();
    assert_eq!(user_limits.payload(), Some(&json!({"rpm": 60})));

    assert!(!resolver.is_active("api-limits", &Context::null()).await.unwrap());
}

#[tokio::test]
async fn test_values_snapshot() {
    let mut resolver = FeatureResolver::builder()
        .define(FeatureDefinition::boolean("dark-mode", true))
        .define(FeatureDefinition::constant("banner", "spring-sale"))
        .build()
        .await
        .unwrap();

    let values = resolver
        .values(&["dark-mode", "banner", "unknown"], &user(3))
        .await
        .unwrap();

    assert_eq!(values["dark-mode"], FeatureValue::on());
    assert_eq!(values["banner"].as_str(), Some("spring-sale"));
    assert!(values["unknown"].is_undefined());
}

// =============================================================================
// Multi-tenant Tests
// =============================================================================

#[tokio::test]
async fn test_tenant_scoped_values() {
    let mut resolver = FeatureResolver::builder().build().await.unwrap();
    let acme = Scope::new("tenant").with("id", "acme");
    let globex = Scope::new("tenant").with("id", "globex");

    resolver.set_ambient_scope(Some(acme.clone()));
    resolver.activate("reports", &user(1)).await.unwrap();
    assert!(resolver.is_active("reports", &user(1)).await.unwrap());

    resolver.set_ambient_scope(Some(globex));
    assert!(!resolver.is_active("reports", &user(1)).await.unwrap());

    // An explicit scope wins over the ambient one
    let scoped = user(1).with_scope(acme);
    assert!(resolver.is_active("reports", &scoped).await.unwrap());
}

// =============================================================================
// Configuration Tests
// =============================================================================

#[tokio::test]
async fn test_toml_configured_resolver() {
    let config = ResolverConfig::from_toml_str(
        r#"
        store_key_prefix = "flags"
        expiring_soon_warning_days = 14

        [entity_aliases]
        "billing::Account" = "account"
        "#,
    )
    .unwrap();

    let store = Arc::new(RecordingStore::new(Arc::new(MemoryStore::new())));
    let mut resolver = FeatureResolver::builder()
        .store(store.clone())
        .config(config)
        .define(FeatureDefinition::boolean("invoices-v2", true))
        .build()
        .await
        .unwrap();

    let account = Context::entity("billing::Account", 77);
    assert!(resolver.is_active("invoices-v2", &account).await.unwrap());
    assert_eq!(store.calls_for("insert", "invoices-v2", "account|77"), 1);
    assert_eq!(resolver.config().expiring_soon_warning_days, Some(14));
}

#[tokio::test]
async fn test_logging_does_not_interfere() {
    flagpole_log::init();

    let mut resolver = FeatureResolver::builder()
        .define(FeatureDefinition::boolean("a", true))
        .build()
        .await
        .unwrap();
    assert!(resolver.is_active("a", &user(1)).await.unwrap());
}
