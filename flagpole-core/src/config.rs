//! Resolver configuration and builder

use crate::context::{Context, ContextSerializer, Scope};
use crate::definition::{FeatureDefinition, FeatureRegistry};
use crate::error::{FeatureError, FeatureResult};
use crate::events::EventListener;
use crate::groups::GroupMembershipSource;
use crate::resolver::{DefaultContextFn, FeatureResolver};
use crate::stores::{FeatureStore, MemoryStore};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Environment variable overriding [`ResolverConfig::store_key_prefix`]
pub const ENV_STORE_PREFIX: &str = "FLAGPOLE_STORE_PREFIX";

/// Environment variable overriding [`ResolverConfig::expiring_soon_warning_days`]
pub const ENV_EXPIRY_WARNING_DAYS: &str = "FLAGPOLE_EXPIRY_WARNING_DAYS";

/// Configuration for the feature resolver
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Key prefix for stores that namespace their keys (Redis)
    pub store_key_prefix: String,
    /// Entity kind -> stored alias
    pub entity_aliases: BTreeMap<String, String>,
    /// Warn when a registered feature expires within this many days
    pub expiring_soon_warning_days: Option<i64>,
    /// Deliver events to the registered listener
    pub emit_events: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            store_key_prefix: "features".to_string(),
            entity_aliases: BTreeMap::new(),
            expiring_soon_warning_days: Some(7),
            emit_events: true,
        }
    }
}

impl ResolverConfig {
    /// Create a new configuration builder
    pub fn builder() -> FeatureResolverBuilder {
        FeatureResolverBuilder::new()
    }

    /// Defaults overridden by `FLAGPOLE_*` environment variables
    ///
    /// `FLAGPOLE_EXPIRY_WARNING_DAYS=off` disables the expiry warning.
    pub fn from_env() -> FeatureResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> FeatureResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(prefix) = lookup(ENV_STORE_PREFIX) {
            config.store_key_prefix = prefix;
        }

        if let Some(days) = lookup(ENV_EXPIRY_WARNING_DAYS) {
            config.expiring_soon_warning_days = match days.trim().to_lowercase().as_str() {
                "" | "off" | "none" => None,
                value => Some(value.parse().map_err(|_| {
                    FeatureError::config(format!(
                        "{} must be a number of days, got '{}'",
                        ENV_EXPIRY_WARNING_DAYS, days
                    ))
                })?),
            };
        }

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    ///
    /// `expiring_soon_warning_days` must be a non-negative number of days that
    /// fits a `chrono::TimeDelta`.
    pub fn validate(&self) -> FeatureResult<()> {
        if let Some(days) = self.expiring_soon_warning_days
            && (days < 0 || chrono::TimeDelta::try_days(days).is_none())
        {
            return Err(FeatureError::config(format!(
                "expiring_soon_warning_days out of range: {}",
                days
            )));
        }
        Ok(())
    }

    /// Parse a TOML document
    ///
    /// # Examples
    ///
    /// ```
    /// use flagpole_core::ResolverConfig;
    ///
    /// let config = ResolverConfig::from_toml_str(r#"
    ///     store_key_prefix = "flags"
    ///
    ///     [entity_aliases]
    ///     "app::models::User" = "user"
    /// "#).unwrap();
    ///
    /// assert_eq!(config.store_key_prefix, "flags");
    /// assert_eq!(config.entity_aliases["app::models::User"], "user");
    /// ```
    pub fn from_toml_str(source: &str) -> FeatureResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| FeatureError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    pub fn from_toml_file(path: impl AsRef<std::path::Path>) -> FeatureResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            FeatureError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&source)
    }
}

/// Builder for creating a FeatureResolver
pub struct FeatureResolverBuilder {
    store: Option<Arc<dyn FeatureStore>>,
    registry: Option<Arc<FeatureRegistry>>,
    definitions: Vec<FeatureDefinition>,
    groups: Option<Arc<dyn GroupMembershipSource>>,
    listener: Option<Arc<dyn EventListener>>,
    default_context: Option<DefaultContextFn>,
    ambient_scope: Option<Scope>,
    config: ResolverConfig,
    #[cfg(feature = "redis")]
    redis_url: Option<String>,
}

impl FeatureResolverBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            store: None,
            registry: None,
            definitions: Vec::new(),
            groups: None,
            listener: None,
            default_context: None,
            ambient_scope: None,
            config: ResolverConfig::default(),
            #[cfg(feature = "redis")]
            redis_url: None,
        }
    }

    /// Use the given store
    pub fn store(mut self, store: Arc<dyn FeatureStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a fresh in-memory store (default)
    pub fn memory_store(mut self) -> Self {
        self.store = Some(Arc::new(MemoryStore::new()));
        self
    }

    /// Use a Redis store, namespaced by `store_key_prefix`
    #[cfg(feature = "redis")]
    pub fn redis_store(mut self, url: &str) -> Self {
        self.redis_url = Some(url.to_string());
        self
    }

    /// Share an existing registry
    pub fn registry(mut self, registry: Arc<FeatureRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Register a feature definition at build time
    pub fn define(mut self, definition: FeatureDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    /// Consult a group membership source for fallback values
    pub fn groups(mut self, groups: Arc<dyn GroupMembershipSource>) -> Self {
        self.groups = Some(groups);
        self
    }

    /// Deliver events to a listener
    pub fn listener(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Provider for the context used by `resolve_default`
    pub fn default_context<F>(mut self, provider: F) -> Self
    where
        F: Fn() -> Option<Context> + Send + Sync + 'static,
    {
        self.default_context = Some(Arc::new(provider));
        self
    }

    /// Scope inherited by contexts that carry none
    pub fn ambient_scope(mut self, scope: Scope) -> Self {
        self.ambient_scope = Some(scope);
        self
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    /// Map an entity kind onto a stored alias
    pub fn entity_alias(mut self, kind: impl Into<String>, alias: impl Into<String>) -> Self {
        self.config.entity_aliases.insert(kind.into(), alias.into());
        self
    }

    /// Set the store key prefix
    pub fn store_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.store_key_prefix = prefix.into();
        self
    }

    /// Enable or disable event delivery
    pub fn emit_events(mut self, emit: bool) -> Self {
        self.config.emit_events = emit;
        self
    }

    /// Build the resolver
    ///
    /// # Errors
    ///
    /// Fails on out-of-range configuration, conflicting entity aliases or
    /// invalid definitions, before any feature is resolved.
    pub async fn build(self) -> FeatureResult<FeatureResolver> {
        self.config.validate()?;
        let serializer = ContextSerializer::with_aliases(self.config.entity_aliases.clone())?;

        #[cfg(feature = "redis")]
        let redis_store: Option<Arc<dyn FeatureStore>> = match &self.redis_url {
            Some(url) => Some(Arc::new(
                crate::stores::RedisStore::with_prefix(url, self.config.store_key_prefix.clone())
                    .await?,
            )),
            None => None,
        };
        #[cfg(not(feature = "redis"))]
        let redis_store: Option<Arc<dyn FeatureStore>> = None;

        let store = match (redis_store, self.store) {
            (Some(store), _) | (None, Some(store)) => store,
            (None, None) => Arc::new(MemoryStore::new()),
        };
        let registry = self.registry.unwrap_or_default();

        debug!(
            store_type = store.store_type(),
            definitions = self.definitions.len(),
            aliases = self.config.entity_aliases.len(),
            "Building feature resolver"
        );

        let mut resolver = FeatureResolver::from_parts(
            store,
            registry,
            self.groups,
            self.listener,
            self.default_context,
            serializer,
            self.ambient_scope,
            self.config,
        );

        for definition in self.definitions {
            resolver.define(definition)?;
        }

        Ok(resolver)
    }
}

impl Default for FeatureResolverBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ResolverConfig::default();
        assert_eq!(config.store_key_prefix, "features");
        assert_eq!(config.expiring_soon_warning_days, Some(7));
        assert!(config.emit_events);
        assert!(config.entity_aliases.is_empty());
    }

    #[test]
    fn test_env_overrides() {
        let config = ResolverConfig::from_lookup(lookup(&[
            (ENV_STORE_PREFIX, "flags"),
            (ENV_EXPIRY_WARNING_DAYS, "14"),
        ]))
        .unwrap();
        assert_eq!(config.store_key_prefix, "flags");
        assert_eq!(config.expiring_soon_warning_days, Some(14));

        let config =
            ResolverConfig::from_lookup(lookup(&[(ENV_EXPIRY_WARNING_DAYS, "off")])).unwrap();
        assert_eq!(config.expiring_soon_warning_days, None);
    }

    #[test]
    fn test_env_rejects_bad_days() {
        let err = ResolverConfig::from_lookup(lookup(&[(ENV_EXPIRY_WARNING_DAYS, "soon")]))
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_env_rejects_out_of_range_days() {
        for days in ["9223372036854775807", "-3"] {
            let err = ResolverConfig::from_lookup(lookup(&[(ENV_EXPIRY_WARNING_DAYS, days)]))
                .unwrap_err();
            assert!(err.is_configuration(), "{} accepted", days);
        }
    }

    #[test]
    fn test_toml_rejects_out_of_range_days() {
        let err = ResolverConfig::from_toml_str("expiring_soon_warning_days = 9223372036854775807")
            .unwrap_err();
        assert!(err.is_configuration());

        let config = ResolverConfig::from_toml_str("expiring_soon_warning_days = 36500").unwrap();
        assert_eq!(config.expiring_soon_warning_days, Some(36500));
    }

    #[tokio::test]
    async fn test_build_rejects_out_of_range_days() {
        let config = ResolverConfig {
            expiring_soon_warning_days: Some(i64::MAX),
            ..ResolverConfig::default()
        };
        let result = FeatureResolverBuilder::new()
            .config(config)
            .define(
                FeatureDefinition::boolean("x", true).expires_after(chrono::Duration::days(1)),
            )
            .build()
            .await;
        assert!(matches!(result, Err(FeatureError::Config(_))));
    }

    #[test]
    fn test_toml_partial_uses_defaults() {
        let config = ResolverConfig::from_toml_str(
            r#"
            emit_events = false

            [entity_aliases]
            "app::User" = "user"
            "app::Team" = "team"
            "#,
        )
        .unwrap();
        assert!(!config.emit_events);
        assert_eq!(config.store_key_prefix, "features");
        assert_eq!(config.entity_aliases.len(), 2);
    }

    #[test]
    fn test_toml_syntax_error() {
        let err = ResolverConfig::from_toml_str("store_key_prefix = ").unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_build_rejects_conflicting_aliases() {
        let result = FeatureResolverBuilder::new()
            .entity_alias("app::User", "user")
            .entity_alias("legacy::User", "user")
            .build()
            .await;
        assert!(matches!(result, Err(FeatureError::ConflictingKeyMapping(_))));
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_definition() {
        let result = ResolverConfig::builder()
            .define(FeatureDefinition::percentage("rollout", 150))
            .build()
            .await;
        assert!(matches!(result, Err(FeatureError::InvalidPercentage { .. })));
    }

    #[tokio::test]
    async fn test_build_defaults_to_memory_store() {
        let resolver = FeatureResolverBuilder::new()
            .define(FeatureDefinition::boolean("new-ui", true))
            .build()
            .await
            .unwrap();
        assert_eq!(resolver.store().store_type(), "memory");
        assert_eq!(resolver.defined(), vec!["new-ui".to_string()]);
    }
}
