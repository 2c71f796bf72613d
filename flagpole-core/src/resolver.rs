//! Feature resolver
//!
//! [`FeatureResolver`] ties the pieces together. A lookup goes through, in
//! order: expiration, required features, the resolution cache, the store
//! (computing and persisting a first value when nothing is stored) and
//! finally group fallback.
//!
//! One resolver is one unit of work. Its cache is never shared; use
//! [`FeatureResolver::fork`] to start another unit of work against the same
//! store and registry.

use crate::bucket::VariantWeights;
use crate::cache::ResolutionCache;
use crate::config::{FeatureResolverBuilder, ResolverConfig};
use crate::context::{Context, ContextSerializer, Scope};
use crate::definition::{FeatureDefinition, FeatureRegistry};
use crate::dependency::DependencyGuard;
use crate::error::{FeatureError, FeatureResult};
use crate::events::{EventListener, FeatureEvent};
use crate::groups::GroupMembershipSource;
use crate::stores::FeatureStore;
use crate::value::{FeatureValue, Payload};
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Provider for the context used when none is passed explicitly.
pub type DefaultContextFn = Arc<dyn Fn() -> Option<Context> + Send + Sync>;

/// Feature resolution engine
pub struct FeatureResolver {
    store: Arc<dyn FeatureStore>,
    registry: Arc<FeatureRegistry>,
    groups: Option<Arc<dyn GroupMembershipSource>>,
    listener: Option<Arc<dyn EventListener>>,
    default_context: Option<DefaultContextFn>,
    serializer: Arc<ContextSerializer>,
    config: Arc<ResolverConfig>,
    ambient_scope: Option<Scope>,
    cache: ResolutionCache,
}

impl FeatureResolver {
    /// Create a new resolver builder
    pub fn builder() -> FeatureResolverBuilder {
        FeatureResolverBuilder::new()
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        store: Arc<dyn FeatureStore>,
        registry: Arc<FeatureRegistry>,
        groups: Option<Arc<dyn GroupMembershipSource>>,
        listener: Option<Arc<dyn EventListener>>,
        default_context: Option<DefaultContextFn>,
        serializer: ContextSerializer,
        ambient_scope: Option<Scope>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            store,
            registry,
            groups,
            listener,
            default_context,
            serializer: Arc::new(serializer),
            config: Arc::new(config),
            ambient_scope,
            cache: ResolutionCache::new(),
        }
    }

    /// New unit of work sharing store, registry and groups, with an empty cache
    pub fn fork(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            registry: Arc::clone(&self.registry),
            groups: self.groups.clone(),
            listener: self.listener.clone(),
            default_context: self.default_context.clone(),
            serializer: Arc::clone(&self.serializer),
            config: Arc::clone(&self.config),
            ambient_scope: self.ambient_scope.clone(),
            cache: ResolutionCache::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn FeatureStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<FeatureRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    /// Storage key of a context, ambient scope included
    pub fn context_key(&self, context: &Context) -> String {
        self.serializer.serialize(context, self.ambient_scope.as_ref())
    }

    // ========== Definitions ==========

    /// Register or replace a feature definition
    pub fn define(&mut self, definition: FeatureDefinition) -> FeatureResult<()> {
        if let Some(days) = self.config.expiring_soon_warning_days
            && let Some(expiration) = definition.expiration()
            && expiration.is_expiring_soon(days)
        {
            warn!(
                feature = %definition.name(),
                expires_at = %expiration.expires_at(),
                "Feature expires soon"
            );
        }

        let name = definition.name().to_string();
        self.registry.define(definition)?;
        self.cache.forget_feature(&name);
        debug!(feature = %name, "Defined feature");
        Ok(())
    }

    /// Register a weighted variant split for a feature
    ///
    /// Weights must be non-empty, unique by name and sum to exactly 100.
    /// Replaces any previous definition of the feature.
    ///
    /// # Examples
    ///
    /// ```
    /// # tokio_test::block_on(async {
    /// use flagpole_core::{Context, FeatureResolver};
    ///
    /// let mut resolver = FeatureResolver::builder().build().await.unwrap();
    /// resolver
    ///     .define_variant("checkout", [("control", 50), ("one-page", 50)])
    ///     .unwrap();
    ///
    /// let variant = resolver
    ///     .resolve_variant("checkout", &Context::entity("User", 7))
    ///     .await
    ///     .unwrap();
    /// assert!(variant == "control" || variant == "one-page");
    /// # });
    /// ```
    pub fn define_variant<I, K>(&mut self, feature: &str, weights: I) -> FeatureResult<()>
    where
        I: IntoIterator<Item = (K, u32)>,
        K: Into<String>,
    {
        let weights = VariantWeights::new(feature, weights)?;
        self.define(FeatureDefinition::variants(feature, weights))
    }

    /// Defined feature names, sorted
    pub fn defined(&self) -> Vec<String> {
        self.registry.defined()
    }

    /// Names of features with stored values
    ///
    /// Fails with an unsupported-operation error when the store cannot enumerate.
    pub async fn stored(&self) -> FeatureResult<Vec<String>> {
        Ok(self.store.list_stored().await?)
    }

    /// Definitions expiring within the next `days` days
    pub fn expiring_soon(&self, days: i64) -> Vec<Arc<FeatureDefinition>> {
        self.registry.expiring_within(days)
    }

    // ========== Resolution ==========

    /// Resolve a feature for a context
    pub async fn resolve(&mut self, feature: &str, context: &Context) -> FeatureResult<FeatureValue> {
        let mut guard = DependencyGuard::new();
        self.resolve_guarded(feature, context, &mut guard).await
    }

    /// Resolve a feature for the default context
    pub async fn resolve_default(&mut self, feature: &str) -> FeatureResult<FeatureValue> {
        let context = self.default_context()?;
        self.resolve(feature, &context).await
    }

    fn default_context(&self) -> FeatureResult<Context> {
        self.default_context
            .as_ref()
            .and_then(|provider| provider())
            .ok_or(FeatureError::MissingContext)
    }

    fn resolve_guarded<'a>(
        &'a mut self,
        feature: &'a str,
        context: &'a Context,
        guard: &'a mut DependencyGuard,
    ) -> BoxFuture<'a, FeatureResult<FeatureValue>> {
        Box::pin(async move {
            let key = self.context_key(context);
            let definition = self.registry.get(feature);

            if let Some(definition) = &definition {
                if definition.is_expired() {
                    trace!(feature = %feature, "Feature expired");
                    return Ok(FeatureValue::Inactive);
                }

                if !definition.required().is_empty() {
                    if !guard.enter(DependencyGuard::frame(feature, &key)) {
                        let path = guard.path().to_vec();
                        warn!(
                            feature = %feature,
                            key = %key,
                            path = ?path,
                            "Dependency cycle detected, resolving inactive"
                        );
                        self.emit(FeatureEvent::CycleDetected {
                            feature: feature.to_string(),
                            path,
                        })
                        .await;
                        return Ok(FeatureValue::Inactive);
                    }

                    let mut satisfied = Ok(true);
                    for required in definition.required() {
                        match self.resolve_guarded(required, context, guard).await {
                            Ok(value) if value.is_active() => {}
                            Ok(_) => {
                                trace!(feature = %feature, required = %required, "Required feature inactive");
                                satisfied = Ok(false);
                                break;
                            }
                            Err(e) => {
                                satisfied = Err(e);
                                break;
                            }
                        }
                    }
                    guard.leave();

                    if !satisfied? {
                        return Ok(FeatureValue::Inactive);
                    }
                }
            }

            if let Some(value) = self.cache.get(feature, &key) {
                trace!(feature = %feature, key = %key, "Resolution cache hit");
                return Ok(value.clone());
            }

            debug!(feature = %feature, key = %key, "Resolution cache miss");
            let mut value = self
                .read_or_initialize(feature, context, &key, definition.as_deref())
                .await?;

            if value.is_inactive()
                && let Some(group_value) = self.group_value(feature, &key).await?
            {
                value = group_value;
            }

            self.cache.put(feature, &key, value.clone());
            if definition.is_some() {
                self.emit(FeatureEvent::Resolved {
                    feature: feature.to_string(),
                    context_key: key,
                    value: value.clone(),
                })
                .await;
            }
            Ok(value)
        })
    }

    /// Read the stored value, or compute and persist the first one.
    ///
    /// A lost first-write race is retried exactly once; the retry reads the
    /// winner's value.
    async fn read_or_initialize(
        &self,
        feature: &str,
        context: &Context,
        key: &str,
        definition: Option<&FeatureDefinition>,
    ) -> FeatureResult<FeatureValue> {
        match self.try_initialize(feature, context, key, definition).await {
            Err(FeatureError::Store(e)) if e.is_conflict() => {
                warn!(feature = %feature, key = %key, "Concurrent first write, retrying read");
                self.emit(FeatureEvent::RaceRetried {
                    feature: feature.to_string(),
                    context_key: key.to_string(),
                })
                .await;
                self.try_initialize(feature, context, key, definition).await
            }
            other => other,
        }
    }

    async fn try_initialize(
        &self,
        feature: &str,
        context: &Context,
        key: &str,
        definition: Option<&FeatureDefinition>,
    ) -> FeatureResult<FeatureValue> {
        if let Some(payload) = self.store.get(feature, key).await? {
            return Ok(FeatureValue::from_payload(payload));
        }

        let Some(definition) = definition else {
            debug!(feature = %feature, key = %key, "Resolving unknown feature");
            self.emit(FeatureEvent::UnknownFeatureResolved {
                feature: feature.to_string(),
                context_key: key.to_string(),
            })
            .await;
            return Ok(FeatureValue::Undefined);
        };

        let payload = definition.resolve(context, key);
        self.store.insert(feature, key, &payload).await?;
        debug!(feature = %feature, key = %key, "Stored initial value");
        Ok(FeatureValue::from_payload(payload))
    }

    /// First active value among the groups the context belongs to
    async fn group_value(&self, feature: &str, key: &str) -> FeatureResult<Option<FeatureValue>> {
        let Some(groups) = &self.groups else {
            return Ok(None);
        };

        for group in groups.groups_for(key).await? {
            if !groups.features_in(&group).await?.iter().any(|f| f == feature) {
                continue;
            }

            let group_key = self.context_key(&Context::group(&group));
            if let Some(payload) = self.store.get(feature, &group_key).await? {
                let value = FeatureValue::from_payload(payload);
                if value.is_active() {
                    trace!(feature = %feature, group = %group, "Resolved through group");
                    return Ok(Some(value));
                }
            }
        }

        Ok(None)
    }

    /// Resolve the variant name of a variant feature
    ///
    /// A stored assignment always wins over the bucketed one.
    pub async fn resolve_variant(&mut self, feature: &str, context: &Context) -> FeatureResult<String> {
        let is_variant = self
            .registry
            .get(feature)
            .is_some_and(|d| d.variant_weights().is_some());
        if !is_variant {
            return Err(FeatureError::NotAVariant(feature.to_string()));
        }

        let value = self.resolve(feature, context).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| FeatureError::VariantUnavailable(feature.to_string()))
    }

    pub async fn is_active(&mut self, feature: &str, context: &Context) -> FeatureResult<bool> {
        Ok(self.resolve(feature, context).await?.is_active())
    }

    pub async fn is_inactive(&mut self, feature: &str, context: &Context) -> FeatureResult<bool> {
        Ok(self.resolve(feature, context).await?.is_inactive())
    }

    /// Whether every listed feature is active
    pub async fn all_are_active(&mut self, features: &[&str], context: &Context) -> FeatureResult<bool> {
        for feature in features {
            if !self.is_active(feature, context).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Whether at least one listed feature is active
    pub async fn some_are_active(&mut self, features: &[&str], context: &Context) -> FeatureResult<bool> {
        for feature in features {
            if self.is_active(feature, context).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Values of the listed features
    pub async fn values(
        &mut self,
        features: &[&str],
        context: &Context,
    ) -> FeatureResult<BTreeMap<String, FeatureValue>> {
        let mut values = BTreeMap::new();
        for feature in features {
            let value = self.resolve(feature, context).await?;
            values.insert(feature.to_string(), value);
        }
        Ok(values)
    }

    /// Values of every defined feature
    pub async fn all(&mut self, context: &Context) -> FeatureResult<BTreeMap<String, FeatureValue>> {
        let defined = self.defined();
        let names: Vec<&str> = defined.iter().map(String::as_str).collect();
        self.values(&names, context).await
    }

    // ========== Eager loading ==========

    /// Warm the cache for every (feature, context) pair with one batched read
    pub async fn load(&mut self, features: &[&str], contexts: &[Context]) -> FeatureResult<()> {
        self.load_pairs(features, contexts, false).await
    }

    /// Like [`load`](Self::load), skipping pairs that are already cached
    pub async fn load_missing(&mut self, features: &[&str], contexts: &[Context]) -> FeatureResult<()> {
        self.load_pairs(features, contexts, true).await
    }

    async fn load_pairs(
        &mut self,
        features: &[&str],
        contexts: &[Context],
        skip_cached: bool,
    ) -> FeatureResult<()> {
        let keys: Vec<String> = contexts.iter().map(|c| self.context_key(c)).collect();

        let mut pairs: Vec<(&str, usize)> = Vec::new();
        for feature in features {
            for (index, key) in keys.iter().enumerate() {
                if skip_cached && self.cache.contains(feature, key) {
                    continue;
                }
                pairs.push((*feature, index));
            }
        }

        if pairs.is_empty() {
            return Ok(());
        }

        let lookups: Vec<(&str, &str)> = pairs
            .iter()
            .map(|(feature, index)| (*feature, keys[*index].as_str()))
            .collect();
        let stored = self.store.get_many(&lookups).await?;
        debug!(pairs = pairs.len(), "Loaded stored feature values");

        for ((feature, index), payload) in pairs.into_iter().zip(stored) {
            let key = &keys[index];
            let value = payload.map(FeatureValue::from_payload);
            match value {
                // Inactive stored values may still be overridden by a group
                Some(value) if value.is_active() => self.cache.put(feature, key, value),
                _ => {
                    self.cache.forget(feature, key);
                    self.resolve(feature, &contexts[index]).await?;
                }
            }
        }

        Ok(())
    }

    // ========== Writes ==========

    /// Store a value for one context
    pub async fn set(
        &mut self,
        feature: &str,
        context: &Context,
        value: impl Into<Payload>,
    ) -> FeatureResult<()> {
        let key = self.context_key(context);
        let payload = value.into();

        self.store.set(feature, &key, &payload).await?;
        self.cache.forget_feature(feature);

        let resolved = FeatureValue::from_payload(payload.clone());
        if resolved.is_active() {
            self.cache.put(feature, &key, resolved);
        }

        debug!(feature = %feature, key = %key, "Updated feature value");
        self.emit(FeatureEvent::Updated {
            feature: feature.to_string(),
            context_key: key,
            value: payload,
        })
        .await;
        Ok(())
    }

    pub async fn activate(&mut self, feature: &str, context: &Context) -> FeatureResult<()> {
        self.set(feature, context, true).await
    }

    pub async fn deactivate(&mut self, feature: &str, context: &Context) -> FeatureResult<()> {
        self.set(feature, context, false).await
    }

    /// Overwrite the value of every context that already has one stored
    pub async fn set_for_all_contexts(&mut self, feature: &str, value: impl Into<Payload>) -> FeatureResult<()> {
        let payload = value.into();

        self.store.set_for_all(feature, &payload).await?;
        self.cache.forget_feature(feature);

        debug!(feature = %feature, "Updated feature value for all contexts");
        self.emit(FeatureEvent::UpdatedForAll {
            feature: feature.to_string(),
            value: payload,
        })
        .await;
        Ok(())
    }

    pub async fn activate_for_everyone(&mut self, feature: &str) -> FeatureResult<()> {
        self.set_for_all_contexts(feature, true).await
    }

    pub async fn deactivate_for_everyone(&mut self, feature: &str) -> FeatureResult<()> {
        self.set_for_all_contexts(feature, false).await
    }

    /// Activate a feature for a group; members inherit it through group fallback
    pub async fn activate_for_group(&mut self, feature: &str, group: &str) -> FeatureResult<()> {
        self.set(feature, &Context::group(group), true).await
    }

    /// Remove the stored value for one context
    pub async fn delete(&mut self, feature: &str, context: &Context) -> FeatureResult<()> {
        let key = self.context_key(context);

        self.store.delete(feature, &key).await?;
        self.cache.forget_feature(feature);

        debug!(feature = %feature, key = %key, "Deleted feature value");
        self.emit(FeatureEvent::Deleted {
            feature: feature.to_string(),
            context_key: key,
        })
        .await;
        Ok(())
    }

    /// Remove every stored value of the listed features, or of all features for `None`
    pub async fn purge(&mut self, features: Option<&[&str]>) -> FeatureResult<()> {
        let names: Option<Vec<String>> =
            features.map(|f| f.iter().map(|name| name.to_string()).collect());

        self.store.purge(names.as_deref()).await?;
        match &names {
            Some(names) => names.iter().for_each(|name| self.cache.forget_feature(name)),
            None => self.cache.flush(),
        }

        debug!(features = ?names, "Purged feature values");
        self.emit(FeatureEvent::Purged { features: names }).await;
        Ok(())
    }

    /// Purge the stored values of every expired definition. Returns the purged names.
    pub async fn purge_expired(&mut self) -> FeatureResult<Vec<String>> {
        let expired = self.registry.expired();
        if expired.is_empty() {
            return Ok(expired);
        }

        let names: Vec<&str> = expired.iter().map(String::as_str).collect();
        self.purge(Some(names.as_slice())).await?;
        Ok(expired)
    }

    // ========== Unit of work ==========

    /// Drop every cached resolution
    pub fn flush_cache(&mut self) {
        trace!(entries = self.cache.len(), "Flushing resolution cache");
        self.cache.flush();
    }

    /// Change the scope inherited by contexts without one
    ///
    /// Flushes the cache when the scope actually changes, since every key
    /// derived from the old scope is now stale.
    pub fn set_ambient_scope(&mut self, scope: Option<Scope>) {
        if self.ambient_scope != scope {
            debug!(scope = ?scope, "Ambient scope changed");
            self.ambient_scope = scope;
            self.cache.flush();
        }
    }

    pub fn ambient_scope(&self) -> Option<&Scope> {
        self.ambient_scope.as_ref()
    }

    async fn emit(&self, event: FeatureEvent) {
        if !self.config.emit_events {
            return;
        }
        if let Some(listener) = &self.listener {
            listener.handle(&event).await;
        }
    }
}

impl std::fmt::Debug for FeatureResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureResolver")
            .field("store", &self.store.store_type())
            .field("defined", &self.registry.len())
            .field("cached", &self.cache.len())
            .field("ambient_scope", &self.ambient_scope)
            .finish()
    }
}
