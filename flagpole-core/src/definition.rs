//! Feature definitions and registry
//!
//! Defines how a feature computes its initial value, when it expires and
//! which features it requires.

use crate::bucket::{Bucketer, VariantWeights};
use crate::context::Context;
use crate::error::{FeatureError, FeatureResult};
use crate::expiration::ExpirationPolicy;
use crate::value::Payload;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Closure computing a feature's initial payload for a context.
pub type ResolverFn = Arc<dyn Fn(&Context) -> Payload + Send + Sync>;

/// How a feature computes its value the first time a context asks for it.
#[derive(Clone)]
pub enum ResolverKind {
    /// Same payload for every context
    Static(Payload),
    /// Arbitrary closure
    Closure(ResolverFn),
    /// Lottery: `true` for the given percentage of contexts
    Percentage(u8),
    /// Weighted N-way split; the payload is the variant name
    Variants(VariantWeights),
}

impl ResolverKind {
    /// Compute the payload for a context
    pub fn evaluate(&self, feature: &str, context: &Context, context_key: &str) -> Payload {
        match self {
            Self::Static(payload) => payload.clone(),
            Self::Closure(resolver) => resolver(context),
            Self::Percentage(percentage) => {
                Payload::Bool(Bucketer::in_rollout(feature, context_key, *percentage))
            }
            Self::Variants(weights) => {
                Payload::String(Bucketer::variant(feature, context_key, weights).to_string())
            }
        }
    }
}

impl fmt::Debug for ResolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(payload) => f.debug_tuple("Static").field(payload).finish(),
            Self::Closure(_) => f.write_str("Closure(..)"),
            Self::Percentage(p) => f.debug_tuple("Percentage").field(p).finish(),
            Self::Variants(w) => f.debug_tuple("Variants").field(w).finish(),
        }
    }
}

/// Feature definition
#[derive(Debug, Clone)]
pub struct FeatureDefinition {
    name: String,
    description: Option<String>,
    resolver: ResolverKind,
    expiration: Option<ExpirationPolicy>,
    requires: Vec<String>,
}

impl FeatureDefinition {
    /// Feature resolved by a closure
    ///
    /// # Examples
    ///
    /// ```
    /// use flagpole_core::{Context, FeatureDefinition, Identity};
    /// use serde_json::json;
    ///
    /// let definition = FeatureDefinition::new("staff-tools", |context: &Context| {
    ///     json!(matches!(context.identity(), Identity::Entity { kind, .. } if kind == "Staff"))
    /// });
    /// ```
    pub fn new<F>(name: impl Into<String>, resolver: F) -> Self
    where
        F: Fn(&Context) -> Payload + Send + Sync + 'static,
    {
        Self::with_resolver(name, ResolverKind::Closure(Arc::new(resolver)))
    }

    /// Feature with the same payload for everyone
    pub fn constant(name: impl Into<String>, payload: impl Into<Payload>) -> Self {
        Self::with_resolver(name, ResolverKind::Static(payload.into()))
    }

    /// Boolean feature
    pub fn boolean(name: impl Into<String>, enabled: bool) -> Self {
        Self::constant(name, enabled)
    }

    /// Percentage rollout (0-100)
    pub fn percentage(name: impl Into<String>, percentage: u8) -> Self {
        Self::with_resolver(name, ResolverKind::Percentage(percentage))
    }

    /// Weighted variant split
    pub fn variants(name: impl Into<String>, weights: VariantWeights) -> Self {
        Self::with_resolver(name, ResolverKind::Variants(weights))
    }

    pub fn with_resolver(name: impl Into<String>, resolver: ResolverKind) -> Self {
        Self {
            name: name.into(),
            description: None,
            resolver,
            expiration: None,
            requires: Vec::new(),
        }
    }

    /// Set description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Expire at a fixed time
    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expiration = Some(ExpirationPolicy::new(at));
        self
    }

    /// Expire after a duration from now
    pub fn expires_after(mut self, duration: Duration) -> Self {
        self.expiration = Some(ExpirationPolicy::after(duration));
        self
    }

    /// Add required features, checked in order
    pub fn requires<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires.extend(features.into_iter().map(Into::into));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn resolver(&self) -> &ResolverKind {
        &self.resolver
    }

    pub fn expiration(&self) -> Option<&ExpirationPolicy> {
        self.expiration.as_ref()
    }

    pub fn required(&self) -> &[String] {
        &self.requires
    }

    /// Variant table, if this is a variant feature
    pub fn variant_weights(&self) -> Option<&VariantWeights> {
        match &self.resolver {
            ResolverKind::Variants(weights) => Some(weights),
            _ => None,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration.is_some_and(|e| e.is_expired_at(now))
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Compute the initial payload for a context
    pub fn resolve(&self, context: &Context, context_key: &str) -> Payload {
        self.resolver.evaluate(&self.name, context, context_key)
    }

    /// Registration-time checks
    pub fn validate(&self) -> FeatureResult<()> {
        if self.name.trim().is_empty() {
            return Err(FeatureError::config("feature name cannot be empty"));
        }
        if let ResolverKind::Percentage(percentage) = self.resolver
            && percentage > 100
        {
            return Err(FeatureError::InvalidPercentage {
                feature: self.name.clone(),
                percentage,
            });
        }
        if self.requires.iter().any(|r| r.trim().is_empty()) {
            return Err(FeatureError::config(format!(
                "feature '{}' requires an unnamed feature",
                self.name
            )));
        }
        Ok(())
    }
}

/// Registry of feature definitions, shared between resolvers.
#[derive(Debug, Default)]
pub struct FeatureRegistry {
    definitions: RwLock<HashMap<String, Arc<FeatureDefinition>>>,
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a definition. Returns the replaced definition.
    pub fn define(&self, definition: FeatureDefinition) -> FeatureResult<Option<Arc<FeatureDefinition>>> {
        definition.validate()?;
        let name = definition.name.clone();
        Ok(self.definitions.write().insert(name, Arc::new(definition)))
    }

    pub fn get(&self, name: &str) -> Option<Arc<FeatureDefinition>> {
        self.definitions.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.read().contains_key(name)
    }

    pub fn remove(&self, name: &str) -> Option<Arc<FeatureDefinition>> {
        self.definitions.write().remove(name)
    }

    /// Defined feature names, sorted
    pub fn defined(&self) -> Vec<String> {
        let mut names: Vec<String> = self.definitions.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Definitions whose expiry falls within the next `days` days
    pub fn expiring_within(&self, days: i64) -> Vec<Arc<FeatureDefinition>> {
        let now = Utc::now();
        let mut expiring: Vec<Arc<FeatureDefinition>> = self
            .definitions
            .read()
            .values()
            .filter(|d| d.expiration.is_some_and(|e| e.is_expiring_soon_at(now, days)))
            .cloned()
            .collect();
        expiring.sort_by(|a, b| a.name.cmp(&b.name));
        expiring
    }

    /// Names of definitions already past their expiry, sorted
    pub fn expired(&self) -> Vec<String> {
        let now = Utc::now();
        let mut names: Vec<String> = self
            .definitions
            .read()
            .values()
            .filter(|d| d.is_expired_at(now))
            .map(|d| d.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.definitions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.read().is_empty()
    }
}
