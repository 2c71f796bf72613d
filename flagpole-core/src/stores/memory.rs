//! In-memory feature store
//!
//! Uses DashMap for thread-safe concurrent access. Suitable for single-instance
//! deployments or testing. For distributed deployments, use the Redis or
//! Postgres store.

use crate::error::{StoreError, StoreResult};
use crate::stores::FeatureStore;
use crate::value::Payload;
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::BTreeSet;
use tracing::{debug, trace};

/// In-memory feature store
pub struct MemoryStore {
    /// Stored payloads keyed by (feature, context key)
    values: DashMap<(String, String), Payload>,
}

impl MemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        debug!("Creating new in-memory feature store");
        Self {
            values: DashMap::new(),
        }
    }

    /// Number of stored rows (for monitoring and tests)
    pub fn row_count(&self) -> usize {
        self.values.len()
    }

    /// Number of stored rows for one feature
    pub fn rows_for(&self, feature: &str) -> usize {
        self.values.iter().filter(|e| e.key().0 == feature).count()
    }

    fn row(feature: &str, key: &str) -> (String, String) {
        (feature.to_string(), key.to_string())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeatureStore for MemoryStore {
    async fn get(&self, feature: &str, key: &str) -> StoreResult<Option<Payload>> {
        trace!(feature = %feature, key = %key, "Memory store get");
        Ok(self
            .values
            .get(&Self::row(feature, key))
            .map(|v| v.value().clone()))
    }

    async fn insert(&self, feature: &str, key: &str, value: &Payload) -> StoreResult<()> {
        match self.values.entry(Self::row(feature, key)) {
            Entry::Occupied(_) => {
                trace!(feature = %feature, key = %key, "Memory store insert: conflict");
                Err(StoreError::conflict(feature, key))
            }
            Entry::Vacant(slot) => {
                slot.insert(value.clone());
                trace!(feature = %feature, key = %key, "Memory store insert: stored");
                Ok(())
            }
        }
    }

    async fn set(&self, feature: &str, key: &str, value: &Payload) -> StoreResult<()> {
        trace!(feature = %feature, key = %key, "Memory store set");
        self.values.insert(Self::row(feature, key), value.clone());
        Ok(())
    }

    async fn set_for_all(&self, feature: &str, value: &Payload) -> StoreResult<()> {
        let mut updated = 0usize;
        for mut entry in self.values.iter_mut() {
            if entry.key().0 == feature {
                *entry.value_mut() = value.clone();
                updated += 1;
            }
        }
        debug!(feature = %feature, updated = updated, "Memory store set for all");
        Ok(())
    }

    async fn delete(&self, feature: &str, key: &str) -> StoreResult<()> {
        trace!(feature = %feature, key = %key, "Memory store delete");
        self.values.remove(&Self::row(feature, key));
        Ok(())
    }

    async fn purge(&self, features: Option<&[String]>) -> StoreResult<()> {
        match features {
            None => {
                debug!("Purging all stored features");
                self.values.clear();
            }
            Some(features) => {
                debug!(features = ?features, "Purging stored features");
                self.values
                    .retain(|(feature, _), _| !features.iter().any(|f| f == feature));
            }
        }
        Ok(())
    }

    async fn list_stored(&self) -> StoreResult<Vec<String>> {
        let names: BTreeSet<String> = self.values.iter().map(|e| e.key().0.clone()).collect();
        Ok(names.into_iter().collect())
    }

    fn store_type(&self) -> &'static str {
        "memory"
    }
}
