// Call-recording store wrapper

use async_trait::async_trait;
use flagpole_core::{FeatureStore, Payload, StoreResult};
use parking_lot::Mutex;
use std::sync::Arc;

/// Store wrapper that records every call before delegating.
///
/// Calls are recorded as `"<operation> <feature> <key>"`, e.g.
/// `"get new-ui User|1"`, so tests can count round-trips per operation or
/// per (feature, key).
#[derive(Clone)]
pub struct RecordingStore {
    inner: Arc<dyn FeatureStore>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl RecordingStore {
    /// Wrap a store
    pub fn new(inner: Arc<dyn FeatureStore>) -> Self {
        Self {
            inner,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn record(&self, operation: &str, feature: &str, key: &str) {
        self.calls
            .lock()
            .push(format!("{} {} {}", operation, feature, key).trim_end().to_string());
    }

    /// Number of calls to an operation (`get`, `insert`, `set`, ...)
    pub fn call_count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.split(' ').next() == Some(operation))
            .count()
    }

    /// Number of calls to an operation for one (feature, key)
    pub fn calls_for(&self, operation: &str, feature: &str, key: &str) -> usize {
        let call = format!("{} {} {}", operation, feature, key);
        self.calls.lock().iter().filter(|c| **c == call).count()
    }

    /// Total number of recorded calls
    pub fn total_calls(&self) -> usize {
        self.calls.lock().len()
    }

    /// Get all recorded calls
    pub fn get_calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Check if an operation was called
    pub fn was_called(&self, operation: &str) -> bool {
        self.call_count(operation) > 0
    }

    /// Clear all recorded calls
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }
}

#[async_trait]
impl FeatureStore for RecordingStore {
    async fn get(&self, feature: &str, key: &str) -> StoreResult<Option<Payload>> {
        self.record("get", feature, key);
        self.inner.get(feature, key).await
    }

    async fn get_many(&self, pairs: &[(&str, &str)]) -> StoreResult<Vec<Option<Payload>>> {
        self.record("get_many", &pairs.len().to_string(), "");
        self.inner.get_many(pairs).await
    }

    async fn insert(&self, feature: &str, key: &str, value: &Payload) -> StoreResult<()> {
        self.record("insert", feature, key);
        self.inner.insert(feature, key, value).await
    }

    async fn set(&self, feature: &str, key: &str, value: &Payload) -> StoreResult<()> {
        self.record("set", feature, key);
        self.inner.set(feature, key, value).await
    }

    async fn set_for_all(&self, feature: &str, value: &Payload) -> StoreResult<()> {
        self.record("set_for_all", feature, "");
        self.inner.set_for_all(feature, value).await
    }

    async fn delete(&self, feature: &str, key: &str) -> StoreResult<()> {
        self.record("delete", feature, key);
        self.inner.delete(feature, key).await
    }

    async fn purge(&self, features: Option<&[String]>) -> StoreResult<()> {
        let scope = features.map(|f| f.join(",")).unwrap_or_else(|| "*".to_string());
        self.record("purge", &scope, "");
        self.inner.purge(features).await
    }

    async fn list_stored(&self) -> StoreResult<Vec<String>> {
        self.record("list_stored", "", "");
        self.inner.list_stored().await
    }

    fn store_type(&self) -> &'static str {
        self.inner.store_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flagpole_core::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_records_and_delegates() {
        let store = RecordingStore::new(Arc::new(MemoryStore::new()));

        store.set("f", "User|1", &json!(true)).await.unwrap();
        assert_eq!(store.get("f", "User|1").await.unwrap(), Some(json!(true)));
        store.get("f", "User|2").await.unwrap();

        assert_eq!(store.call_count("get"), 2);
        assert_eq!(store.call_count("set"), 1);
        assert_eq!(store.calls_for("get", "f", "User|1"), 1);
        assert!(!store.was_called("delete"));
        assert_eq!(store.get_calls()[0], "set f User|1");

        store.clear_calls();
        assert_eq!(store.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_store_type_passthrough() {
        let store = RecordingStore::new(Arc::new(MemoryStore::new()));
        assert_eq!(store.store_type(), "memory");
        store.list_stored().await.unwrap();
        assert_eq!(store.get_calls(), vec!["list_stored".to_string()]);
    }
}
