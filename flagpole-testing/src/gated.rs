// Gated store for first-write race tests

use async_trait::async_trait;
use flagpole_core::{FeatureStore, Payload, StoreResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Barrier;

/// Store wrapper that holds the first `n` reads at a barrier.
///
/// Each gated read completes against the inner store and then waits until
/// all `n` gated readers have read. With `n = 2` and two concurrent
/// resolvers, both are guaranteed to see "nothing stored" before either
/// one writes, which reproduces the first-write race deterministically.
pub struct GatedStore {
    inner: Arc<dyn FeatureStore>,
    gate: Barrier,
    remaining: AtomicUsize,
}

impl GatedStore {
    /// Gate the first `readers` reads of `inner`
    pub fn new(inner: Arc<dyn FeatureStore>, readers: usize) -> Self {
        Self {
            inner,
            gate: Barrier::new(readers),
            remaining: AtomicUsize::new(readers),
        }
    }

    /// Number of reads still to be gated
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::SeqCst)
    }

    fn take_slot(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl FeatureStore for GatedStore {
    async fn get(&self, feature: &str, key: &str) -> StoreResult<Option<Payload>> {
        let gated = self.take_slot();
        let value = self.inner.get(feature, key).await?;
        if gated {
            self.gate.wait().await;
        }
        Ok(value)
    }

    async fn insert(&self, feature: &str, key: &str, value: &Payload) -> StoreResult<()> {
        self.inner.insert(feature, key, value).await
    }

    async fn set(&self, feature: &str, key: &str, value: &Payload) -> StoreResult<()> {
        self.inner.set(feature, key, value).await
    }

    async fn set_for_all(&self, feature: &str, value: &Payload) -> StoreResult<()> {
        self.inner.set_for_all(feature, value).await
    }

    async fn delete(&self, feature: &str, key: &str) -> StoreResult<()> {
        self.inner.delete(feature, key).await
    }

    async fn purge(&self, features: Option<&[String]>) -> StoreResult<()> {
        self.inner.purge(features).await
    }

    async fn list_stored(&self) -> StoreResult<Vec<String>> {
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
    async fn test_gate_holds_until_all_readers_arrive() {
        let inner = Arc::new(MemoryStore::new());
        let store = Arc::new(GatedStore::new(inner.clone(), 2));

        let (a, b) = tokio::join!(store.get("f", "k"), store.get("f", "k"));
        assert_eq!(a.unwrap(), None);
        assert_eq!(b.unwrap(), None);
        assert_eq!(store.remaining(), 0);

        // Later reads pass straight through
        inner.set("f", "k", &json!(1)).await.unwrap();
        assert_eq!(store.get("f", "k").await.unwrap(), Some(json!(1)));
    }
}
