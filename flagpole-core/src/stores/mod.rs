//! Feature storage backends
//!
//! This module provides the storage contract every backend satisfies plus
//! the bundled backends:
//!
//! - **Memory**: In-memory storage using DashMap (default, single-instance)
//! - **Redis**: Distributed storage, one hash per feature (`redis` feature)
//! - **Postgres**: Persistent table with a `(name, scope)` unique constraint (`postgres` feature)

mod memory;
#[cfg(feature = "postgres")]
mod postgres;
#[cfg(feature = "redis")]
mod redis;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;

use crate::error::{StoreError, StoreResult};
use crate::value::Payload;
use async_trait::async_trait;

/// Trait for feature storage backends
///
/// Keys are a feature name plus a serialized context key. Backends store
/// payloads only; "undefined" is represented by the absence of a row.
#[async_trait]
pub trait FeatureStore: Send + Sync {
    /// Read the stored payload for (feature, key)
    async fn get(&self, feature: &str, key: &str) -> StoreResult<Option<Payload>>;

    /// Read many (feature, key) pairs in parallel.
    ///
    /// Returns payloads in the same order as the input.
    async fn get_many(&self, pairs: &[(&str, &str)]) -> StoreResult<Vec<Option<Payload>>> {
        use futures::future::try_join_all;

        let futures = pairs.iter().map(|(feature, key)| self.get(feature, key));
        try_join_all(futures).await
    }

    /// Store the first value for (feature, key).
    ///
    /// Fails with [`StoreError::Conflict`] when a row already exists, which is
    /// how concurrent first writes are detected.
    async fn insert(&self, feature: &str, key: &str, value: &Payload) -> StoreResult<()>;

    /// Create or overwrite the value for (feature, key)
    async fn set(&self, feature: &str, key: &str, value: &Payload) -> StoreResult<()>;

    /// Overwrite every stored value of a feature
    async fn set_for_all(&self, feature: &str, value: &Payload) -> StoreResult<()>;

    /// Delete the value for (feature, key)
    async fn delete(&self, feature: &str, key: &str) -> StoreResult<()>;

    /// Delete every value of the given features, or of all features for `None`
    async fn purge(&self, features: Option<&[String]>) -> StoreResult<()>;

    /// Names of features with at least one stored value.
    ///
    /// Backends that cannot enumerate fail with [`StoreError::Unsupported`]
    /// rather than returning an empty list.
    async fn list_stored(&self) -> StoreResult<Vec<String>> {
        Err(StoreError::unsupported("list_stored", self.store_type()))
    }

    /// Get store type name for debugging
    fn store_type(&self) -> &'static str;
}
