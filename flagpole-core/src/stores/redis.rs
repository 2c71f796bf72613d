//! Redis feature store
//!
//! Keeps one Redis hash per feature (`<prefix>:<feature>`) whose fields are
//! context keys. First writes use `HSETNX`, so two instances racing on the
//! same never-seen context cannot both persist a value.
//! Requires the `redis` feature to be enabled.

use crate::error::{StoreError, StoreResult};
use crate::stores::FeatureStore;
use crate::value::Payload;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::{debug, trace};

/// Overwrites every field of a feature hash in one atomic step.
const SET_FOR_ALL_SCRIPT: &str = r#"
local fields = redis.call('HKEYS', KEYS[1])
for _, field in ipairs(fields) do
    redis.call('HSET', KEYS[1], field, ARGV[1])
end
return #fields
"#;

/// Keys fetched per `SCAN` round trip
const SCAN_COUNT: usize = 100;

/// Redis-backed feature store
///
/// Enumerating stored features is not supported: answering it correctly
/// would need a keyspace scan across the whole deployment.
pub struct RedisStore {
    /// Redis connection manager
    conn: ConnectionManager,
    /// Key prefix
    prefix: String,
}

impl RedisStore {
    /// Create a new Redis store
    ///
    /// # Arguments
    ///
    /// * `url` - Redis connection URL (e.g., "redis://localhost:6379")
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn new(url: &str) -> StoreResult<Self> {
        debug!(url = %url, "Connecting to Redis for feature storage");

        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;

        Ok(Self {
            conn,
            prefix: "features".to_string(),
        })
    }

    /// Create a new Redis store with a custom prefix
    pub async fn with_prefix(url: &str, prefix: impl Into<String>) -> StoreResult<Self> {
        let mut store = Self::new(url).await?;
        store.prefix = prefix.into();
        Ok(store)
    }

    /// Hash key holding every value of a feature
    fn key(&self, feature: &str) -> String {
        format!("{}:{}", self.prefix, feature)
    }

    /// Every feature hash under the prefix, collected with `SCAN`
    async fn scan_prefix(&self, conn: &mut ConnectionManager) -> StoreResult<Vec<String>> {
        let pattern = format!("{}:*", self.prefix);
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(conn)
                .await?;
            keys.extend(batch);

            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    fn decode(raw: Option<String>) -> StoreResult<Option<Payload>> {
        raw.map(|json| serde_json::from_str(&json).map_err(StoreError::from))
            .transpose()
    }
}

#[async_trait]
impl FeatureStore for RedisStore {
    async fn get(&self, feature: &str, key: &str) -> StoreResult<Option<Payload>> {
        trace!(feature = %feature, key = %key, "Redis get");

        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("HGET")
            .arg(self.key(feature))
            .arg(key)
            .query_async(&mut conn)
            .await?;

        Self::decode(raw)
    }

    async fn insert(&self, feature: &str, key: &str, value: &Payload) -> StoreResult<()> {
        let json = serde_json::to_string(value)?;

        let mut conn = self.conn.clone();
        let created: i64 = redis::cmd("HSETNX")
            .arg(self.key(feature))
            .arg(key)
            .arg(json)
            .query_async(&mut conn)
            .await?;

        if created == 1 {
            trace!(feature = %feature, key = %key, "Redis insert: stored");
            Ok(())
        } else {
            trace!(feature = %feature, key = %key, "Redis insert: conflict");
            Err(StoreError::conflict(feature, key))
        }
    }

    async fn set(&self, feature: &str, key: &str, value: &Payload) -> StoreResult<()> {
        trace!(feature = %feature, key = %key, "Redis set");
        let json = serde_json::to_string(value)?;

        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("HSET")
            .arg(self.key(feature))
            .arg(key)
            .arg(json)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn set_for_all(&self, feature: &str, value: &Payload) -> StoreResult<()> {
        let json = serde_json::to_string(value)?;

        let mut conn = self.conn.clone();
        let updated: i64 = redis::Script::new(SET_FOR_ALL_SCRIPT)
            .key(self.key(feature))
            .arg(json)
            .invoke_async(&mut conn)
            .await?;

        debug!(feature = %feature, updated = updated, "Redis set for all");
        Ok(())
    }

    async fn delete(&self, feature: &str, key: &str) -> StoreResult<()> {
        trace!(feature = %feature, key = %key, "Redis delete");

        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("HDEL")
            .arg(self.key(feature))
            .arg(key)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn purge(&self, features: Option<&[String]>) -> StoreResult<()> {
        let mut conn = self.conn.clone();

        let keys: Vec<String> = match features {
            Some(features) => features.iter().map(|f| self.key(f)).collect(),
            None => self.scan_prefix(&mut conn).await?,
        };

        if keys.is_empty() {
            return Ok(());
        }

        debug!(count = keys.len(), "Purging Redis feature hashes");
        let _: i64 = redis::cmd("DEL").arg(&keys).query_async(&mut conn).await?;
        Ok(())
    }

    fn store_type(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // These tests need a running Redis:
    // cargo test -p flagpole-core --features redis -- --ignored

    #[tokio::test]
    #[ignore]
    async fn test_redis_insert_conflict() {
        let store = RedisStore::with_prefix("redis://localhost:6379", "flagpole-test")
            .await
            .unwrap();
        store.purge(None).await.unwrap();

        store.insert("f", "User|1", &json!("a")).await.unwrap();
        let err = store.insert("f", "User|1", &json!("b")).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.get("f", "User|1").await.unwrap(), Some(json!("a")));

        store.purge(None).await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_set_for_all_and_list() {
        let store = RedisStore::with_prefix("redis://localhost:6379", "flagpole-test")
            .await
            .unwrap();
        store.purge(None).await.unwrap();

        store.set("f", "1", &json!(false)).await.unwrap();
        store.set("f", "2", &json!(false)).await.unwrap();
        store.set_for_all("f", &json!(true)).await.unwrap();
        assert_eq!(store.get("f", "2").await.unwrap(), Some(json!(true)));

        assert!(store.list_stored().await.unwrap_err().is_unsupported());
        store.purge(None).await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_set_for_all_keeps_deleted_rows_deleted() {
        let store = RedisStore::with_prefix("redis://localhost:6379", "flagpole-test")
            .await
            .unwrap();
        store.purge(None).await.unwrap();

        store.set("f", "1", &json!(false)).await.unwrap();
        store.set("f", "2", &json!(false)).await.unwrap();
        store.delete("f", "1").await.unwrap();
        store.set_for_all("f", &json!(true)).await.unwrap();

        assert_eq!(store.get("f", "1").await.unwrap(), None);
        assert_eq!(store.get("f", "2").await.unwrap(), Some(json!(true)));

        // Nothing stored: no hash is created
        store.set_for_all("empty", &json!(true)).await.unwrap();
        assert_eq!(store.get("empty", "1").await.unwrap(), None);

        store.purge(None).await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_purge_all_scans_every_hash() {
        let store = RedisStore::with_prefix("redis://localhost:6379", "flagpole-purge")
            .await
            .unwrap();
        store.purge(None).await.unwrap();

        for n in 0..(SCAN_COUNT * 3) {
            store.set(&format!("f{}", n), "1", &json!(true)).await.unwrap();
        }
        store.purge(None).await.unwrap();

        let mut conn = store.conn.clone();
        assert!(store.scan_prefix(&mut conn).await.unwrap().is_empty());
    }
}
