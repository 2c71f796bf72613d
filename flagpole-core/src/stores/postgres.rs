//! Postgres feature store
//!
//! Persists values in a table with a unique `(name, scope)` constraint. The
//! constraint is what makes concurrent first writes safe: the losing insert
//! fails with a unique violation, reported as [`StoreError::Conflict`].
//! Requires the `postgres` feature to be enabled.
//!
//! The table is owned by the application's migrations:
//!
//! ```sql
//! CREATE TABLE features (
//!     id BIGSERIAL PRIMARY KEY,
//!     name TEXT NOT NULL,
//!     scope TEXT NOT NULL,
//!     value JSONB NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
//!     UNIQUE (name, scope)
//! );
//! ```

use crate::error::{StoreError, StoreResult};
use crate::stores::FeatureStore;
use crate::value::Payload;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use tracing::{debug, trace};

/// Postgres-backed feature store
pub struct PostgresStore {
    pool: PgPool,
    table: String,
}

impl PostgresStore {
    /// Connect with a new pool
    ///
    /// # Arguments
    ///
    /// * `url` - Postgres connection URL (e.g., "postgres://localhost/app")
    pub async fn connect(url: &str) -> StoreResult<Self> {
        debug!("Connecting to Postgres for feature storage");

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .map_err(database_error)?;

        Ok(Self::from_pool(pool))
    }

    /// Use an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            table: "features".to_string(),
        }
    }

    /// Use a different table name (letters, digits, `_` and `.` only)
    pub fn with_table(mut self, table: impl Into<String>) -> StoreResult<Self> {
        let table = table.into();
        let valid = !table.is_empty()
            && table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
        if !valid {
            return Err(StoreError::backend(format!("invalid table name '{}'", table)));
        }
        self.table = table;
        Ok(self)
    }
}

fn database_error(err: sqlx::Error) -> StoreError {
    StoreError::Database(err.to_string())
}

#[async_trait]
impl FeatureStore for PostgresStore {
    async fn get(&self, feature: &str, key: &str) -> StoreResult<Option<Payload>> {
        trace!(feature = %feature, key = %key, "Postgres get");

        let sql = format!(
            "SELECT value FROM {} WHERE name = $1 AND scope = $2",
            self.table
        );
        let row: Option<Json<Payload>> = sqlx::query_scalar(&sql)
            .bind(feature)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(database_error)?;

        Ok(row.map(|Json(value)| value))
    }

    async fn insert(&self, feature: &str, key: &str, value: &Payload) -> StoreResult<()> {
        let sql = format!(
            "INSERT INTO {} (name, scope, value, created_at, updated_at) \
             VALUES ($1, $2, $3, now(), now())",
            self.table
        );
        let result = sqlx::query(&sql)
            .bind(feature)
            .bind(key)
            .bind(Json(value))
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => {
                trace!(feature = %feature, key = %key, "Postgres insert: stored");
                Ok(())
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                trace!(feature = %feature, key = %key, "Postgres insert: conflict");
                Err(StoreError::conflict(feature, key))
            }
            Err(e) => Err(database_error(e)),
        }
    }

    async fn set(&self, feature: &str, key: &str, value: &Payload) -> StoreResult<()> {
        trace!(feature = %feature, key = %key, "Postgres set");

        let sql = format!(
            "INSERT INTO {} (name, scope, value, created_at, updated_at) \
             VALUES ($1, $2, $3, now(), now()) \
             ON CONFLICT (name, scope) DO UPDATE SET value = EXCLUDED.value, updated_at = now()",
            self.table
        );
        sqlx::query(&sql)
            .bind(feature)
            .bind(key)
            .bind(Json(value))
            .execute(&self.pool)
            .await
            .map_err(database_error)?;
        Ok(())
    }

    async fn set_for_all(&self, feature: &str, value: &Payload) -> StoreResult<()> {
        let sql = format!(
            "UPDATE {} SET value = $2, updated_at = now() WHERE name = $1",
            self.table
        );
        let result = sqlx::query(&sql)
            .bind(feature)
            .bind(Json(value))
            .execute(&self.pool)
            .await
            .map_err(database_error)?;

        debug!(feature = %feature, updated = result.rows_affected(), "Postgres set for all");
        Ok(())
    }

    async fn delete(&self, feature: &str, key: &str) -> StoreResult<()> {
        trace!(feature = %feature, key = %key, "Postgres delete");

        let sql = format!("DELETE FROM {} WHERE name = $1 AND scope = $2", self.table);
        sqlx::query(&sql)
            .bind(feature)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(database_error)?;
        Ok(())
    }

    async fn purge(&self, features: Option<&[String]>) -> StoreResult<()> {
        let result = match features {
            None => {
                let sql = format!("DELETE FROM {}", self.table);
                sqlx::query(&sql).execute(&self.pool).await
            }
            Some(features) => {
                let sql = format!("DELETE FROM {} WHERE name = ANY($1)", self.table);
                sqlx::query(&sql)
                    .bind(features.to_vec())
                    .execute(&self.pool)
                    .await
            }
        }
        .map_err(database_error)?;

        debug!(deleted = result.rows_affected(), "Purged Postgres feature rows");
        Ok(())
    }

    async fn list_stored(&self) -> StoreResult<Vec<String>> {
        let sql = format!("SELECT DISTINCT name FROM {} ORDER BY name", self.table);
        sqlx::query_scalar(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(database_error)
    }

    fn store_type(&self) -> &'static str {
        "postgres"
    }
}
