// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed context database.

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use super::ContextDb;
use crate::error::CoreError;

/// SQLite-backed context database.
#[derive(Clone)]
pub struct SqliteContextDb {
    pool: SqlitePool,
}

impl std::fmt::Debug for SqliteContextDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteContextDb").finish_non_exhaustive()
    }
}

impl SqliteContextDb {
    /// Create a context database from an existing, already migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to `url` (e.g. `sqlite::memory:` or `sqlite:ncm.db?mode=rwc`) and run migrations.
    pub async fn from_url(url: &str) -> Result<Self, CoreError> {
        Ok(Self {
            pool: open_pool(url).await?,
        })
    }

    /// Create and initialize a context database from a file path.
    ///
    /// Creates parent directories and the database file if needed, then runs migrations.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::StoreError {
                operation: "create_dir".to_string(),
                details: format!("Failed to create directory {:?}: {}", parent, e),
            })?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.to_string_lossy());
        Self::from_url(&url).await
    }

    /// The underlying pool, for sharing with [`SqliteDocumentStore`](crate::db::SqliteDocumentStore).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Open a SQLite pool and apply the embedded migrations.
///
/// In-memory databases are private to a connection, so they get a single-connection pool.
pub(crate) async fn open_pool(url: &str) -> Result<SqlitePool, CoreError> {
    let max_connections = if url.contains(":memory:") { 1 } else { 5 };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .map_err(|e| CoreError::StoreError {
            operation: "connect".to_string(),
            details: format!("Failed to connect to SQLite at {}: {}", url, e),
        })?;

    crate::migrations::run_sqlite(&pool)
        .await
        .map_err(|e| CoreError::StoreError {
            operation: "migrate".to_string(),
            details: format!("Failed to run migrations: {}", e),
        })?;

    Ok(pool)
}

#[async_trait]
impl ContextDb for SqliteContextDb {
    async fn put(&self, key: &str, value: &Value) -> Result<(), CoreError> {
        let encoded = serde_json::to_string(value)?;
        sqlx::query(
            r#"
            INSERT INTO context_kv (key, value, updated_at)
            VALUES (?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(key)
        .bind(encoded)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, CoreError> {
        let raw: Option<String> = sqlx::query_scalar("SELECT value FROM context_kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match raw {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| CoreError::serialization(key, e)),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), CoreError> {
        sqlx::query("DELETE FROM context_kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_all(&self, prefix: &str) -> Result<u64, CoreError> {
        let result = sqlx::query("DELETE FROM context_kv WHERE substr(key, 1, length(?1)) = ?1")
            .bind(prefix)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn get_all_keys(&self, prefix: &str) -> Result<Vec<String>, CoreError> {
        let keys: Vec<String> = sqlx::query_scalar(
            "SELECT key FROM context_kv WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;
        Ok(keys)
    }

    async fn health_check(&self) -> Result<bool, CoreError> {
        let one: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&self.pool).await?;
        Ok(one == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_sqlite_put_get_overwrite() {
        let db = SqliteContextDb::from_url("sqlite::memory:").await.unwrap();

        db.put("/context/7/", &json!("7")).await.unwrap();
        db.put("/context/7/meta/", &json!({"project": "p"}))
            .await
            .unwrap();
        db.put("/context/7/meta/", &json!({"project": "q"}))
            .await
            .unwrap();

        assert_eq!(db.get("/context/7/").await.unwrap(), Some(json!("7")));
        assert_eq!(
            db.get("/context/7/meta/").await.unwrap(),
            Some(json!({"project": "q"}))
        );
        assert!(db.get("/context/8/").await.unwrap().is_none());
        assert!(db.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_sqlite_prefix_operations() {
        let db = SqliteContextDb::from_url("sqlite::memory:").await.unwrap();
        for key in [
            "/context/1/",
            "/context/1/app/a/",
            "/context/1/app/a/cluster/p+c/",
            "/context/10/",
        ] {
            db.put(key, &json!("x")).await.unwrap();
        }

        let keys = db.get_all_keys("/context/1/app/").await.unwrap();
        assert_eq!(
            keys,
            vec!["/context/1/app/a/", "/context/1/app/a/cluster/p+c/"]
        );

        assert_eq!(db.delete_all("/context/1/").await.unwrap(), 3);
        assert_eq!(db.get_all_keys("/context/").await.unwrap(), vec!["/context/10/"]);
    }

    #[tokio::test]
    async fn test_sqlite_from_path_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ctx.db");

        {
            let db = SqliteContextDb::from_path(&path).await.unwrap();
            db.put("/context/3/", &json!("3")).await.unwrap();
        }

        let reopened = SqliteContextDb::from_path(&path).await.unwrap();
        assert_eq!(reopened.get("/context/3/").await.unwrap(), Some(json!("3")));
    }
}
