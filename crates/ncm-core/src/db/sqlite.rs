// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed document store.

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::SqlitePool;

use super::{DocumentStore, canonical_key, is_exact, key_matches};
use crate::contextdb::sqlite::open_pool;
use crate::error::{CoreError, Result};

/// SQLite-backed document store.
#[derive(Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl std::fmt::Debug for SqliteDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDocumentStore").finish_non_exhaustive()
    }
}

impl SqliteDocumentStore {
    /// Create a document store from an existing, already migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to `url` and run migrations.
    pub async fn from_url(url: &str) -> Result<Self> {
        Ok(Self {
            pool: open_pool(url).await?,
        })
    }

    /// Open or create the database file at `path`.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                CoreError::store(
                    "create_dir",
                    format!("Failed to create directory {:?}: {}", parent, e),
                )
            })?;
        }
        Self::from_url(&format!("sqlite:{}?mode=rwc", path.to_string_lossy())).await
    }
}

fn decode(raw: &str, context: &str) -> Result<Value> {
    serde_json::from_str(raw).map_err(|e| CoreError::serialization(context, e))
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn insert(&self, store: &str, key: &Value, tag: &str, value: &Value) -> Result<()> {
        let doc_key = canonical_key(key)?;
        let encoded = serde_json::to_string(value)?;
        sqlx::query(
            r#"
            INSERT INTO documents (store, doc_key, tag, value)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(store, doc_key, tag) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(store)
        .bind(&doc_key)
        .bind(tag)
        .bind(encoded)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(&self, store: &str, key: &Value, tag: &str) -> Result<Vec<Value>> {
        let doc_key = canonical_key(key)?;

        if is_exact(key) {
            let raw: Option<String> = sqlx::query_scalar(
                "SELECT value FROM documents WHERE store = ? AND doc_key = ? AND tag = ?",
            )
            .bind(store)
            .bind(&doc_key)
            .bind(tag)
            .fetch_optional(&self.pool)
            .await?;
            return raw.map(|r| decode(&r, &doc_key)).into_iter().collect();
        }

        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT doc_key, value FROM documents WHERE store = ? AND tag = ? ORDER BY doc_key",
        )
        .bind(store)
        .bind(tag)
        .fetch_all(&self.pool)
        .await?;

        let mut found = Vec::new();
        for (candidate, raw) in rows {
            if key_matches(key, &decode(&candidate, "doc_key")?) {
                found.push(decode(&raw, &candidate)?);
            }
        }
        Ok(found)
    }

    async fn remove(&self, store: &str, key: &Value) -> Result<()> {
        sqlx::query("DELETE FROM documents WHERE store = ? AND doc_key = ?")
            .bind(store)
            .bind(canonical_key(key)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove_tag(&self, store: &str, key: &Value, tag: &str) -> Result<()> {
        sqlx::query("DELETE FROM documents WHERE store = ? AND doc_key = ? AND tag = ?")
            .bind(store)
            .bind(canonical_key(key)?)
            .bind(tag)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        let one: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&self.pool).await?;
        Ok(one == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_sqlite_documents() {
        let store = SqliteDocumentStore::from_url("sqlite::memory:").await.unwrap();
        let key = json!({"provider": "p", "cluster": "c"});

        store
            .insert("cluster", &key, "clustercontent", &json!({"kubeconfig": "a"}))
            .await
            .unwrap();
        store
            .insert("cluster", &key, "clustercontent", &json!({"kubeconfig": "b"}))
            .await
            .unwrap();
        store
            .insert(
                "cluster",
                &json!({"cluster": "d", "provider": "p"}),
                "clustercontent",
                &json!({"kubeconfig": "d"}),
            )
            .await
            .unwrap();

        assert_eq!(
            store.find("cluster", &key, "clustercontent").await.unwrap(),
            vec![json!({"kubeconfig": "b"})]
        );
        let wildcard = json!({"provider": "p", "cluster": ""});
        assert_eq!(
            store
                .find("cluster", &wildcard, "clustercontent")
                .await
                .unwrap()
                .len(),
            2
        );

        store.remove("cluster", &key).await.unwrap();
        assert!(store.find("cluster", &key, "clustercontent").await.unwrap().is_empty());
        assert!(store.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_shares_database_with_context_db() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ncm.db");
        let docs = SqliteDocumentStore::from_path(&path).await.unwrap();
        let ctx = crate::contextdb::SqliteContextDb::from_path(&path)
            .await
            .unwrap();

        docs.insert("p", &json!({"provider": "p"}), "t", &json!(1))
            .await
            .unwrap();
        crate::contextdb::ContextDb::put(&ctx, "/context/1/", &json!("1"))
            .await
            .unwrap();
        assert_eq!(
            docs.find("p", &json!({"provider": "p"}), "t").await.unwrap(),
            vec![json!(1)]
        );
    }
}
