// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory context database.
//!
//! Used for tests and for embedding the core without an external store.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::ContextDb;
use crate::error::CoreError;

/// Context database backed by an ordered map.
///
/// Cloning shares the underlying map, so several runtime contexts can observe
/// each other's writes just like they would against a shared store.
#[derive(Debug, Clone, Default)]
pub struct MemoryContextDb {
    entries: Arc<RwLock<BTreeMap<String, Value>>>,
}

impl MemoryContextDb {
    /// Create an empty in-memory context database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// True when no keys are stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ContextDb for MemoryContextDb {
    async fn put(&self, key: &str, value: &Value) -> Result<(), CoreError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, CoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), CoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn delete_all(&self, prefix: &str) -> Result<u64, CoreError> {
        let mut entries = self.entries.write().await;
        let doomed: Vec<String> = entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            entries.remove(key);
        }
        Ok(doomed.len() as u64)
    }

    async fn get_all_keys(&self, prefix: &str) -> Result<Vec<String>, CoreError> {
        let entries = self.entries.read().await;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}
