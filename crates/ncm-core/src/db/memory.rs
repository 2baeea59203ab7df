// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory document store.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{DocumentStore, canonical_key, key_matches};
use crate::error::Result;

#[derive(Debug, Default)]
struct Document {
    key: Value,
    tags: BTreeMap<String, Value>,
}

/// Document store kept in process memory. Clones share the same documents.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentStore {
    // (store, canonical key) -> document
    docs: Arc<RwLock<BTreeMap<(String, String), Document>>>,
}

impl MemoryDocumentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn insert(&self, store: &str, key: &Value, tag: &str, value: &Value) -> Result<()> {
        let id = (store.to_string(), canonical_key(key)?);
        let mut docs = self.docs.write().await;
        let doc = docs.entry(id).or_insert_with(|| Document {
            key: key.clone(),
            tags: BTreeMap::new(),
        });
        doc.tags.insert(tag.to_string(), value.clone());
        Ok(())
    }

    async fn find(&self, store: &str, key: &Value, tag: &str) -> Result<Vec<Value>> {
        canonical_key(key)?;
        let docs = self.docs.read().await;
        Ok(docs
            .iter()
            .filter(|((s, _), doc)| s == store && key_matches(key, &doc.key))
            .filter_map(|(_, doc)| doc.tags.get(tag).cloned())
            .collect())
    }

    async fn remove(&self, store: &str, key: &Value) -> Result<()> {
        let id = (store.to_string(), canonical_key(key)?);
        self.docs.write().await.remove(&id);
        Ok(())
    }

    async fn remove_tag(&self, store: &str, key: &Value, tag: &str) -> Result<()> {
        let id = (store.to_string(), canonical_key(key)?);
        let mut docs = self.docs.write().await;
        if let Some(doc) = docs.get_mut(&id) {
            doc.tags.remove(tag);
            if doc.tags.is_empty() {
                docs.remove(&id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_insert_find_remove() {
        let store = MemoryDocumentStore::new();
        let c1 = json!({"provider": "p", "cluster": "c1"});
        let c2 = json!({"provider": "p", "cluster": "c2"});
        store
            .insert("cluster", &c1, "clustermetadata", &json!({"n": 1}))
            .await
            .unwrap();
        store
            .insert("cluster", &c2, "clustermetadata", &json!({"n": 2}))
            .await
            .unwrap();
        store
            .insert("cluster", &c1, "stateInfo", &json!({"actions": []}))
            .await
            .unwrap();

        let all = store
            .find("cluster", &json!({"provider": "p", "cluster": ""}), "clustermetadata")
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        store.remove_tag("cluster", &c1, "stateInfo").await.unwrap();
        assert!(store.find("cluster", &c1, "stateInfo").await.unwrap().is_empty());
        assert_eq!(
            store.find("cluster", &c1, "clustermetadata").await.unwrap(),
            vec![json!({"n": 1})]
        );

        store.remove("cluster", &c1).await.unwrap();
        assert!(store.find("cluster", &c1, "clustermetadata").await.unwrap().is_empty());
        assert!(store.find("network", &c2, "clustermetadata").await.unwrap().is_empty());
    }
}
