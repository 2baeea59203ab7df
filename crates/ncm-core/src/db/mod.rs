// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tagged document store.
//!
//! Domain objects (cluster providers, clusters, networks) are stored as
//! documents identified by a collection name and a key object such as
//! `{"provider": "p", "cluster": "c"}`. A document holds one JSON value per
//! tag, so a cluster keeps its metadata, kubeconfig and state ledger side by
//! side under `clustermetadata`, `clustercontent` and `stateInfo`.
//!
//! In [`DocumentStore::find`] a key field holding an empty string matches any
//! value, which is how "all clusters of provider p" is expressed.

pub mod memory;
pub mod sqlite;

pub use self::memory::MemoryDocumentStore;
pub use self::sqlite::SqliteDocumentStore;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{CoreError, Result};

/// Document store interface.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert or replace the value of `tag` on the document `key`.
    async fn insert(&self, store: &str, key: &Value, tag: &str, value: &Value) -> Result<()>;

    /// Values of `tag` on every document matching `key`.
    async fn find(&self, store: &str, key: &Value, tag: &str) -> Result<Vec<Value>>;

    /// Remove the document `key` with all of its tags.
    async fn remove(&self, store: &str, key: &Value) -> Result<()>;

    /// Remove a single tag from the document `key`.
    async fn remove_tag(&self, store: &str, key: &Value, tag: &str) -> Result<()>;

    /// Verify the backend is reachable.
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Canonical string form of a document key.
///
/// Keys must be flat objects of strings; field order does not matter.
pub(crate) fn canonical_key(key: &Value) -> Result<String> {
    let map = key
        .as_object()
        .ok_or_else(|| CoreError::validation("key", "document key must be an object"))?;
    if let Some((field, _)) = map.iter().find(|(_, v)| !v.is_string()) {
        return Err(CoreError::validation(
            field.as_str(),
            "document key fields must be strings",
        ));
    }
    // serde_json maps are ordered by key
    Ok(key.to_string())
}

/// True if `key` has no wildcard fields.
pub(crate) fn is_exact(key: &Value) -> bool {
    key.as_object()
        .map(|m| m.values().all(|v| v.as_str().is_some_and(|s| !s.is_empty())))
        .unwrap_or(false)
}

/// True if document key `candidate` matches `pattern`, treating empty pattern
/// fields as wildcards.
pub(crate) fn key_matches(pattern: &Value, candidate: &Value) -> bool {
    let (Some(pattern), Some(candidate)) = (pattern.as_object(), candidate.as_object()) else {
        return false;
    };
    if pattern.len() != candidate.len() {
        return false;
    }
    pattern.iter().all(|(field, want)| match want.as_str() {
        Some("") => candidate.contains_key(field),
        _ => candidate.get(field) == Some(want),
    })
}
