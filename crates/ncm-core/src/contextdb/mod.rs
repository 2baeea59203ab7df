// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Context database interfaces and backends.
//!
//! The context database is the etcd-like key/value store underneath
//! [`RunTimeContext`](crate::rtcontext::RunTimeContext). Keys are path strings;
//! values are JSON documents. Backends only need point reads/writes and
//! prefix scans/deletes; all structure lives in the handle layer above.

pub mod memory;
pub mod sqlite;

pub use self::memory::MemoryContextDb;
pub use self::sqlite::SqliteContextDb;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::CoreError;

/// Key/value interface used by the runtime-context layer.
#[async_trait]
pub trait ContextDb: Send + Sync {
    /// Insert or overwrite the value at `key`.
    async fn put(&self, key: &str, value: &Value) -> Result<(), CoreError>;

    /// Read the value at `key`, `None` if the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Value>, CoreError>;

    /// Delete a single key. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CoreError>;

    /// Delete every key starting with `prefix` and return how many were removed.
    async fn delete_all(&self, prefix: &str) -> Result<u64, CoreError>;

    /// List every key starting with `prefix`, in lexical order.
    async fn get_all_keys(&self, prefix: &str) -> Result<Vec<String>, CoreError>;

    /// Verify the backend is reachable.
    async fn health_check(&self) -> Result<bool, CoreError> {
        // Default: in-process backends are always healthy
        Ok(true)
    }
}
