// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Database migrations for ncm-core.
//!
//! This module exposes embedded migrations that can be run programmatically.
//! Both SQLite backends ([`SqliteContextDb`](crate::contextdb::SqliteContextDb) and
//! [`SqliteDocumentStore`](crate::db::SqliteDocumentStore)) share one schema, so they
//! may point at the same database file.
//!
//! # Example
//!
//! ```ignore
//! use sqlx::SqlitePool;
//! use ncm_core::migrations;
//!
//! let pool = SqlitePool::connect("sqlite:ncm.db?mode=rwc").await?;
//! migrations::run_sqlite(&pool).await?;
//! ```

use sqlx::migrate::MigrateError;

/// SQLite migrator with all core migrations embedded.
pub static SQLITE: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/sqlite");

/// Run SQLite migrations.
///
/// Applies all pending migrations to the database. Safe to call multiple times;
/// already-applied migrations are skipped.
pub async fn run_sqlite(pool: &sqlx::SqlitePool) -> Result<(), MigrateError> {
    SQLITE.run(pool).await
}
