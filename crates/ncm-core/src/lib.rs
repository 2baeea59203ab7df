// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! NCM Core - Network Intent Orchestration
//!
//! This crate holds the core of a multi-cluster network-intent orchestrator.
//! Operators register cluster providers and clusters and declare virtual and
//! provider networks on them. Applying a cluster's intents builds an
//! AppContext, records it in the cluster's state ledger and asks the resource
//! synchronizer (rsync) to install it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   ClusterClient / NetworkClient / ...                    │
//! │                    (domain CRUD, lifecycle gate checks)                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//!           │                         │                          │
//!           ▼                         ▼                          ▼
//! ┌───────────────────┐   ┌──────────────────────┐   ┌──────────────────────┐
//! │   DocumentStore   │   │   SchedulerClient    │──▶│     RsyncClient      │
//! │ (clusters, intents│   │ apply / terminate /  │   │ install / uninstall  │
//! │  state ledgers)   │   │ status               │   └──────────────────────┘
//! └───────────────────┘   └──────────────────────┘
//!                                     │
//!                                     ▼
//!                         ┌──────────────────────┐
//!                         │ AppContext           │
//!                         │  └ RunTimeContext    │
//!                         │     └ ContextDb      │
//!                         └──────────────────────┘
//! ```
//!
//! # AppContext Layout
//!
//! ```text
//! /context/<id>/                                          root (value: id)
//! /context/<id>/meta/                                     CompositeAppMeta
//! /context/<id>/status/                                   AppContextStatus
//! /context/<id>/app/instruction/order/                    {"apporder": [...]}
//! /context/<id>/app/network-intents/
//! /context/<id>/app/network-intents/cluster/<p>+<c>/
//! /context/<id>/app/network-intents/cluster/<p>+<c>/status/          ResourceBundleStatus
//! /context/<id>/app/network-intents/cluster/<p>+<c>/resource/instruction/order/
//! /context/<id>/app/network-intents/cluster/<p>+<c>/resource/<name>+<kind>/         CR YAML
//! /context/<id>/app/network-intents/cluster/<p>+<c>/resource/<name>+<kind>/status/  ResourceStatus
//! ```
//!
//! # Cluster Lifecycle
//!
//! ```text
//!   ┌─────────┐  apply   ┌─────────┐ terminate ┌────────────┐
//!   │ Created │─────────▶│ Applied │──────────▶│ Terminated │
//!   └─────────┘          └─────────┘◀──────────└────────────┘
//!                                       apply
//! ```
//!
//! Intents are frozen while a cluster is `Applied`; see [`lifecycle`].
//!
//! # Configuration
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `NCM_CONTEXT_DB_URL` | No | in-memory | SQLite URL of the context database |
//! | `NCM_DOCUMENT_DB_URL` | No | in-memory | SQLite URL of the document store |
//! | `NCM_RSYNC_TIMEOUT_SECS` | No | `10` | Timeout of one rsync call |
//! | `NCM_STATUS_DEFAULT_OUTPUT` | No | `all` | Default status output format |

#![warn(missing_docs)]

/// AppContext: typed composite-app operations over a runtime context.
pub mod appcontext;

/// Cluster providers and clusters.
pub mod cluster;

/// Configuration loaded from environment variables.
pub mod config;

/// Key/value context database backends.
pub mod contextdb;

/// Document store backends.
pub mod db;

/// Error types with stable error codes.
pub mod error;

/// Virtual and provider network intents.
pub mod intents;

/// Cluster lifecycle gate.
pub mod lifecycle;

/// Embedded SQLite migrations.
pub mod migrations;

/// Per-resource status written by the synchronizer.
pub mod resourcestatus;

/// Resource synchronizer boundary.
pub mod rsync;

/// Handles and the runtime context.
pub mod rtcontext;

/// Embeddable runtime wiring the domain clients.
pub mod runtime;

/// Apply, terminate and status of network intents.
pub mod scheduler;

/// State ledger.
pub mod state;

/// Status aggregation.
pub mod status;

/// Shared domain types.
pub mod types;

pub use appcontext::AppContext;
pub use cluster::ClusterClient;
pub use config::{Config, ConfigError};
pub use error::{CoreError, Result};
pub use intents::{NetworkClient, ProviderNetClient};
pub use lifecycle::{ClusterOperation, ClusterState};
pub use rtcontext::{Handle, RunTimeContext};
pub use runtime::{NcmRuntime, NcmRuntimeBuilder};
pub use scheduler::SchedulerClient;
pub use state::{StateInfo, StateValue};
pub use status::{StatusQuery, StatusResult};
