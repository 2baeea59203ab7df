// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for ncm-core.
//!
//! [`NcmRuntime`] wires the stores and the resource synchronizer into the
//! domain clients so that an application (an HTTP layer, a CLI, a test)
//! only holds one value.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ncm_core::contextdb::SqliteContextDb;
//! use ncm_core::db::SqliteDocumentStore;
//! use ncm_core::runtime::NcmRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = NcmRuntime::builder()
//!         .context_db(Arc::new(SqliteContextDb::from_path("ncm.db").await?))
//!         .document_store(Arc::new(SqliteDocumentStore::from_path("ncm.db").await?))
//!         .rsync_client(Arc::new(MyRsyncClient::connect("rsync:9031").await?))
//!         .build()?;
//!
//!     let id = runtime
//!         .scheduler_client()
//!         .apply_network_intents("provA", "clusterX", &CancellationToken::new())
//!         .await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use crate::cluster::ClusterClient;
use crate::config::Config;
use crate::contextdb::{ContextDb, MemoryContextDb, SqliteContextDb};
use crate::db::{DocumentStore, MemoryDocumentStore, SqliteDocumentStore};
use crate::intents::{NetworkClient, ProviderNetClient};
use crate::rsync::{DEFAULT_RSYNC_TIMEOUT, RsyncClient, RsyncInvoker};
use crate::scheduler::SchedulerClient;
use crate::status::OutputFormat;

/// Builder for creating an [`NcmRuntime`].
pub struct NcmRuntimeBuilder {
    context_db: Option<Arc<dyn ContextDb>>,
    document_store: Option<Arc<dyn DocumentStore>>,
    rsync_client: Option<Arc<dyn RsyncClient>>,
    rsync_timeout: Duration,
    status_default_output: OutputFormat,
}

impl std::fmt::Debug for NcmRuntimeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NcmRuntimeBuilder")
            .field("context_db", &self.context_db.as_ref().map(|_| "..."))
            .field("document_store", &self.document_store.as_ref().map(|_| "..."))
            .field(
                "rsync_client",
                &self.rsync_client.as_ref().map(|c| c.client_type()),
            )
            .field("rsync_timeout", &self.rsync_timeout)
            .field("status_default_output", &self.status_default_output)
            .finish()
    }
}

impl Default for NcmRuntimeBuilder {
    fn default() -> Self {
        Self {
            context_db: None,
            document_store: None,
            rsync_client: None,
            rsync_timeout: DEFAULT_RSYNC_TIMEOUT,
            status_default_output: OutputFormat::default(),
        }
    }
}

impl NcmRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the context database (required).
    pub fn context_db(mut self, db: Arc<dyn ContextDb>) -> Self {
        self.context_db = Some(db);
        self
    }

    /// Set the document store (required).
    pub fn document_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.document_store = Some(store);
        self
    }

    /// Set the resource synchronizer client. Without one, apply and
    /// terminate fail with `RSYNC_UNAVAILABLE`.
    pub fn rsync_client(mut self, client: Arc<dyn RsyncClient>) -> Self {
        self.rsync_client = Some(client);
        self
    }

    /// Set the timeout of a single rsync call.
    ///
    /// Default: 10 seconds
    pub fn rsync_timeout(mut self, timeout: Duration) -> Self {
        self.rsync_timeout = timeout;
        self
    }

    /// Set the output format of [`SchedulerClient::status_query`].
    ///
    /// Default: `all`
    pub fn status_default_output(mut self, output: OutputFormat) -> Self {
        self.status_default_output = output;
        self
    }

    /// Build the runtime.
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> Result<NcmRuntime> {
        let context_db = self
            .context_db
            .ok_or_else(|| anyhow::anyhow!("context db is required"))?;
        let document_store = self
            .document_store
            .ok_or_else(|| anyhow::anyhow!("document store is required"))?;
        if self.rsync_timeout.is_zero() {
            anyhow::bail!("rsync timeout must be positive");
        }

        let clusters = ClusterClient::new(document_store.clone(), context_db.clone());
        let networks = NetworkClient::new(document_store.clone(), clusters.clone());
        let provider_nets = ProviderNetClient::new(document_store.clone(), clusters.clone());
        let rsync = self
            .rsync_client
            .map(|client| RsyncInvoker::new(client, self.rsync_timeout));
        let scheduler = SchedulerClient::new(
            context_db.clone(),
            clusters.clone(),
            networks.clone(),
            provider_nets.clone(),
            rsync,
        )
        .with_default_output(self.status_default_output);

        Ok(NcmRuntime {
            context_db,
            document_store,
            clusters,
            networks,
            provider_nets,
            scheduler,
        })
    }
}

/// Domain clients sharing one context database and document store.
#[derive(Clone)]
pub struct NcmRuntime {
    context_db: Arc<dyn ContextDb>,
    document_store: Arc<dyn DocumentStore>,
    clusters: ClusterClient,
    networks: NetworkClient,
    provider_nets: ProviderNetClient,
    scheduler: SchedulerClient,
}

impl std::fmt::Debug for NcmRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NcmRuntime")
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl NcmRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> NcmRuntimeBuilder {
        NcmRuntimeBuilder::new()
    }

    /// Connect the backends named by `config`, in-memory where no URL is set.
    pub async fn from_config(
        config: &Config,
        rsync_client: Option<Arc<dyn RsyncClient>>,
    ) -> Result<Self> {
        let context_db: Arc<dyn ContextDb> = match &config.context_db_url {
            Some(url) => Arc::new(SqliteContextDb::from_url(url).await?),
            None => Arc::new(MemoryContextDb::new()),
        };
        let document_store: Arc<dyn DocumentStore> = match &config.document_db_url {
            Some(url) => Arc::new(SqliteDocumentStore::from_url(url).await?),
            None => Arc::new(MemoryDocumentStore::new()),
        };

        let mut builder = Self::builder()
            .context_db(context_db)
            .document_store(document_store)
            .rsync_timeout(config.rsync_timeout)
            .status_default_output(config.status_default_output);
        if let Some(client) = rsync_client {
            builder = builder.rsync_client(client);
        }
        let runtime = builder.build()?;

        info!(
            context_db = config.context_db_url.as_deref().unwrap_or("memory"),
            document_store = config.document_db_url.as_deref().unwrap_or("memory"),
            "NcmRuntime started"
        );
        Ok(runtime)
    }

    /// Cluster providers and clusters.
    pub fn cluster_client(&self) -> &ClusterClient {
        &self.clusters
    }

    /// Virtual networks.
    pub fn network_client(&self) -> &NetworkClient {
        &self.networks
    }

    /// Provider networks.
    pub fn provider_net_client(&self) -> &ProviderNetClient {
        &self.provider_nets
    }

    /// Apply, terminate and status of network intents.
    pub fn scheduler_client(&self) -> &SchedulerClient {
        &self.scheduler
    }

    /// The shared context database.
    pub fn context_db(&self) -> &Arc<dyn ContextDb> {
        &self.context_db
    }

    /// The shared document store.
    pub fn document_store(&self) -> &Arc<dyn DocumentStore> {
        &self.document_store
    }

    /// True if both stores answer.
    pub async fn health_check(&self) -> Result<bool> {
        Ok(self.context_db.health_check().await? && self.document_store.health_check().await?)
    }
}
