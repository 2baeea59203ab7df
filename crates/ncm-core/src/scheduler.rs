// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Apply, terminate and report on the network intents of a cluster.
//!
//! Applying builds one AppContext holding a custom resource per intent under
//! the `network-intents` app, records it in the cluster ledger and hands it to
//! the resource synchronizer. Terminating asks the synchronizer to remove the
//! last applied AppContext and then deletes it locally.

use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::appcontext::{AppContext, InstructionLevel, InstructionType, StatusValue};
use crate::cluster::ClusterClient;
use crate::contextdb::ContextDb;
use crate::error::{CoreError, Result};
use crate::intents::{Intent, NetworkClient, ProviderNetClient};
use crate::lifecycle::ClusterOperation;
use crate::rsync::{RSYNC_NAME, RsyncInvoker};
use crate::state::{
    StateValue, get_app_context_from_id, get_last_context_id_from_state_info,
};
use crate::status::{OutputFormat, QueryType, StatusQuery, StatusResult, prepare_status_result};
use crate::types::{CONTEXT_CLUSTER_APP, context_cluster_name};

/// A rendered intent ready to be placed in an AppContext.
struct RenderedResource {
    name: String,
    yaml: String,
}

fn render<T: Intent>(intents: &[T]) -> Result<Vec<RenderedResource>> {
    intents
        .iter()
        .map(|intent| {
            Ok(RenderedResource {
                name: intent.resource_name(),
                yaml: intent.to_cr_yaml()?,
            })
        })
        .collect()
}

/// Drives the network intents of clusters through the synchronizer.
#[derive(Clone)]
pub struct SchedulerClient {
    contexts: Arc<dyn ContextDb>,
    clusters: ClusterClient,
    networks: NetworkClient,
    provider_nets: ProviderNetClient,
    rsync: Option<RsyncInvoker>,
    default_output: OutputFormat,
}

impl std::fmt::Debug for SchedulerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerClient")
            .field("rsync", &self.rsync)
            .field("default_output", &self.default_output)
            .finish_non_exhaustive()
    }
}

impl SchedulerClient {
    /// Create a scheduler. Without an rsync invoker nothing can be applied.
    pub fn new(
        contexts: Arc<dyn ContextDb>,
        clusters: ClusterClient,
        networks: NetworkClient,
        provider_nets: ProviderNetClient,
        rsync: Option<RsyncInvoker>,
    ) -> Self {
        Self {
            contexts,
            clusters,
            networks,
            provider_nets,
            rsync,
            default_output: OutputFormat::default(),
        }
    }

    /// Output format used by [`status_query`](Self::status_query).
    pub fn with_default_output(mut self, output: OutputFormat) -> Self {
        self.default_output = output;
        self
    }

    /// An rsync-mode query with the configured default output.
    pub fn status_query(&self) -> StatusQuery {
        StatusQuery::new(QueryType::Rsync, self.default_output)
    }

    fn rsync(&self) -> Result<&RsyncInvoker> {
        self.rsync.as_ref().ok_or_else(|| CoreError::RsyncUnavailable {
            service: RSYNC_NAME.to_string(),
        })
    }

    // ========================================================================
    // Apply
    // ========================================================================

    /// Apply the network intents of a cluster and return the new context id.
    ///
    /// Applies and terminates of one cluster run one at a time. If anything
    /// fails before the install request the AppContext is removed again.
    /// Once the request is issued the local state stays committed whatever
    /// the synchronizer answers.
    #[instrument(skip(self, cancel), fields(cluster_provider = %provider, cluster = %cluster))]
    pub async fn apply_network_intents(
        &self,
        provider: &str,
        cluster: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let _guard = self.clusters.lock_cluster(provider, cluster).await;
        let (read, _) = self
            .clusters
            .check_cluster(provider, cluster, ClusterOperation::Apply)
            .await?;
        let rsync = self.rsync()?;

        let mut resources = render(&self.networks.get_all(provider, cluster).await?)?;
        resources.extend(render(&self.provider_nets.get_all(provider, cluster).await?)?);

        let mut ac = AppContext::new(self.contexts.clone());
        let context_id = ac.init_app_context()?;

        let committed = async {
            self.build_context(&ac, &context_cluster_name(provider, cluster), &resources)
                .await?;
            let mut state = read.clone();
            state.append(StateValue::Applied, context_id.clone());
            self.clusters
                .replace_cluster_state(provider, cluster, &read, &state)
                .await
        }
        .await;
        if let Err(e) = committed {
            return Err(cleanup(&ac, &context_id, e).await);
        }

        info!(
            context_id = %context_id,
            resources = resources.len(),
            "Network intents AppContext committed"
        );

        rsync.install(&context_id, cancel).await?;
        info!(context_id = %context_id, "Network intents applied");
        Ok(context_id)
    }

    async fn build_context(
        &self,
        ac: &AppContext,
        cluster_name: &str,
        resources: &[RenderedResource],
    ) -> Result<()> {
        let root = ac.create_composite_app().await?;
        ac.set_app_context_status(StatusValue::Instantiating).await?;

        let app = ac.add_app(&root, CONTEXT_CLUSTER_APP).await?;
        ac.add_instruction(
            &root,
            InstructionLevel::App,
            InstructionType::Order,
            &json!({ "apporder": [CONTEXT_CLUSTER_APP] }).to_string(),
        )
        .await?;
        ac.add_instruction(
            &root,
            InstructionLevel::App,
            InstructionType::Dependency,
            &json!({ "appdependency": { (CONTEXT_CLUSTER_APP): "go" } }).to_string(),
        )
        .await?;

        let cluster = ac.add_cluster(&app, cluster_name).await?;
        let mut order = Vec::with_capacity(resources.len());
        let mut dependency = serde_json::Map::new();
        for resource in resources {
            ac.add_resource(&cluster, &resource.name, &resource.yaml)
                .await?;
            order.push(resource.name.clone());
            dependency.insert(resource.name.clone(), json!("go"));
        }

        ac.add_instruction(
            &cluster,
            InstructionLevel::Resource,
            InstructionType::Order,
            &json!({ "resorder": order }).to_string(),
        )
        .await?;
        ac.add_instruction(
            &cluster,
            InstructionLevel::Resource,
            InstructionType::Dependency,
            &json!({ "resdependency": dependency }).to_string(),
        )
        .await?;
        Ok(())
    }

    // ========================================================================
    // Terminate
    // ========================================================================

    /// Remove the applied network intents of a cluster.
    #[instrument(skip(self, cancel), fields(cluster_provider = %provider, cluster = %cluster))]
    pub async fn terminate_network_intents(
        &self,
        provider: &str,
        cluster: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let _guard = self.clusters.lock_cluster(provider, cluster).await;
        let (read, _) = self
            .clusters
            .check_cluster(provider, cluster, ClusterOperation::Terminate)
            .await?;
        let rsync = self.rsync()?;

        let context_id = get_last_context_id_from_state_info(&read);
        let ac = get_app_context_from_id(self.contexts.clone(), &context_id).await?;

        rsync.uninstall(&context_id, cancel).await?;

        let mut state = read.clone();
        state.append(StateValue::Terminated, context_id.clone());
        self.clusters
            .replace_cluster_state(provider, cluster, &read, &state)
            .await?;

        if let Err(e) = ac.delete_composite_app().await {
            warn!(context_id = %context_id, error = %e, "Failed to delete terminated AppContext");
        }
        info!(context_id = %context_id, "Network intents terminated");
        Ok(())
    }

    // ========================================================================
    // Status
    // ========================================================================

    /// Status of the network intents of a cluster.
    #[instrument(skip(self, query), fields(cluster_provider = %provider, cluster = %cluster))]
    pub async fn network_intents_status(
        &self,
        provider: &str,
        cluster: &str,
        query: &StatusQuery,
    ) -> Result<StatusResult> {
        let state = self.clusters.get_cluster_state(provider, cluster).await?;
        if query.instance.is_empty() && get_last_context_id_from_state_info(&state).is_empty() {
            return Err(CoreError::NotApplied {
                cluster: context_cluster_name(provider, cluster),
            });
        }

        let apps = [CONTEXT_CLUSTER_APP.to_string()];
        let mut result = prepare_status_result(self.contexts.clone(), &state, &apps, query).await?;
        result.name = cluster.to_string();
        Ok(result)
    }
}

/// Remove a partially built AppContext, keeping `primary` as the reported error.
async fn cleanup(ac: &AppContext, context_id: &str, primary: CoreError) -> CoreError {
    match ac.delete_composite_app().await {
        Ok(()) | Err(CoreError::NotFound { .. }) => primary,
        Err(e) => {
            error!(
                context_id = %context_id,
                primary = %primary,
                error = %e,
                "Failed to clean up AppContext"
            );
            CoreError::CleanupRequired {
                context_id: context_id.to_string(),
                primary: Box::new(primary),
                cleanup: e.to_string(),
            }
        }
    }
}
