// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cluster providers and clusters.
//!
//! A cluster document is keyed by `{provider, cluster}` and carries three tags:
//! `clustermetadata`, `clustercontent` (kubeconfig) and `stateInfo` (the
//! cluster's [`StateInfo`] ledger). Creating a cluster records `Created`.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, instrument, warn};

use crate::contextdb::ContextDb;
use crate::db::DocumentStore;
use crate::error::{CoreError, Result};
use crate::lifecycle::{self, ClusterOperation, ClusterState};
use crate::state::{
    StateInfo, StateValue, get_app_context_from_id, get_app_context_status,
    get_context_ids_from_state_info,
};
use crate::types::{Metadata, context_cluster_name};

/// Document collection of cluster providers, clusters and intents.
pub const STORE: &str = "cluster";
/// Tag of provider and cluster metadata.
pub const TAG_META: &str = "clustermetadata";
/// Tag of the cluster kubeconfig.
pub const TAG_CONTENT: &str = "clustercontent";
/// Tag of the cluster state ledger.
pub const TAG_STATE: &str = "stateInfo";

/// A cluster provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterProvider {
    /// Provider metadata.
    pub metadata: Metadata,
}

/// A cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    /// Cluster metadata.
    pub metadata: Metadata,
}

/// Access data of a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClusterContent {
    /// Base64 kubeconfig.
    pub kubeconfig: String,
}

pub(crate) fn provider_key(provider: &str) -> Value {
    json!({ "provider": provider })
}

pub(crate) fn cluster_key(provider: &str, cluster: &str) -> Value {
    json!({ "provider": provider, "cluster": cluster })
}

fn exact_cluster_key(provider: &str, name: &str) -> Result<Value> {
    if provider.is_empty() || name.is_empty() {
        return Err(CoreError::not_found(
            "Cluster",
            context_cluster_name(provider, name),
        ));
    }
    Ok(cluster_key(provider, name))
}

pub(crate) async fn find_one<T: DeserializeOwned>(
    docs: &dyn DocumentStore,
    key: &Value,
    tag: &str,
) -> Result<Option<T>> {
    match docs.find(STORE, key, tag).await?.into_iter().next() {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| CoreError::serialization(tag, e)),
        None => Ok(None),
    }
}

pub(crate) async fn find_all<T: DeserializeOwned>(
    docs: &dyn DocumentStore,
    key: &Value,
    tag: &str,
) -> Result<Vec<T>> {
    docs.find(STORE, key, tag)
        .await?
        .into_iter()
        .map(|v| serde_json::from_value(v).map_err(|e| CoreError::serialization(tag, e)))
        .collect()
}

/// Manages cluster providers and clusters.
///
/// Clones share one set of per-cluster locks, which serialize the
/// operations that read the ledger through the gate and then write it.
#[derive(Clone)]
pub struct ClusterClient {
    docs: Arc<dyn DocumentStore>,
    contexts: Arc<dyn ContextDb>,
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl std::fmt::Debug for ClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterClient").finish_non_exhaustive()
    }
}

impl ClusterClient {
    /// Create a client over the given stores.
    pub fn new(docs: Arc<dyn DocumentStore>, contexts: Arc<dyn ContextDb>) -> Self {
        Self {
            docs,
            contexts,
            locks: Arc::default(),
        }
    }

    /// Take the lifecycle lock of a cluster.
    ///
    /// Held from the gate check until the ledger write by apply, terminate
    /// and cluster deletion.
    pub(crate) async fn lock_cluster(&self, provider: &str, name: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .lock()
            .await
            .entry(context_cluster_name(provider, name))
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    // ========================================================================
    // Cluster providers
    // ========================================================================

    /// Register a cluster provider.
    #[instrument(skip(self, provider), fields(cluster_provider = %provider.metadata.name))]
    pub async fn create_cluster_provider(&self, provider: ClusterProvider) -> Result<ClusterProvider> {
        provider.metadata.validate()?;
        let key = provider_key(&provider.metadata.name);
        if find_one::<ClusterProvider>(self.docs.as_ref(), &key, TAG_META)
            .await?
            .is_some()
        {
            return Err(CoreError::AlreadyExists {
                entity: "ClusterProvider".to_string(),
                key: provider.metadata.name,
            });
        }
        self.docs
            .insert(STORE, &key, TAG_META, &serde_json::to_value(&provider)?)
            .await?;
        info!("Cluster provider created");
        Ok(provider)
    }

    /// Look up a cluster provider.
    pub async fn get_cluster_provider(&self, name: &str) -> Result<ClusterProvider> {
        if name.is_empty() {
            return Err(CoreError::not_found("ClusterProvider", name));
        }
        find_one(self.docs.as_ref(), &provider_key(name), TAG_META)
            .await?
            .ok_or_else(|| CoreError::not_found("ClusterProvider", name))
    }

    /// Every cluster provider.
    pub async fn get_cluster_providers(&self) -> Result<Vec<ClusterProvider>> {
        find_all(self.docs.as_ref(), &provider_key(""), TAG_META).await
    }

    /// Delete a cluster provider.
    #[instrument(skip(self))]
    pub async fn delete_cluster_provider(&self, name: &str) -> Result<()> {
        self.get_cluster_provider(name).await?;
        self.docs.remove(STORE, &provider_key(name)).await?;
        info!("Cluster provider deleted");
        Ok(())
    }

    // ========================================================================
    // Clusters
    // ========================================================================

    /// Register a cluster under an existing provider and record `Created`.
    #[instrument(skip(self, cluster, content), fields(cluster = %cluster.metadata.name))]
    pub async fn create_cluster(
        &self,
        provider: &str,
        cluster: Cluster,
        content: ClusterContent,
    ) -> Result<Cluster> {
        cluster.metadata.validate()?;
        self.get_cluster_provider(provider).await?;

        let key = cluster_key(provider, &cluster.metadata.name);
        if find_one::<Cluster>(self.docs.as_ref(), &key, TAG_META)
            .await?
            .is_some()
        {
            return Err(CoreError::AlreadyExists {
                entity: "Cluster".to_string(),
                key: context_cluster_name(provider, &cluster.metadata.name),
            });
        }

        self.docs
            .insert(STORE, &key, TAG_META, &serde_json::to_value(&cluster)?)
            .await?;
        self.docs
            .insert(STORE, &key, TAG_CONTENT, &serde_json::to_value(&content)?)
            .await?;
        let state = StateInfo::with_action(StateValue::Created, "");
        self.docs
            .insert(STORE, &key, TAG_STATE, &serde_json::to_value(&state)?)
            .await?;

        info!(cluster_provider = %provider, "Cluster created");
        Ok(cluster)
    }

    /// Look up a cluster.
    pub async fn get_cluster(&self, provider: &str, name: &str) -> Result<Cluster> {
        find_one(self.docs.as_ref(), &exact_cluster_key(provider, name)?, TAG_META)
            .await?
            .ok_or_else(|| CoreError::not_found("Cluster", context_cluster_name(provider, name)))
    }

    /// Kubeconfig of a cluster.
    pub async fn get_cluster_content(&self, provider: &str, name: &str) -> Result<ClusterContent> {
        find_one(self.docs.as_ref(), &exact_cluster_key(provider, name)?, TAG_CONTENT)
            .await?
            .ok_or_else(|| {
                CoreError::not_found("ClusterContent", context_cluster_name(provider, name))
            })
    }

    /// State ledger of a cluster.
    pub async fn get_cluster_state(&self, provider: &str, name: &str) -> Result<StateInfo> {
        find_one(self.docs.as_ref(), &exact_cluster_key(provider, name)?, TAG_STATE)
            .await?
            .ok_or_else(|| CoreError::not_found("Cluster", context_cluster_name(provider, name)))
    }

    /// Replace the state ledger of a cluster.
    pub(crate) async fn put_cluster_state(
        &self,
        provider: &str,
        name: &str,
        state: &StateInfo,
    ) -> Result<()> {
        self.docs
            .insert(
                STORE,
                &cluster_key(provider, name),
                TAG_STATE,
                &serde_json::to_value(state)?,
            )
            .await
    }

    /// Replace the state ledger of a cluster if it still equals `expected`.
    ///
    /// Fails with [`CoreError::StateConflict`] when another writer changed
    /// the ledger after `expected` was read.
    pub(crate) async fn replace_cluster_state(
        &self,
        provider: &str,
        name: &str,
        expected: &StateInfo,
        state: &StateInfo,
    ) -> Result<()> {
        let current = self.get_cluster_state(provider, name).await?;
        if &current != expected {
            warn!(
                cluster_provider = %provider,
                cluster = %name,
                "Cluster ledger changed since it was read"
            );
            return Err(CoreError::StateConflict {
                cluster: context_cluster_name(provider, name),
            });
        }
        self.put_cluster_state(provider, name, state).await
    }

    /// Check the gate for `operation` on a cluster, returning its ledger.
    pub async fn check_cluster(
        &self,
        provider: &str,
        name: &str,
        operation: ClusterOperation,
    ) -> Result<(StateInfo, ClusterState)> {
        let state = self.get_cluster_state(provider, name).await?;
        let current = lifecycle::check(&context_cluster_name(provider, name), &state, operation)?;
        Ok((state, current))
    }

    /// Every cluster of a provider.
    pub async fn get_clusters(&self, provider: &str) -> Result<Vec<Cluster>> {
        find_all(self.docs.as_ref(), &cluster_key(provider, ""), TAG_META).await
    }

    /// Delete a cluster.
    ///
    /// Allowed when its intents were never applied or have been terminated.
    /// Every earlier AppContext that still exists must have finished
    /// terminating; those contexts are deleted along with the cluster.
    #[instrument(skip(self), fields(cluster_provider = %provider, cluster = %name))]
    pub async fn delete_cluster(&self, provider: &str, name: &str) -> Result<()> {
        let _guard = self.lock_cluster(provider, name).await;
        let (state, _) = self
            .check_cluster(provider, name, ClusterOperation::DeleteCluster)
            .await?;
        let cluster = context_cluster_name(provider, name);

        let mut live = Vec::new();
        for id in get_context_ids_from_state_info(&state) {
            let ac = match get_app_context_from_id(self.contexts.clone(), &id).await {
                Ok(ac) => ac,
                Err(CoreError::NotFound { .. }) => {
                    debug!(context_id = %id, "AppContext already deleted");
                    continue;
                }
                Err(e) => return Err(e),
            };
            match get_app_context_status(self.contexts.clone(), &id).await {
                Ok(status) if status.status.is_terminal_termination() => live.push(ac),
                Err(e @ CoreError::StoreError { .. }) => return Err(e),
                _ => {
                    return Err(CoreError::TerminationPending {
                        cluster,
                        context_id: id,
                    });
                }
            }
        }

        for ac in live {
            ac.delete_composite_app().await?;
        }

        self.docs.remove(STORE, &cluster_key(provider, name)).await?;
        info!("Cluster deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appcontext::{AppContext, StatusValue};
    use crate::contextdb::MemoryContextDb;
    use crate::db::MemoryDocumentStore;

    fn client() -> (ClusterClient, Arc<dyn ContextDb>) {
        let contexts: Arc<dyn ContextDb> = Arc::new(MemoryContextDb::new());
        (
            ClusterClient::new(Arc::new(MemoryDocumentStore::new()), contexts.clone()),
            contexts,
        )
    }

    async fn with_cluster(client: &ClusterClient) {
        client
            .create_cluster_provider(ClusterProvider {
                metadata: Metadata::named("provA"),
            })
            .await
            .unwrap();
        client
            .create_cluster(
                "provA",
                Cluster {
                    metadata: Metadata::named("clusterX"),
                },
                ClusterContent {
                    kubeconfig: "a2NvbmZpZw==".to_string(),
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_provider_and_cluster_crud() {
        let (client, _) = client();
        with_cluster(&client).await;

        let dup = client
            .create_cluster_provider(ClusterProvider {
                metadata: Metadata::named("provA"),
            })
            .await
            .unwrap_err();
        assert_eq!(dup.error_code(), "ALREADY_EXISTS");

        let orphan = client
            .create_cluster(
                "nope",
                Cluster {
                    metadata: Metadata::named("c"),
                },
                ClusterContent::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(orphan.error_code(), "NOT_FOUND");

        assert_eq!(client.get_cluster_providers().await.unwrap().len(), 1);
        assert_eq!(client.get_clusters("provA").await.unwrap().len(), 1);
        assert_eq!(
            client
                .get_cluster_content("provA", "clusterX")
                .await
                .unwrap()
                .kubeconfig,
            "a2NvbmZpZw=="
        );
        let state = client.get_cluster_state("provA", "clusterX").await.unwrap();
        assert_eq!(state.actions.len(), 1);
        assert_eq!(state.actions[0].state, StateValue::Created);
    }

    #[tokio::test]
    async fn test_delete_created_cluster() {
        let (client, _) = client();
        with_cluster(&client).await;
        client.delete_cluster("provA", "clusterX").await.unwrap();
        assert!(client.get_cluster("provA", "clusterX").await.is_err());
        assert!(client.get_cluster_state("provA", "clusterX").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_applied_cluster_rejected() {
        let (client, _) = client();
        with_cluster(&client).await;
        let mut state = client.get_cluster_state("provA", "clusterX").await.unwrap();
        state.append(StateValue::Applied, "1");
        client
            .put_cluster_state("provA", "clusterX", &state)
            .await
            .unwrap();

        let err = client.delete_cluster("provA", "clusterX").await.unwrap_err();
        assert_eq!(err.error_code(), "MUST_TERMINATE_FIRST");
    }

    #[tokio::test]
    async fn test_delete_sweeps_terminated_contexts() {
        let (client, contexts) = client();
        with_cluster(&client).await;

        let mut ac = AppContext::new(contexts.clone());
        let id = ac.init_app_context().unwrap();
        ac.create_composite_app().await.unwrap();
        ac.set_app_context_status(StatusValue::Terminating)
            .await
            .unwrap();

        let mut state = client.get_cluster_state("provA", "clusterX").await.unwrap();
        state.append(StateValue::Applied, id.clone());
        state.append(StateValue::Terminated, id.clone());
        state.append(StateValue::Applied, "gone");
        state.append(StateValue::Terminated, "gone");
        client
            .put_cluster_state("provA", "clusterX", &state)
            .await
            .unwrap();

        let err = client.delete_cluster("provA", "clusterX").await.unwrap_err();
        assert_eq!(err.error_code(), "TERMINATION_PENDING");

        ac.set_app_context_status(StatusValue::TerminateFailed)
            .await
            .unwrap();
        client.delete_cluster("provA", "clusterX").await.unwrap();
        assert!(get_app_context_from_id(contexts, &id).await.is_err());
    }

    /// Context database that is unreachable.
    struct UnreachableContextDb;

    #[async_trait::async_trait]
    impl ContextDb for UnreachableContextDb {
        async fn put(&self, _key: &str, _value: &Value) -> Result<()> {
            Err(CoreError::store("put", "connection refused"))
        }

        async fn get(&self, _key: &str) -> Result<Option<Value>> {
            Err(CoreError::store("get", "connection refused"))
        }

        async fn delete(&self, _key: &str) -> Result<()> {
            Err(CoreError::store("delete", "connection refused"))
        }

        async fn delete_all(&self, _prefix: &str) -> Result<u64> {
            Err(CoreError::store("delete_all", "connection refused"))
        }

        async fn get_all_keys(&self, _prefix: &str) -> Result<Vec<String>> {
            Err(CoreError::store("get_all_keys", "connection refused"))
        }
    }

    #[tokio::test]
    async fn test_delete_cluster_propagates_context_store_errors() {
        let client = ClusterClient::new(
            Arc::new(MemoryDocumentStore::new()),
            Arc::new(UnreachableContextDb),
        );
        with_cluster(&client).await;

        let mut state = client.get_cluster_state("provA", "clusterX").await.unwrap();
        state.append(StateValue::Applied, "live1");
        state.append(StateValue::Terminated, "live1");
        client
            .put_cluster_state("provA", "clusterX", &state)
            .await
            .unwrap();

        let err = client.delete_cluster("provA", "clusterX").await.unwrap_err();
        assert_eq!(err.error_code(), "STORE_ERROR");
        assert!(client.get_cluster("provA", "clusterX").await.is_ok());
    }

    #[tokio::test]
    async fn test_replace_cluster_state_detects_conflict() {
        let (client, _) = client();
        with_cluster(&client).await;

        let read = client.get_cluster_state("provA", "clusterX").await.unwrap();
        let mut mine = read.clone();
        mine.append(StateValue::Applied, "mine");

        let mut theirs = read.clone();
        theirs.append(StateValue::Applied, "theirs");
        client
            .put_cluster_state("provA", "clusterX", &theirs)
            .await
            .unwrap();

        let err = client
            .replace_cluster_state("provA", "clusterX", &read, &mine)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "STATE_CONFLICT");
        assert!(err.is_precondition());
        assert_eq!(
            client.get_cluster_state("provA", "clusterX").await.unwrap(),
            theirs
        );

        client
            .replace_cluster_state("provA", "clusterX", &theirs, &mine)
            .await
            .unwrap();
        assert_eq!(
            client.get_cluster_state("provA", "clusterX").await.unwrap(),
            mine
        );
    }
}
