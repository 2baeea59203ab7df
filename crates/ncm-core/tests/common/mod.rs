// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for ncm-core integration tests.
//!
//! Provides TestContext with a runtime over in-memory stores, a mock
//! synchronizer and one registered cluster.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Once;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use ncm_core::appcontext::AppContext;
use ncm_core::cluster::{Cluster, ClusterContent, ClusterProvider};
use ncm_core::contextdb::{ContextDb, MemoryContextDb};
use ncm_core::db::{DocumentStore, MemoryDocumentStore};
use ncm_core::intents::{
    CNI_TYPE_OVN4NFV, Ipv4Subnet, Network, NetworkSpec, PROVIDER_NET_TYPE_VLAN, ProviderNet,
    ProviderNetSpec, Vlan,
};
use ncm_core::rsync::{MockRsyncClient, RsyncClient};
use ncm_core::state::get_app_context_from_id;
use ncm_core::types::Metadata;
use ncm_core::NcmRuntime;

pub const PROVIDER: &str = "provA";
pub const CLUSTER: &str = "clusterX";
pub const CONTEXT_CLUSTER: &str = "provA+clusterX";
pub const APP: &str = "network-intents";

static TRACING: Once = Once::new();

/// Send core logs to the test writer, filtered by `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Runtime, stores and mock synchronizer for one test.
pub struct TestContext {
    pub runtime: NcmRuntime,
    pub contexts: Arc<dyn ContextDb>,
    pub rsync: Arc<MockRsyncClient>,
    pub cancel: CancellationToken,
}

impl TestContext {
    /// Create a context with provider `provA` and cluster `clusterX`.
    pub async fn new() -> Self {
        init_tracing();

        let contexts: Arc<dyn ContextDb> = Arc::new(MemoryContextDb::new());
        let docs: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
        let rsync = Arc::new(MockRsyncClient::new());
        let runtime = NcmRuntime::builder()
            .context_db(contexts.clone())
            .document_store(docs)
            .rsync_client(rsync.clone() as Arc<dyn RsyncClient>)
            .rsync_timeout(Duration::from_secs(5))
            .build()
            .expect("Failed to build runtime");

        let ctx = Self {
            runtime,
            contexts,
            rsync,
            cancel: CancellationToken::new(),
        };
        ctx.register_cluster(PROVIDER, CLUSTER).await;
        ctx
    }

    /// Register a provider (if needed) and a cluster.
    pub async fn register_cluster(&self, provider: &str, cluster: &str) {
        let clusters = self.runtime.cluster_client();
        if clusters.get_cluster_provider(provider).await.is_err() {
            clusters
                .create_cluster_provider(ClusterProvider {
                    metadata: Metadata::named(provider),
                })
                .await
                .expect("Failed to create cluster provider");
        }
        clusters
            .create_cluster(
                provider,
                Cluster {
                    metadata: Metadata::named(cluster),
                },
                ClusterContent {
                    kubeconfig: "YXBpVmVyc2lvbjogdjE=".to_string(),
                },
            )
            .await
            .expect("Failed to create cluster");
    }

    /// Declare a virtual network on the test cluster.
    pub async fn add_network(&self, name: &str) {
        self.runtime
            .network_client()
            .create(network(name), PROVIDER, CLUSTER, false)
            .await
            .expect("Failed to create network");
    }

    /// Declare a VLAN provider network on the test cluster.
    pub async fn add_provider_net(&self, name: &str) {
        self.runtime
            .provider_net_client()
            .create(provider_net(name), PROVIDER, CLUSTER, false)
            .await
            .expect("Failed to create provider network");
    }

    /// Apply the test cluster's intents.
    pub async fn apply(&self) -> String {
        self.runtime
            .scheduler_client()
            .apply_network_intents(PROVIDER, CLUSTER, &self.cancel)
            .await
            .expect("Failed to apply network intents")
    }

    /// Terminate the test cluster's intents.
    pub async fn terminate(&self) {
        self.runtime
            .scheduler_client()
            .terminate_network_intents(PROVIDER, CLUSTER, &self.cancel)
            .await
            .expect("Failed to terminate network intents");
    }

    /// A fresh AppContext instance bound to `id`.
    pub async fn load(&self, id: &str) -> AppContext {
        get_app_context_from_id(self.contexts.clone(), id)
            .await
            .expect("Failed to load AppContext")
    }

    /// Write a resource status the way the synchronizer does.
    pub async fn write_resource_status(&self, id: &str, resource: &str, status: Value) {
        let ac = self.load(id).await;
        let handle = ac
            .get_resource_handle(APP, CONTEXT_CLUSTER, resource)
            .await
            .expect("Resource not found");
        ac.add_level_value(&handle, "status", &status)
            .await
            .expect("Failed to write resource status");
    }

    /// Write a cluster status snapshot the way the cluster monitor does.
    pub async fn write_cluster_status(&self, id: &str, bundle: Value) {
        let ac = self.load(id).await;
        let handle = ac
            .get_cluster_handle(APP, CONTEXT_CLUSTER)
            .await
            .expect("Cluster not found");
        ac.add_level_value(&handle, "status", &bundle)
            .await
            .expect("Failed to write cluster status");
    }

    /// Every context key currently stored.
    pub async fn context_keys(&self) -> Vec<String> {
        self.contexts
            .get_all_keys("/context/")
            .await
            .expect("Failed to list context keys")
    }
}

pub fn network(name: &str) -> Network {
    Network {
        metadata: Metadata::named(name),
        spec: NetworkSpec {
            cni_type: CNI_TYPE_OVN4NFV.to_string(),
            ipv4_subnets: vec![Ipv4Subnet {
                subnet: "172.16.30.0/24".to_string(),
                name: "subnet1".to_string(),
                gateway: "172.16.30.1/24".to_string(),
                exclude: "172.16.30.2..172.16.30.9".to_string(),
            }],
        },
    }
}

pub fn provider_net(name: &str) -> ProviderNet {
    ProviderNet {
        metadata: Metadata::named(name),
        spec: ProviderNetSpec {
            cni_type: CNI_TYPE_OVN4NFV.to_string(),
            ipv4_subnets: vec![Ipv4Subnet {
                subnet: "10.10.10.0/24".to_string(),
                name: "subnet".to_string(),
                gateway: String::new(),
                exclude: String::new(),
            }],
            provider_net_type: PROVIDER_NET_TYPE_VLAN.to_string(),
            vlan: Vlan {
                vlan_id: "102".to_string(),
                provider_interface_name: "eth1".to_string(),
                logical_interface_name: "eth1.102".to_string(),
                vlan_node_selector: "specific".to_string(),
                node_label_list: vec!["kubernetes.io/hostname=node1".to_string()],
            },
        },
    }
}
