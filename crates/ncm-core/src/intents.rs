// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Network intents: virtual networks and provider networks of a cluster.
//!
//! Intents are documents under the cluster they belong to. They can only be
//! changed while the cluster's intents are not applied. When applied, each
//! intent is rendered to a custom resource for the cluster's CNI controller.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, instrument};

use crate::cluster::{ClusterClient, STORE, find_all, find_one};
use crate::db::DocumentStore;
use crate::error::{CoreError, Result};
use crate::lifecycle::ClusterOperation;
use crate::types::{Metadata, SEPARATOR, context_cluster_name};

/// `apiVersion` of the rendered custom resources.
pub const CR_API_VERSION: &str = "k8s.plugin.opnfv.org/v1alpha1";

/// Supported CNI.
pub const CNI_TYPE_OVN4NFV: &str = "ovn4nfv";
/// Provider network attached through a VLAN.
pub const PROVIDER_NET_TYPE_VLAN: &str = "VLAN";
/// Provider network attached directly.
pub const PROVIDER_NET_TYPE_DIRECT: &str = "DIRECT";

/// An IPv4 subnet of a network.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Ipv4Subnet {
    /// CIDR, e.g. `172.16.33.0/24`.
    pub subnet: String,
    /// Subnet name.
    pub name: String,
    /// Gateway CIDR, may be empty.
    #[serde(default)]
    pub gateway: String,
    /// Space separated addresses or `a..b` ranges to keep out of allocation.
    #[serde(rename = "excludeIps", default)]
    pub exclude: String,
}

/// VLAN settings of a provider network.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vlan {
    /// VLAN id.
    #[serde(rename = "vlanID")]
    pub vlan_id: String,
    /// Physical interface on the node.
    pub provider_interface_name: String,
    /// Interface name inside the pod.
    #[serde(default)]
    pub logical_interface_name: String,
    /// `any` or `specific`.
    #[serde(default)]
    pub vlan_node_selector: String,
    /// Node labels used when the selector is `specific`.
    #[serde(default)]
    pub node_label_list: Vec<String>,
}

/// Spec of a virtual network.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    /// CNI that realizes the network.
    pub cni_type: String,
    /// Subnets of the network.
    #[serde(default)]
    pub ipv4_subnets: Vec<Ipv4Subnet>,
}

/// A virtual network of a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    /// Network metadata.
    pub metadata: Metadata,
    /// Network spec.
    pub spec: NetworkSpec,
}

/// Spec of a provider network.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderNetSpec {
    /// CNI that realizes the network.
    pub cni_type: String,
    /// Subnets of the network.
    #[serde(default)]
    pub ipv4_subnets: Vec<Ipv4Subnet>,
    /// `VLAN` or `DIRECT`.
    pub provider_net_type: String,
    /// VLAN settings.
    #[serde(default)]
    pub vlan: Vlan,
}

/// A provider network of a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderNet {
    /// Provider network metadata.
    pub metadata: Metadata,
    /// Provider network spec.
    pub spec: ProviderNetSpec,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CustomResource<'a, S> {
    api_version: &'static str,
    kind: &'static str,
    metadata: &'a Metadata,
    spec: S,
}

// The CR spells the VLAN id `vlanId`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CrVlan<'a> {
    vlan_id: &'a str,
    provider_interface_name: &'a str,
    logical_interface_name: &'a str,
    vlan_node_selector: &'a str,
    node_label_list: &'a [String],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CrProviderNetSpec<'a> {
    cni_type: &'a str,
    ipv4_subnets: &'a [Ipv4Subnet],
    provider_net_type: &'a str,
    vlan: CrVlan<'a>,
}

/// A network intent stored under a cluster.
pub trait Intent: Serialize + DeserializeOwned + Send + Sync {
    /// Entity name used in errors.
    const ENTITY: &'static str;
    /// Key field naming the intent in its document key.
    const KEY_FIELD: &'static str;
    /// Document tag holding the intent.
    const TAG: &'static str;
    /// Kind of the rendered custom resource.
    const KIND: &'static str;

    /// Intent metadata.
    fn metadata(&self) -> &Metadata;

    /// Check the intent before it is stored.
    fn validate(&self) -> Result<()>;

    /// Render the custom resource as YAML.
    fn to_cr_yaml(&self) -> Result<String>;

    /// AppContext resource name `"<name>+<kind>"`.
    fn resource_name(&self) -> String {
        format!("{}{}{}", self.metadata().name, SEPARATOR, Self::KIND)
    }
}

fn validate_cni(cni_type: &str) -> Result<()> {
    if cni_type != CNI_TYPE_OVN4NFV {
        return Err(CoreError::validation(
            "spec.cniType",
            format!("unsupported CNI type '{}'", cni_type),
        ));
    }
    Ok(())
}

fn to_yaml<T: Serialize>(value: &T, context: &str) -> Result<String> {
    serde_yaml::to_string(value).map_err(|e| CoreError::serialization(context, e))
}

impl Intent for Network {
    const ENTITY: &'static str = "Network";
    const KEY_FIELD: &'static str = "network";
    const TAG: &'static str = "networkmetadata";
    const KIND: &'static str = "Network";

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn validate(&self) -> Result<()> {
        self.metadata.validate()?;
        validate_cni(&self.spec.cni_type)
    }

    fn to_cr_yaml(&self) -> Result<String> {
        to_yaml(
            &CustomResource {
                api_version: CR_API_VERSION,
                kind: Self::KIND,
                metadata: &self.metadata,
                spec: &self.spec,
            },
            &self.resource_name(),
        )
    }
}

impl Intent for ProviderNet {
    const ENTITY: &'static str = "ProviderNet";
    const KEY_FIELD: &'static str = "providernet";
    const TAG: &'static str = "providernetmetadata";
    const KIND: &'static str = "ProviderNetwork";

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn validate(&self) -> Result<()> {
        self.metadata.validate()?;
        validate_cni(&self.spec.cni_type)?;
        match self.spec.provider_net_type.as_str() {
            PROVIDER_NET_TYPE_VLAN | PROVIDER_NET_TYPE_DIRECT => Ok(()),
            other => Err(CoreError::validation(
                "spec.providerNetType",
                format!("unsupported provider network type '{}'", other),
            )),
        }
    }

    fn to_cr_yaml(&self) -> Result<String> {
        let vlan = &self.spec.vlan;
        to_yaml(
            &CustomResource {
                api_version: CR_API_VERSION,
                kind: Self::KIND,
                metadata: &self.metadata,
                spec: CrProviderNetSpec {
                    cni_type: &self.spec.cni_type,
                    ipv4_subnets: &self.spec.ipv4_subnets,
                    provider_net_type: &self.spec.provider_net_type,
                    vlan: CrVlan {
                        vlan_id: &vlan.vlan_id,
                        provider_interface_name: &vlan.provider_interface_name,
                        logical_interface_name: &vlan.logical_interface_name,
                        vlan_node_selector: &vlan.vlan_node_selector,
                        node_label_list: &vlan.node_label_list,
                    },
                },
            },
            &self.resource_name(),
        )
    }
}

/// Manages one kind of network intent.
pub struct IntentClient<T> {
    docs: Arc<dyn DocumentStore>,
    clusters: ClusterClient,
    _kind: PhantomData<fn() -> T>,
}

/// Client for virtual networks.
pub type NetworkClient = IntentClient<Network>;
/// Client for provider networks.
pub type ProviderNetClient = IntentClient<ProviderNet>;

impl<T> Clone for IntentClient<T> {
    fn clone(&self) -> Self {
        Self {
            docs: self.docs.clone(),
            clusters: self.clusters.clone(),
            _kind: PhantomData,
        }
    }
}

impl<T: Intent> std::fmt::Debug for IntentClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntentClient")
            .field("kind", &T::ENTITY)
            .finish_non_exhaustive()
    }
}

impl<T: Intent> IntentClient<T> {
    /// Create a client over the given document store.
    pub fn new(docs: Arc<dyn DocumentStore>, clusters: ClusterClient) -> Self {
        Self {
            docs,
            clusters,
            _kind: PhantomData,
        }
    }

    fn key(provider: &str, cluster: &str, name: &str) -> Value {
        json!({ "provider": provider, "cluster": cluster, (T::KEY_FIELD): name })
    }

    /// Store an intent. With `exists` set an existing intent is replaced,
    /// otherwise a duplicate name is rejected.
    #[instrument(skip(self, intent), fields(kind = T::ENTITY, name = %intent.metadata().name))]
    pub async fn create(&self, intent: T, provider: &str, cluster: &str, exists: bool) -> Result<T> {
        intent.validate()?;
        let _guard = self.clusters.lock_cluster(provider, cluster).await;
        self.clusters
            .check_cluster(provider, cluster, ClusterOperation::CreateIntent)
            .await?;

        let name = &intent.metadata().name;
        let key = Self::key(provider, cluster, name);
        if !exists
            && find_one::<T>(self.docs.as_ref(), &key, T::TAG)
                .await?
                .is_some()
        {
            return Err(CoreError::AlreadyExists {
                entity: T::ENTITY.to_string(),
                key: name.clone(),
            });
        }

        self.docs
            .insert(STORE, &key, T::TAG, &serde_json::to_value(&intent)?)
            .await?;
        info!(cluster_provider = %provider, cluster = %cluster, "Network intent stored");
        Ok(intent)
    }

    /// Look up an intent.
    pub async fn get(&self, name: &str, provider: &str, cluster: &str) -> Result<T> {
        if name.is_empty() {
            return Err(CoreError::not_found(T::ENTITY, name));
        }
        find_one(self.docs.as_ref(), &Self::key(provider, cluster, name), T::TAG)
            .await?
            .ok_or_else(|| CoreError::not_found(T::ENTITY, name))
    }

    /// Every intent of this kind on a cluster.
    pub async fn get_all(&self, provider: &str, cluster: &str) -> Result<Vec<T>> {
        if provider.is_empty() || cluster.is_empty() {
            return Err(CoreError::not_found(
                "Cluster",
                context_cluster_name(provider, cluster),
            ));
        }
        find_all(self.docs.as_ref(), &Self::key(provider, cluster, ""), T::TAG).await
    }

    /// Delete an intent.
    #[instrument(skip(self), fields(kind = T::ENTITY))]
    pub async fn delete(&self, name: &str, provider: &str, cluster: &str) -> Result<()> {
        let _guard = self.clusters.lock_cluster(provider, cluster).await;
        self.clusters
            .check_cluster(provider, cluster, ClusterOperation::DeleteIntent)
            .await?;
        self.get(name, provider, cluster).await?;
        self.docs
            .remove(STORE, &Self::key(provider, cluster, name))
            .await?;
        info!(cluster_provider = %provider, cluster = %cluster, "Network intent deleted");
        Ok(())
    }
}
