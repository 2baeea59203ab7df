// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cluster-side status snapshot written by the cluster monitor.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Group, version and kind of a Kubernetes object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Gvk {
    /// API group, empty for the core group.
    pub group: String,
    /// API version.
    pub version: String,
    /// Object kind.
    pub kind: String,
}

impl Gvk {
    /// Split an `apiVersion` (`apps/v1`, `v1`) and pair it with `kind`.
    pub fn from_api_version(api_version: &str, kind: &str) -> Self {
        let (group, version) = match api_version.rsplit_once('/') {
            Some((group, version)) => (group, version),
            None => ("", api_version),
        };
        Self {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
        }
    }
}

/// Object metadata; only the name is interpreted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Object name.
    #[serde(default)]
    pub name: String,
    /// Remaining metadata fields.
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// A Kubernetes object of any kind.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubeObject {
    /// `apiVersion` of the object.
    #[serde(default)]
    pub api_version: String,
    /// `kind` of the object.
    #[serde(default)]
    pub kind: String,
    /// Object metadata.
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// `spec`, `status`, `data` and everything else.
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl KubeObject {
    /// Object name.
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Group, version and kind of the object.
    pub fn gvk(&self) -> Gvk {
        Gvk::from_api_version(&self.api_version, &self.kind)
    }
}

/// Snapshot of the objects a cluster monitor found for one resource bundle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceBundleStatus {
    /// All tracked objects are ready.
    #[serde(default)]
    pub ready: bool,
    /// Number of tracked objects.
    #[serde(default)]
    pub resource_count: i32,
    /// Pods.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub pod_statuses: Vec<KubeObject>,
    /// Services.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub service_statuses: Vec<KubeObject>,
    /// ConfigMaps.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub config_map_statuses: Vec<KubeObject>,
    /// Deployments.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub deployment_statuses: Vec<KubeObject>,
    /// Secrets.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub secret_statuses: Vec<KubeObject>,
    /// DaemonSets.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub daemon_set_statuses: Vec<KubeObject>,
    /// Ingresses.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub ingress_statuses: Vec<KubeObject>,
    /// Jobs.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub job_statuses: Vec<KubeObject>,
    /// StatefulSets.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub stateful_set_statuses: Vec<KubeObject>,
    /// Certificate signing requests.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub csr_statuses: Vec<KubeObject>,
}

impl ResourceBundleStatus {
    /// Every object in the snapshot, grouped by kind in a fixed order.
    pub fn objects(&self) -> impl Iterator<Item = &KubeObject> {
        self.pod_statuses
            .iter()
            .chain(&self.service_statuses)
            .chain(&self.deployment_statuses)
            .chain(&self.config_map_statuses)
            .chain(&self.secret_statuses)
            .chain(&self.daemon_set_statuses)
            .chain(&self.ingress_statuses)
            .chain(&self.job_statuses)
            .chain(&self.stateful_set_statuses)
            .chain(&self.csr_statuses)
    }

    /// Decode a snapshot stored either as a JSON object or as a JSON-encoded string.
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        match value {
            Value::String(raw) => serde_json::from_str(raw),
            other => Self::deserialize(other),
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<KubeObject>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<KubeObject>>::deserialize(deserializer)?.unwrap_or_default())
}
