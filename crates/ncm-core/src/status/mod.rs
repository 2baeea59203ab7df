// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Status aggregation over an AppContext.
//!
//! A status report walks the apps, clusters and resources of one AppContext
//! and collects a normalized view of each resource from one of two sources:
//!
//! - [`QueryType::Rsync`]: the AppContext itself. Each resource YAML is decoded
//!   for its name and GVK and paired with the per-resource status the
//!   installer wrote under `<resource>status/`.
//! - [`QueryType::Cluster`]: the `ResourceBundleStatus` the cluster monitor
//!   mirrored into `<cluster>status/`. Every object found counts as `Present`.
//!
//! A bad resource or cluster is logged and skipped. Only failing to resolve
//! the AppContext or its overall status fails the whole report.

mod bundle;
mod query;

pub use self::bundle::{Gvk, KubeObject, ObjectMeta, ResourceBundleStatus};
pub use self::query::{OutputFormat, QueryType, StatusQuery};

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use self::query::keep;
use crate::appcontext::{AppContext, AppContextStatus, StatusValue};
use crate::contextdb::ContextDb;
use crate::error::{CoreError, Result};
use crate::resourcestatus::{ResourceStatus as RsyncResourceStatus, RsyncStatus};
use crate::rtcontext::Handle;
use crate::state::{StateInfo, get_app_context_from_id, get_last_context_id_from_state_info};

/// Count key for objects found on a cluster.
pub const PRESENT: &str = "Present";

/// Status report for one AppContext.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResult {
    /// Name of the reported entity, filled in by the caller.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Ledger of the reported entity.
    #[serde(rename = "states")]
    pub state: StateInfo,
    /// Overall AppContext status.
    pub status: StatusValue,
    /// Resource counts per installer status.
    #[serde(rename = "rsync-status")]
    pub rsync_status: BTreeMap<String, usize>,
    /// Resource counts per cluster status.
    #[serde(rename = "cluster-status")]
    pub cluster_status: BTreeMap<String, usize>,
    /// Per-app breakdown, empty for summary output.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub apps: Vec<AppStatus>,
}

/// Resources of one app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppStatus {
    /// App name.
    pub name: String,
    /// Clusters with at least one reported resource.
    pub clusters: Vec<ClusterStatus>,
}

/// Resources of one app on one cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterStatus {
    /// Cluster provider.
    #[serde(rename = "cluster-provider")]
    pub cluster_provider: String,
    /// Cluster name.
    pub cluster: String,
    /// Reported resources.
    pub resources: Vec<ResourceStatus>,
}

/// One reported resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceStatus {
    /// Group, version and kind.
    #[serde(rename = "GVK")]
    pub gvk: Gvk,
    /// Object name.
    pub name: String,
    /// Full object body, detail output only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
    /// Installer status, `None` until the installer writes one.
    #[serde(
        rename = "rsync-status",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub rsync_status: Option<RsyncStatus>,
    /// Cluster status.
    #[serde(
        rename = "cluster-status",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub cluster_status: Option<String>,
}

/// True when `candidate` is a resource placed directly on `cluster`.
pub fn is_resource_handle(cluster: &Handle, candidate: &Handle) -> bool {
    candidate.is_resource_of(cluster)
}

/// Collect the resources of one cluster from the AppContext.
///
/// Resources whose installer status is malformed, or whose YAML cannot be
/// decoded, are logged and skipped. A resource without a status yet is
/// reported with no installer status and is not counted. Counts cover every
/// decoded resource, including those the name filter leaves out.
pub async fn get_app_context_resources(
    ac: &AppContext,
    cluster: &Handle,
    output: OutputFormat,
    resources: &[String],
    counts: &mut BTreeMap<String, usize>,
) -> Result<Vec<ResourceStatus>> {
    let handles = ac.get_all_handles(cluster).await?;
    let mut list = Vec::new();

    for handle in handles.iter().filter(|h| is_resource_handle(cluster, h)) {
        let yaml = match ac.get_value(handle).await {
            Ok(Value::String(yaml)) => yaml,
            Ok(other) => {
                info!(handle = %handle, value = %other, "Resource value is not a YAML document");
                continue;
            }
            Err(e) => {
                info!(handle = %handle, error = %e, "Error getting resource value");
                continue;
            }
        };

        let rsync_status = match ac.get_level_handle(handle, "status").await {
            Ok(sh) => match ac.get_value_as::<RsyncResourceStatus>(&sh).await {
                Ok(s) => Some(s.status),
                Err(e) => {
                    info!(handle = %sh, error = %e, "Invalid status data for resource");
                    continue;
                }
            },
            Err(CoreError::HandleNotFound { .. }) => {
                debug!(handle = %handle, "No status handle for resource");
                None
            }
            Err(e) => {
                info!(handle = %handle, error = %e, "Error getting resource status handle");
                continue;
            }
        };

        let object: KubeObject = match serde_yaml::from_str(&yaml) {
            Ok(object) => object,
            Err(e) => {
                warn!(handle = %handle, error = %e, "Error decoding resource YAML");
                continue;
            }
        };
        if let Some(status) = rsync_status {
            *counts.entry(status.as_str().to_string()).or_default() += 1;
        }
        if !keep(object.name(), resources) {
            continue;
        }

        list.push(ResourceStatus {
            gvk: object.gvk(),
            name: object.name().to_string(),
            detail: detail_of(&object, output),
            rsync_status,
            cluster_status: None,
        });
    }

    Ok(list)
}

/// Collect the resources of one cluster from a monitor snapshot.
pub fn get_cluster_resources(
    bundle: &ResourceBundleStatus,
    output: OutputFormat,
    resources: &[String],
    counts: &mut BTreeMap<String, usize>,
) -> Vec<ResourceStatus> {
    let scanned = bundle.objects().count();
    if scanned > 0 {
        *counts.entry(PRESENT.to_string()).or_default() += scanned;
    }
    bundle
        .objects()
        .filter(|o| keep(o.name(), resources))
        .map(|o| ResourceStatus {
            gvk: o.gvk(),
            name: o.name().to_string(),
            detail: detail_of(o, output),
            rsync_status: None,
            cluster_status: Some(PRESENT.to_string()),
        })
        .collect()
}

fn detail_of(object: &KubeObject, output: OutputFormat) -> Option<Value> {
    if output == OutputFormat::Detail {
        serde_json::to_value(object).ok()
    } else {
        None
    }
}

/// Build the status report of an entity from its ledger.
///
/// `apps` are the apps of the composite application, in report order. The
/// AppContext is `query.instance`, or the last one recorded in `state_info`.
#[instrument(skip(db, state_info, apps, query), fields(instance = %query.instance, query_type = %query.query_type))]
pub async fn prepare_status_result(
    db: Arc<dyn ContextDb>,
    state_info: &StateInfo,
    apps: &[String],
    query: &StatusQuery,
) -> Result<StatusResult> {
    let context_id = if query.instance.is_empty() {
        get_last_context_id_from_state_info(state_info)
    } else {
        query.instance.clone()
    };

    let ac = get_app_context_from_id(db, &context_id).await?;
    let root = ac.get_composite_app_handle().await?;
    let status_handle = ac.get_level_handle(&root, "status").await?;
    let ac_status: AppContextStatus = ac.get_value_as(&status_handle).await?;

    let mut rsync_counts = BTreeMap::new();
    let mut cluster_counts = BTreeMap::new();
    let mut app_statuses = Vec::new();

    for app in apps.iter().filter(|a| keep(a, &query.apps)) {
        let clusters = match ac.get_cluster_names(app).await {
            Ok(clusters) => clusters,
            Err(e) => {
                debug!(app = %app, error = %e, "No clusters for app");
                continue;
            }
        };

        let mut cluster_statuses = Vec::new();
        for cluster in clusters.iter().filter(|c| keep(c, &query.clusters)) {
            let resources = match query.query_type {
                QueryType::Cluster => {
                    cluster_mode_resources(&ac, app, cluster, query, &mut cluster_counts).await
                }
                QueryType::Rsync => {
                    rsync_mode_resources(&ac, app, cluster, query, &mut rsync_counts).await
                }
            };
            let Some(resources) = resources else {
                continue;
            };
            if resources.is_empty() {
                continue;
            }

            let Some((provider, name)) = cluster.split_once('+') else {
                info!(app = %app, cluster = %cluster, "Malformed cluster name");
                continue;
            };
            cluster_statuses.push(ClusterStatus {
                cluster_provider: provider.to_string(),
                cluster: name.to_string(),
                resources,
            });
        }

        if !cluster_statuses.is_empty() && query.output != OutputFormat::Summary {
            app_statuses.push(AppStatus {
                name: app.clone(),
                clusters: cluster_statuses,
            });
        }
    }

    debug!(
        context_id = %context_id,
        apps = app_statuses.len(),
        "Status result prepared"
    );

    Ok(StatusResult {
        name: String::new(),
        state: state_info.clone(),
        status: ac_status.status,
        rsync_status: rsync_counts,
        cluster_status: cluster_counts,
        apps: app_statuses,
    })
}

async fn rsync_mode_resources(
    ac: &AppContext,
    app: &str,
    cluster: &str,
    query: &StatusQuery,
    counts: &mut BTreeMap<String, usize>,
) -> Option<Vec<ResourceStatus>> {
    let handle = match ac.get_cluster_handle(app, cluster).await {
        Ok(handle) => handle,
        Err(e) => {
            info!(app = %app, cluster = %cluster, error = %e, "No handle for cluster");
            return None;
        }
    };
    match get_app_context_resources(ac, &handle, query.output, &query.resources, counts).await {
        Ok(list) => Some(list),
        Err(e) => {
            info!(app = %app, cluster = %cluster, error = %e, "Error gathering AppContext resources");
            None
        }
    }
}

async fn cluster_mode_resources(
    ac: &AppContext,
    app: &str,
    cluster: &str,
    query: &StatusQuery,
    counts: &mut BTreeMap<String, usize>,
) -> Option<Vec<ResourceStatus>> {
    let value = match ac.get_cluster_status_handle(app, cluster).await {
        Ok(handle) => ac.get_value(&handle).await,
        Err(e) => Err(e),
    };
    let value = match value {
        Ok(value) => value,
        Err(e) => {
            info!(app = %app, cluster = %cluster, error = %e, "No cluster status for cluster");
            return None;
        }
    };
    match ResourceBundleStatus::from_value(&value) {
        Ok(bundle) => Some(get_cluster_resources(
            &bundle,
            query.output,
            &query.resources,
            counts,
        )),
        Err(e) => {
            warn!(app = %app, cluster = %cluster, error = %e, "Error decoding cluster status");
            None
        }
    }
}
