// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! AppContext: typed composite-app operations over a runtime context.
//!
//! An AppContext describes one instantiation of a composite application:
//! the apps it contains, the clusters each app is placed on, and the
//! resources (YAML documents) to install on each cluster, plus ordering and
//! dependency instructions for the installer.
//!
//! ```ignore
//! let mut ac = AppContext::new(db);
//! let id = ac.init_app_context()?;
//! let root = ac.create_composite_app().await?;
//! let app = ac.add_app(&root, "network-intents").await?;
//! let cluster = ac.add_cluster(&app, "provA+clusterX").await?;
//! ac.add_resource(&cluster, "net1+Network", yaml).await?;
//! ```
//!
//! Adds are upserts: adding an existing path overwrites its value and keeps
//! its children. Nothing is cached; every read goes to the context database.

mod types;

pub use self::types::{
    AppContextStatus, CompositeAppMeta, InstructionLevel, InstructionType, StatusValue,
};

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::contextdb::ContextDb;
use crate::error::{CoreError, Result};
use crate::rtcontext::{Handle, RunTimeContext, Segment, validate_name};

/// Group membership of a cluster, stored at `<cluster>meta/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ClusterMeta {
    group: String,
}

/// Typed facade over a [`RunTimeContext`].
#[derive(Debug, Clone)]
pub struct AppContext {
    rtc: RunTimeContext,
}

impl AppContext {
    /// Create an AppContext over `db`. Call [`init_app_context`](Self::init_app_context)
    /// or [`load_app_context`](Self::load_app_context) before anything else.
    pub fn new(db: Arc<dyn ContextDb>) -> Self {
        Self {
            rtc: RunTimeContext::new(db),
        }
    }

    /// Assign a fresh context id.
    pub fn init_app_context(&mut self) -> Result<String> {
        self.rtc.init()
    }

    /// Reattach to an existing context and return its root handle.
    pub async fn load_app_context(&mut self, id: &str) -> Result<Handle> {
        if id.is_empty() {
            return Err(CoreError::validation("context id", "must not be empty"));
        }
        self.rtc.load(id).await
    }

    /// The bound context id.
    pub fn context_id(&self) -> Option<&str> {
        self.rtc.context_id()
    }

    // ========================================================================
    // Composite app
    // ========================================================================

    /// Write the root node.
    pub async fn create_composite_app(&self) -> Result<Handle> {
        self.rtc.create().await
    }

    /// Root handle, failing if the context does not exist.
    pub async fn get_composite_app_handle(&self) -> Result<Handle> {
        self.rtc.root().await
    }

    /// Attach the composite app metadata.
    pub async fn add_composite_app_meta(&self, meta: &CompositeAppMeta) -> Result<()> {
        let value = serde_json::to_value(meta).map_err(|e| CoreError::serialization("meta", e))?;
        self.rtc.add_meta(&value).await
    }

    /// Read the composite app metadata.
    pub async fn get_composite_app_meta(&self) -> Result<CompositeAppMeta> {
        let value = self.rtc.meta().await?;
        if !value.is_object() {
            return Err(CoreError::SerializationError {
                context: "meta".to_string(),
                details: "composite app meta is not a map".to_string(),
            });
        }
        serde_json::from_value(value).map_err(|e| CoreError::serialization("meta", e))
    }

    /// Delete the whole context. Fails if it was already deleted.
    pub async fn delete_composite_app(&self) -> Result<()> {
        let root = self.rtc.root().await?;
        let removed = self.rtc.delete_prefix(&root).await?;
        info!(context_id = %root.context_id(), removed, "AppContext deleted");
        Ok(())
    }

    // ========================================================================
    // Apps
    // ========================================================================

    /// Add an app under the root.
    pub async fn add_app(&self, handle: &Handle, name: &str) -> Result<Handle> {
        expect_root(handle)?;
        self.rtc.add_level(handle, "app", name).await
    }

    /// Delete an app and everything placed beneath it.
    pub async fn delete_app(&self, handle: &Handle) -> Result<()> {
        expect_level(handle, "app")?;
        self.rtc.delete_prefix(handle).await.map(|_| ())
    }

    /// Handle of app `name`.
    pub async fn get_app_handle(&self, name: &str) -> Result<Handle> {
        validate_name("app", name)?;
        let root = self.rtc.root().await?;
        self.existing(root.child("app", name), "app").await
    }

    /// Names of every app in the context.
    pub async fn get_app_names(&self) -> Result<Vec<String>> {
        let root = self.rtc.root().await?;
        self.child_names(&root, "app").await
    }

    // ========================================================================
    // Clusters
    // ========================================================================

    /// Add a cluster `"<provider>+<cluster>"` under an app.
    pub async fn add_cluster(&self, handle: &Handle, name: &str) -> Result<Handle> {
        expect_level(handle, "app")?;
        self.rtc.add_level(handle, "cluster", name).await
    }

    /// Delete a cluster and its resources.
    pub async fn delete_cluster(&self, handle: &Handle) -> Result<()> {
        expect_level(handle, "cluster")?;
        self.rtc.delete_prefix(handle).await.map(|_| ())
    }

    /// Handle of cluster `cluster` in app `app`.
    pub async fn get_cluster_handle(&self, app: &str, cluster: &str) -> Result<Handle> {
        validate_name("cluster", cluster)?;
        let app = self.get_app_handle(app).await?;
        self.existing(app.child("cluster", cluster), "cluster").await
    }

    /// Names of every cluster the app is placed on.
    pub async fn get_cluster_names(&self, app: &str) -> Result<Vec<String>> {
        let app = self.get_app_handle(app).await?;
        self.child_names(&app, "cluster").await
    }

    /// Record the group a cluster was selected through.
    pub async fn add_cluster_meta_grp(&self, handle: &Handle, group: &str) -> Result<Handle> {
        expect_level(handle, "cluster")?;
        if group.is_empty() {
            return Err(CoreError::validation("group", "must not be empty"));
        }
        let value = serde_json::to_value(ClusterMeta {
            group: group.to_string(),
        })?;
        self.rtc.add_one_level(handle, "meta", &value).await
    }

    /// Group recorded for a cluster.
    pub async fn get_cluster_meta_grp(&self, handle: &Handle) -> Result<String> {
        expect_level(handle, "cluster")?;
        let meta: ClusterMeta = self.rtc.value(&handle.leaf("meta")).await?;
        Ok(meta.group)
    }

    /// Map of group name to the clusters of `app` in that group.
    ///
    /// Clusters without a meta group are left out.
    pub async fn get_cluster_group_map(&self, app: &str) -> Result<BTreeMap<String, Vec<String>>> {
        let app_handle = self.get_app_handle(app).await?;
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for cluster in self.child_names(&app_handle, "cluster").await? {
            let handle = app_handle.child("cluster", &cluster);
            match self.get_cluster_meta_grp(&handle).await {
                Ok(group) => groups.entry(group).or_default().push(cluster),
                Err(CoreError::HandleNotFound { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(groups)
    }

    /// Handle of the `status` leaf of a cluster.
    pub async fn get_cluster_status_handle(&self, app: &str, cluster: &str) -> Result<Handle> {
        let handle = self.get_cluster_handle(app, cluster).await?;
        self.get_level_handle(&handle, "status").await
    }

    // ========================================================================
    // Resources
    // ========================================================================

    /// Add a resource `"<name>+<kind>"` holding a YAML document.
    pub async fn add_resource(&self, handle: &Handle, name: &str, value: &str) -> Result<Handle> {
        expect_level(handle, "cluster")?;
        self.rtc
            .add_resource(handle, name, &Value::String(value.to_string()))
            .await
    }

    /// Delete a resource and its status.
    pub async fn delete_resource(&self, handle: &Handle) -> Result<()> {
        expect_level(handle, "resource")?;
        self.rtc.delete_prefix(handle).await.map(|_| ())
    }

    /// Handle of `resource` on `cluster` in `app`.
    pub async fn get_resource_handle(
        &self,
        app: &str,
        cluster: &str,
        resource: &str,
    ) -> Result<Handle> {
        validate_name("resource", resource)?;
        let cluster = self.get_cluster_handle(app, cluster).await?;
        self.existing(cluster.child("resource", resource), "resource")
            .await
    }

    /// Names of every resource placed on `cluster` in `app`.
    pub async fn get_resource_names(&self, app: &str, cluster: &str) -> Result<Vec<String>> {
        let cluster = self.get_cluster_handle(app, cluster).await?;
        self.child_names(&cluster, "resource").await
    }

    /// Replace the document of a resource.
    pub async fn update_resource_value(&self, handle: &Handle, value: &str) -> Result<()> {
        expect_level(handle, "resource")?;
        self.existing(handle.clone(), "resource").await?;
        self.rtc
            .update_value(handle, &Value::String(value.to_string()))
            .await
    }

    // ========================================================================
    // Instructions
    // ========================================================================

    /// Attach an instruction. `value` must be a JSON document.
    ///
    /// App instructions attach to the root, resource instructions to a cluster
    /// and subresource instructions to a resource.
    pub async fn add_instruction(
        &self,
        handle: &Handle,
        level: InstructionLevel,
        kind: InstructionType,
        value: &str,
    ) -> Result<Handle> {
        match level {
            InstructionLevel::App => expect_root(handle)?,
            InstructionLevel::Resource => expect_level(handle, "cluster")?,
            InstructionLevel::Subresource => expect_level(handle, "resource")?,
        }
        serde_json::from_str::<Value>(value)
            .map_err(|e| CoreError::validation("instruction value", e.to_string()))?;
        let handle = self
            .rtc
            .add_instruction(
                handle,
                level.as_str(),
                kind.as_str(),
                &Value::String(value.to_string()),
            )
            .await?;
        debug!(handle = %handle, "Instruction added");
        Ok(handle)
    }

    /// Delete an instruction.
    pub async fn delete_instruction(&self, handle: &Handle) -> Result<()> {
        if !matches!(handle.last(), Some(Segment::Instruction { .. })) {
            return Err(CoreError::InvalidHandle {
                handle: handle.key(),
                reason: "not an instruction handle".to_string(),
            });
        }
        self.rtc.delete_pair(handle).await
    }

    /// App-level instruction of `kind`.
    pub async fn get_app_instruction(&self, kind: InstructionType) -> Result<String> {
        let root = self.rtc.root().await?;
        self.rtc
            .value(&root.instruction(InstructionLevel::App.as_str(), kind.as_str()))
            .await
    }

    /// Resource-level instruction of `kind` for `cluster` in `app`.
    pub async fn get_resource_instruction(
        &self,
        app: &str,
        cluster: &str,
        kind: InstructionType,
    ) -> Result<String> {
        let cluster = self.get_cluster_handle(app, cluster).await?;
        self.rtc
            .value(&cluster.instruction(InstructionLevel::Resource.as_str(), kind.as_str()))
            .await
    }

    /// Replace the value of an instruction.
    pub async fn update_instruction_value(&self, handle: &Handle, value: &str) -> Result<()> {
        if !matches!(handle.last(), Some(Segment::Instruction { .. })) {
            return Err(CoreError::InvalidHandle {
                handle: handle.key(),
                reason: "not an instruction handle".to_string(),
            });
        }
        serde_json::from_str::<Value>(value)
            .map_err(|e| CoreError::validation("instruction value", e.to_string()))?;
        self.existing(handle.clone(), "instruction").await?;
        self.rtc
            .update_value(handle, &Value::String(value.to_string()))
            .await
    }

    // ========================================================================
    // Generic access
    // ========================================================================

    /// Immediate `level` leaf under `handle`.
    pub async fn get_level_handle(&self, handle: &Handle, level: &str) -> Result<Handle> {
        validate_name("level", level)?;
        self.existing(handle.leaf(level), level).await
    }

    /// Attach a leaf `level` under `handle`, e.g. a `status`.
    pub async fn add_level_value(&self, handle: &Handle, level: &str, value: &Value) -> Result<Handle> {
        self.rtc.add_one_level(handle, level, value).await
    }

    /// Every handle at or beneath `handle`.
    pub async fn get_all_handles(&self, handle: &Handle) -> Result<Vec<Handle>> {
        self.rtc.handles(handle).await
    }

    /// Raw value at `handle`.
    pub async fn get_value(&self, handle: &Handle) -> Result<Value> {
        self.rtc.raw_value(handle).await
    }

    /// Decoded value at `handle`.
    pub async fn get_value_as<T: DeserializeOwned>(&self, handle: &Handle) -> Result<T> {
        self.rtc.value(handle).await
    }

    /// Overwrite the value at `handle`.
    pub async fn update_value(&self, handle: &Handle, value: &Value) -> Result<()> {
        self.rtc.update_value(handle, value).await
    }

    /// Overwrite a `status` leaf.
    pub async fn update_status_value(&self, handle: &Handle, value: &Value) -> Result<()> {
        match handle.last() {
            Some(Segment::Leaf(level)) if level == "status" => {
                self.rtc.update_value(handle, value).await
            }
            _ => Err(CoreError::InvalidHandle {
                handle: handle.key(),
                reason: "not a status handle".to_string(),
            }),
        }
    }

    /// Set the overall status of the context at `<root>status/`.
    pub async fn set_app_context_status(&self, status: StatusValue) -> Result<Handle> {
        let root = self.rtc.root().await?;
        let value = serde_json::to_value(AppContextStatus::new(status))?;
        self.rtc.add_one_level(&root, "status", &value).await
    }

    async fn existing(&self, handle: Handle, level: &str) -> Result<Handle> {
        if self.rtc.exists(&handle).await? {
            Ok(handle)
        } else {
            Err(CoreError::HandleNotFound {
                handle: handle.key(),
                level: level.to_string(),
            })
        }
    }

    async fn child_names(&self, parent: &Handle, level: &str) -> Result<Vec<String>> {
        let handles = self.rtc.handles(parent).await?;
        Ok(handles
            .iter()
            .filter_map(|h| match h.relative_to(parent) {
                Some([Segment::Level { level: l, name }]) if l == level => Some(name.clone()),
                _ => None,
            })
            .collect())
    }
}

fn expect_root(handle: &Handle) -> Result<()> {
    if handle.is_root() {
        Ok(())
    } else {
        Err(CoreError::InvalidHandle {
            handle: handle.key(),
            reason: "not a composite app handle".to_string(),
        })
    }
}

fn expect_level(handle: &Handle, level: &str) -> Result<()> {
    match handle.last() {
        Some(Segment::Level { level: l, .. }) if l == level => Ok(()),
        _ => Err(CoreError::InvalidHandle {
            handle: handle.key(),
            reason: format!("not a {} handle", level),
        }),
    }
}
