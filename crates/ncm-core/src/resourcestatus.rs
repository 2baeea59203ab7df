// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-resource status written by the remote-sync service.
//!
//! The document lives at `<resource>status/`. The core only reads it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Progress of one resource through the installer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RsyncStatus {
    /// Queued, not yet sent.
    Pending,
    /// Installed on the cluster.
    Applied,
    /// Installation failed.
    Failed,
    /// Installation failed and is being retried.
    Retrying,
    /// Removed from the cluster.
    Deleted,
}

impl RsyncStatus {
    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            RsyncStatus::Pending => "Pending",
            RsyncStatus::Applied => "Applied",
            RsyncStatus::Failed => "Failed",
            RsyncStatus::Retrying => "Retrying",
            RsyncStatus::Deleted => "Deleted",
        }
    }
}

impl fmt::Display for RsyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status document of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceStatus {
    /// Current installer status.
    #[serde(rename = "Status")]
    pub status: RsyncStatus,
}
