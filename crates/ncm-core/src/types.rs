// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Types shared by the domain clients.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Separator between provider and cluster, and between resource name and kind.
pub const SEPARATOR: &str = "+";

/// App that carries the network intents of a cluster.
pub const CONTEXT_CLUSTER_APP: &str = "network-intents";

/// Common metadata of every domain object.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Metadata {
    /// Object name, unique within its parent.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Free-form user data.
    #[serde(rename = "userData1", default)]
    pub user_data1: String,
    /// Free-form user data.
    #[serde(rename = "userData2", default)]
    pub user_data2: String,
}

impl Metadata {
    /// Metadata with just a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Reject names that cannot be used as document keys or context levels.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(CoreError::validation("metadata.name", "must not be empty"));
        }
        if self.name.contains(SEPARATOR) || self.name.contains('/') {
            return Err(CoreError::validation(
                "metadata.name",
                format!("'{}' must not contain '+' or '/'", self.name),
            ));
        }
        Ok(())
    }
}

/// AppContext cluster name `"<provider>+<cluster>"`.
pub fn context_cluster_name(provider: &str, cluster: &str) -> String {
    format!("{}{}{}", provider, SEPARATOR, cluster)
}
