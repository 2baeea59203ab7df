// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Status query parameters.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Source of resource status data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    /// Walk the AppContext: what was sent and the installer's per-resource status.
    #[default]
    Rsync,
    /// Read the `ResourceBundleStatus` mirrored from the live cluster.
    Cluster,
}

impl FromStr for QueryType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rsync" => Ok(QueryType::Rsync),
            "cluster" => Ok(QueryType::Cluster),
            other => Err(CoreError::validation(
                "type",
                format!("invalid status type '{}', expected 'rsync' or 'cluster'", other),
            )),
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryType::Rsync => f.write_str("rsync"),
            QueryType::Cluster => f.write_str("cluster"),
        }
    }
}

/// How much of each resource to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Counts only, no app list.
    Summary,
    /// Name, GVK and status of each resource.
    #[default]
    All,
    /// Like `All`, plus the full object body.
    Detail,
}

impl FromStr for OutputFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "summary" => Ok(OutputFormat::Summary),
            "all" => Ok(OutputFormat::All),
            "detail" => Ok(OutputFormat::Detail),
            other => Err(CoreError::validation(
                "output",
                format!(
                    "invalid output format '{}', expected 'summary', 'all' or 'detail'",
                    other
                ),
            )),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Summary => f.write_str("summary"),
            OutputFormat::All => f.write_str("all"),
            OutputFormat::Detail => f.write_str("detail"),
        }
    }
}

/// Parameters of a status query. Empty filter lists match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusQuery {
    /// AppContext to report on; empty selects the last one in the ledger.
    pub instance: String,
    /// Data source.
    pub query_type: QueryType,
    /// Output detail.
    pub output: OutputFormat,
    /// App filter.
    pub apps: Vec<String>,
    /// Cluster filter, `"<provider>+<cluster>"`.
    pub clusters: Vec<String>,
    /// Resource name filter.
    pub resources: Vec<String>,
}

impl StatusQuery {
    /// Query with the given source and output and no filters.
    pub fn new(query_type: QueryType, output: OutputFormat) -> Self {
        Self {
            query_type,
            output,
            ..Default::default()
        }
    }

    /// Report on a specific AppContext.
    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = instance.into();
        self
    }

    /// Restrict to the given apps.
    pub fn with_apps(mut self, apps: Vec<String>) -> Self {
        self.apps = apps;
        self
    }

    /// Restrict to the given clusters.
    pub fn with_clusters(mut self, clusters: Vec<String>) -> Self {
        self.clusters = clusters;
        self
    }

    /// Restrict to the given resource names.
    pub fn with_resources(mut self, resources: Vec<String>) -> Self {
        self.resources = resources;
        self
    }
}

/// True if the filter is empty or contains `name`.
pub(crate) fn keep(name: &str, filter: &[String]) -> bool {
    filter.is_empty() || filter.iter().any(|f| f == name)
}
