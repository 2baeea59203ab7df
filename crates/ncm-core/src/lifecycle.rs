// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cluster lifecycle gate.
//!
//! A cluster moves `Created -> Applied -> Terminated -> Applied -> ...`. While
//! its network intents are applied they are frozen: intents cannot be created
//! or deleted and the cluster cannot be removed until they are terminated.
//!
//! | Current    | create/delete intent | apply            | terminate   | delete cluster |
//! |------------|----------------------|------------------|-------------|----------------|
//! | Created    | ok                   | ok               | not applied | ok             |
//! | Applied    | must terminate first | already applied  | ok          | must terminate |
//! | Terminated | ok                   | ok (re-apply)    | not applied | ok             |
//!
//! Every other ledger state is rejected as invalid for a cluster.

use std::fmt;

use crate::error::{CoreError, Result};
use crate::state::{StateInfo, StateValue, get_current_state_from_state_info};

/// Lifecycle state of a cluster's network intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClusterState {
    /// Cluster registered, intents never applied or since removed.
    Created,
    /// Intents handed to the installer.
    Applied,
    /// Intents removed from the cluster.
    Terminated,
}

impl From<ClusterState> for StateValue {
    fn from(state: ClusterState) -> Self {
        match state {
            ClusterState::Created => StateValue::Created,
            ClusterState::Applied => StateValue::Applied,
            ClusterState::Terminated => StateValue::Terminated,
        }
    }
}

impl TryFrom<StateValue> for ClusterState {
    type Error = StateValue;

    fn try_from(value: StateValue) -> std::result::Result<Self, Self::Error> {
        match value {
            StateValue::Created => Ok(ClusterState::Created),
            StateValue::Applied => Ok(ClusterState::Applied),
            StateValue::Terminated => Ok(ClusterState::Terminated),
            other => Err(other),
        }
    }
}

/// Operation that must pass the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterOperation {
    /// Create or update a network or provider network.
    CreateIntent,
    /// Delete a network or provider network.
    DeleteIntent,
    /// Apply the network intents.
    Apply,
    /// Terminate the applied network intents.
    Terminate,
    /// Delete the cluster itself.
    DeleteCluster,
}

impl fmt::Display for ClusterOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ClusterOperation::CreateIntent => "creating",
            ClusterOperation::DeleteIntent => "deleting",
            ClusterOperation::Apply => "applying",
            ClusterOperation::Terminate => "terminating",
            ClusterOperation::DeleteCluster => "deleting the cluster",
        })
    }
}

/// Current lifecycle state of a cluster from its ledger.
pub fn cluster_state(cluster: &str, state_info: &StateInfo) -> Result<ClusterState> {
    let current = get_current_state_from_state_info(state_info)?;
    ClusterState::try_from(current).map_err(|state| CoreError::InvalidState {
        cluster: cluster.to_string(),
        state: state.to_string(),
    })
}

/// Check whether `operation` is allowed on `cluster` and return its current state.
pub fn check(cluster: &str, state_info: &StateInfo, operation: ClusterOperation) -> Result<ClusterState> {
    let state = cluster_state(cluster, state_info)?;
    let cluster = cluster.to_string();

    match (state, operation) {
        (ClusterState::Applied, ClusterOperation::Terminate) => Ok(state),
        (ClusterState::Applied, ClusterOperation::Apply) => Err(CoreError::AlreadyApplied { cluster }),
        (ClusterState::Applied, op) => Err(CoreError::MustTerminateFirst {
            cluster,
            operation: op.to_string(),
        }),
        (_, ClusterOperation::Terminate) => Err(CoreError::NotApplied { cluster }),
        (ClusterState::Created | ClusterState::Terminated, _) => Ok(state),
    }
}
