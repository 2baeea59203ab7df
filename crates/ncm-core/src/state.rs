// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Append-only state ledger.
//!
//! Every lifecycle-managed entity carries a [`StateInfo`]: the list of actions
//! taken on it, oldest first. The last action is the current state, and
//! actions that produced an AppContext carry its id. The ledger never enforces
//! transitions; see [`crate::lifecycle`] for the cluster policy.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::appcontext::{AppContext, AppContextStatus};
use crate::contextdb::ContextDb;
use crate::error::{CoreError, Result};

/// State recorded by a ledger action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateValue {
    /// Nothing recorded.
    Undefined,
    /// Entity created.
    Created,
    /// Entity approved for instantiation.
    Approved,
    /// Resources handed to the installer.
    Applied,
    /// Entity instantiated.
    Instantiated,
    /// Resources removed.
    Terminated,
}

impl StateValue {
    /// Wire name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            StateValue::Undefined => "Undefined",
            StateValue::Created => "Created",
            StateValue::Approved => "Approved",
            StateValue::Applied => "Applied",
            StateValue::Instantiated => "Instantiated",
            StateValue::Terminated => "Terminated",
        }
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEntry {
    /// State entered by this action.
    pub state: StateValue,
    /// AppContext created by the action, empty when none.
    #[serde(rename = "instance", default)]
    pub context_id: String,
    /// When the action was recorded.
    #[serde(rename = "time")]
    pub time_stamp: DateTime<Utc>,
}

/// Ordered history of actions, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StateInfo {
    /// Recorded actions.
    #[serde(default)]
    pub actions: Vec<ActionEntry>,
}

impl StateInfo {
    /// A ledger holding a single action.
    pub fn with_action(state: StateValue, context_id: impl Into<String>) -> Self {
        let mut info = Self::default();
        info.append(state, context_id);
        info
    }

    /// Record a new action stamped with the current time.
    pub fn append(&mut self, state: StateValue, context_id: impl Into<String>) {
        self.actions.push(ActionEntry {
            state,
            context_id: context_id.into(),
            time_stamp: Utc::now(),
        });
    }
}

/// Current state, i.e. the state of the last action.
pub fn get_current_state_from_state_info(s: &StateInfo) -> Result<StateValue> {
    s.actions
        .last()
        .map(|a| a.state)
        .ok_or(CoreError::NoStateInfo)
}

/// Context id of the last action, empty when there is none.
pub fn get_last_context_id_from_state_info(s: &StateInfo) -> String {
    s.actions
        .last()
        .map(|a| a.context_id.clone())
        .unwrap_or_default()
}

/// Every distinct non-empty context id in the ledger.
pub fn get_context_ids_from_state_info(s: &StateInfo) -> BTreeSet<String> {
    s.actions
        .iter()
        .filter(|a| !a.context_id.is_empty())
        .map(|a| a.context_id.clone())
        .collect()
}

/// Load the AppContext with id `id`.
pub async fn get_app_context_from_id(db: Arc<dyn ContextDb>, id: &str) -> Result<AppContext> {
    let mut ac = AppContext::new(db);
    ac.load_app_context(id).await?;
    Ok(ac)
}

/// Overall status recorded at the root of AppContext `id`.
pub async fn get_app_context_status(db: Arc<dyn ContextDb>, id: &str) -> Result<AppContextStatus> {
    let ac = get_app_context_from_id(db, id).await?;
    let root = ac.get_composite_app_handle().await?;
    let status = ac.get_level_handle(&root, "status").await?;
    ac.get_value_as(&status).await
}
