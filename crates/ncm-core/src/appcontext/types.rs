// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Value types stored inside an AppContext.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Identifying metadata attached once at `<root>meta/`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CompositeAppMeta {
    /// Project the composite app belongs to.
    pub project: String,
    /// Composite app name.
    pub composite_app: String,
    /// Composite app version.
    pub version: String,
    /// Release name.
    pub release: String,
    /// Deployment intent group that produced the context.
    pub deployment_intent_group: String,
}

/// Overall status of an AppContext, stored at `<root>status/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusValue {
    /// Install RPC issued, not yet confirmed.
    Instantiating,
    /// All resources installed.
    Instantiated,
    /// Uninstall RPC issued, not yet confirmed.
    Terminating,
    /// All resources removed.
    Terminated,
    /// Installation failed.
    InstantiateFailed,
    /// Removal failed.
    TerminateFailed,
}

impl StatusValue {
    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusValue::Instantiating => "Instantiating",
            StatusValue::Instantiated => "Instantiated",
            StatusValue::Terminating => "Terminating",
            StatusValue::Terminated => "Terminated",
            StatusValue::InstantiateFailed => "InstantiateFailed",
            StatusValue::TerminateFailed => "TerminateFailed",
        }
    }

    /// True once an uninstall has run to completion, successfully or not.
    pub fn is_terminal_termination(&self) -> bool {
        matches!(self, StatusValue::Terminated | StatusValue::TerminateFailed)
    }
}

impl fmt::Display for StatusValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status document of an AppContext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppContextStatus {
    /// Current status.
    #[serde(rename = "Status")]
    pub status: StatusValue,
}

impl AppContextStatus {
    /// Wrap a status value.
    pub fn new(status: StatusValue) -> Self {
        Self { status }
    }
}

/// Level an instruction applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstructionLevel {
    /// Ordering of apps inside the composite app; lives under the root.
    App,
    /// Ordering of resources inside a cluster; lives under a cluster.
    Resource,
    /// Ordering of sub-resources inside a resource; lives under a resource.
    Subresource,
}

impl InstructionLevel {
    /// Key token of the level.
    pub fn as_str(&self) -> &'static str {
        match self {
            InstructionLevel::App => "app",
            InstructionLevel::Resource => "resource",
            InstructionLevel::Subresource => "subresource",
        }
    }
}

impl FromStr for InstructionLevel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "app" => Ok(InstructionLevel::App),
            "resource" => Ok(InstructionLevel::Resource),
            "subresource" => Ok(InstructionLevel::Subresource),
            other => Err(CoreError::validation(
                "instruction level",
                format!("'{}' is not a valid app context instruction level", other),
            )),
        }
    }
}

impl fmt::Display for InstructionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstructionType {
    /// Install order.
    Order,
    /// Readiness dependencies.
    Dependency,
}

impl InstructionType {
    /// Key token of the instruction type.
    pub fn as_str(&self) -> &'static str {
        match self {
            InstructionType::Order => "order",
            InstructionType::Dependency => "dependency",
        }
    }
}

impl FromStr for InstructionType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "order" => Ok(InstructionType::Order),
            "dependency" => Ok(InstructionType::Dependency),
            other => Err(CoreError::validation(
                "instruction type",
                format!("'{}' is not a valid app context instruction type", other),
            )),
        }
    }
}

impl fmt::Display for InstructionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_wire_format() {
        let status = AppContextStatus::new(StatusValue::InstantiateFailed);
        assert_eq!(
            serde_json::to_value(status).unwrap(),
            json!({"Status": "InstantiateFailed"})
        );
        let back: AppContextStatus =
            serde_json::from_value(json!({"Status": "Terminated"})).unwrap();
        assert!(back.status.is_terminal_termination());
        assert!(serde_json::from_value::<AppContextStatus>(json!({"Status": "Bogus"})).is_err());
    }

    #[test]
    fn test_meta_wire_format() {
        let meta = CompositeAppMeta {
            project: "p".to_string(),
            composite_app: "ca".to_string(),
            version: "v1".to_string(),
            release: "r".to_string(),
            deployment_intent_group: "dig".to_string(),
        };
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["CompositeApp"], "ca");
        assert_eq!(value["DeploymentIntentGroup"], "dig");
    }

    #[test]
    fn test_instruction_parsing() {
        assert_eq!(
            "order".parse::<InstructionType>().unwrap(),
            InstructionType::Order
        );
        assert_eq!(
            "subresource".parse::<InstructionLevel>().unwrap(),
            InstructionLevel::Subresource
        );
        assert_eq!(
            "cluster".parse::<InstructionLevel>().unwrap_err().error_code(),
            "VALIDATION_ERROR"
        );
        assert!("sequence".parse::<InstructionType>().is_err());
    }
}
