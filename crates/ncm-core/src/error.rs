// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for ncm-core.
//!
//! Provides a unified error type with stable error codes so that callers
//! (REST layers, monitoring) can distinguish error kinds without string matching.

use std::fmt;

/// Result type using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur while manipulating AppContexts, ledgers and clusters.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum CoreError {
    /// A domain entity (cluster provider, cluster, network, ...) was not found.
    NotFound {
        /// Kind of entity, e.g. "Cluster".
        entity: String,
        /// Key of the entity that was not found.
        key: String,
    },

    /// A domain entity already exists.
    AlreadyExists {
        /// Kind of entity.
        entity: String,
        /// Key of the entity that already exists.
        key: String,
    },

    /// The cluster is in a state that is never valid for network-intent operations.
    InvalidState {
        /// Cluster key ("provider+cluster").
        cluster: String,
        /// The offending state value.
        state: String,
    },

    /// The cluster's network intents are applied and must be terminated first.
    MustTerminateFirst {
        /// Cluster key.
        cluster: String,
        /// The attempted operation (e.g. "creating", "deleting").
        operation: String,
    },

    /// Network intents have already been applied to the cluster.
    AlreadyApplied {
        /// Cluster key.
        cluster: String,
    },

    /// Network intents are not applied to the cluster (no live AppContext).
    NotApplied {
        /// Cluster key.
        cluster: String,
    },

    /// A previous AppContext for the cluster has not finished terminating.
    TerminationPending {
        /// Cluster key.
        cluster: String,
        /// The AppContext still in progress.
        context_id: String,
    },

    /// The cluster ledger changed between the gate check and the write.
    StateConflict {
        /// Cluster key.
        cluster: String,
    },

    /// A state ledger holds no actions.
    NoStateInfo,

    /// A handle lookup found nothing at the requested path.
    HandleNotFound {
        /// The handle or prefix that was searched.
        handle: String,
        /// The level name being looked up.
        level: String,
    },

    /// A handle or context id is malformed or belongs to another context.
    InvalidHandle {
        /// The handle string.
        handle: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Input validation failed.
    ValidationError {
        /// The field that failed validation.
        field: String,
        /// The validation error message.
        message: String,
    },

    /// Backing store operation failed.
    StoreError {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },

    /// A stored value could not be encoded or decoded.
    SerializationError {
        /// What was being (de)serialized.
        context: String,
        /// Error details.
        details: String,
    },

    /// No connection to the remote-sync service is available.
    RsyncUnavailable {
        /// Name of the service.
        service: String,
    },

    /// The remote-sync service returned an error or a negative response.
    RsyncFailed {
        /// The RPC that failed.
        operation: String,
        /// The AppContext the RPC was about.
        context_id: String,
        /// Error details.
        details: String,
    },

    /// The remote-sync RPC did not answer in time. The outcome is unknown.
    RsyncTimeout {
        /// The RPC that timed out.
        operation: String,
        /// The AppContext the RPC was about.
        context_id: String,
        /// The timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// The operation was cancelled by the caller.
    Cancelled {
        /// The cancelled operation.
        operation: String,
    },

    /// The primary operation failed and the best-effort AppContext cleanup failed too.
    CleanupRequired {
        /// The orphaned AppContext.
        context_id: String,
        /// The error that triggered the cleanup.
        primary: Box<CoreError>,
        /// Why the cleanup failed.
        cleanup: String,
    },
}

impl CoreError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::AlreadyExists { .. } => "ALREADY_EXISTS",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::MustTerminateFirst { .. } => "MUST_TERMINATE_FIRST",
            Self::AlreadyApplied { .. } => "ALREADY_APPLIED",
            Self::NotApplied { .. } => "NOT_APPLIED",
            Self::TerminationPending { .. } => "TERMINATION_PENDING",
            Self::StateConflict { .. } => "STATE_CONFLICT",
            Self::NoStateInfo => "NO_STATE_INFO",
            Self::HandleNotFound { .. } => "HANDLE_NOT_FOUND",
            Self::InvalidHandle { .. } => "INVALID_HANDLE",
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::StoreError { .. } => "STORE_ERROR",
            Self::SerializationError { .. } => "SERIALIZATION_ERROR",
            Self::RsyncUnavailable { .. } => "RSYNC_UNAVAILABLE",
            Self::RsyncFailed { .. } => "RSYNC_FAILED",
            Self::RsyncTimeout { .. } => "RSYNC_TIMEOUT",
            Self::Cancelled { .. } => "CANCELLED",
            Self::CleanupRequired { .. } => "CLEANUP_REQUIRED",
        }
    }

    /// True for errors caused by the caller's request or the entity's current
    /// state rather than by infrastructure.
    pub fn is_precondition(&self) -> bool {
        match self {
            Self::NotFound { .. }
            | Self::AlreadyExists { .. }
            | Self::InvalidState { .. }
            | Self::MustTerminateFirst { .. }
            | Self::AlreadyApplied { .. }
            | Self::NotApplied { .. }
            | Self::TerminationPending { .. }
            | Self::StateConflict { .. }
            | Self::ValidationError { .. }
            | Self::InvalidHandle { .. }
            | Self::RsyncUnavailable { .. } => true,
            Self::CleanupRequired { primary, .. } => primary.is_precondition(),
            _ => false,
        }
    }

    /// The error that triggered a failed cleanup, or `self` for every other kind.
    pub fn primary(&self) -> &CoreError {
        match self {
            Self::CleanupRequired { primary, .. } => primary.primary(),
            other => other,
        }
    }

    pub(crate) fn store(operation: impl Into<String>, err: impl fmt::Display) -> Self {
        Self::StoreError {
            operation: operation.into(),
            details: err.to_string(),
        }
    }

    pub(crate) fn serialization(context: impl Into<String>, err: impl fmt::Display) -> Self {
        Self::SerializationError {
            context: context.into(),
            details: err.to_string(),
        }
    }

    pub(crate) fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }

    pub(crate) fn not_found(entity: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { entity, key } => write!(f, "{} '{}' not found", entity, key),
            Self::AlreadyExists { entity, key } => {
                write!(f, "{} '{}' already exists", entity, key)
            }
            Self::InvalidState { cluster, state } => {
                write!(f, "Cluster is in an invalid state: {} {}", cluster, state)
            }
            Self::MustTerminateFirst { cluster, operation } => write!(
                f,
                "Existing cluster network intents must be terminated before {}: {}",
                operation, cluster
            ),
            Self::AlreadyApplied { cluster } => write!(
                f,
                "Cluster network intents have already been applied: {}",
                cluster
            ),
            Self::NotApplied { cluster } => write!(
                f,
                "Cluster network intents have not been applied: {}",
                cluster
            ),
            Self::TerminationPending {
                cluster,
                context_id,
            } => write!(
                f,
                "Network intents for cluster have not completed terminating: {} (AppContext '{}')",
                cluster, context_id
            ),
            Self::StateConflict { cluster } => {
                write!(f, "Cluster state changed concurrently: {}", cluster)
            }
            Self::NoStateInfo => write!(f, "No state information"),
            Self::HandleNotFound { handle, level } => write!(
                f,
                "No handle was found for level '{}' under '{}'",
                level, handle
            ),
            Self::InvalidHandle { handle, reason } => {
                write!(f, "Invalid run time context handle '{}': {}", handle, reason)
            }
            Self::ValidationError { field, message } => {
                write!(f, "Validation error for '{}': {}", field, message)
            }
            Self::StoreError { operation, details } => {
                write!(f, "Store error during '{}': {}", operation, details)
            }
            Self::SerializationError { context, details } => {
                write!(f, "Invalid data for '{}': {}", context, details)
            }
            Self::RsyncUnavailable { service } => {
                write!(f, "No connection to remote sync service '{}'", service)
            }
            Self::RsyncFailed {
                operation,
                context_id,
                details,
            } => write!(
                f,
                "{} failed for AppContext '{}': {}",
                operation, context_id, details
            ),
            Self::RsyncTimeout {
                operation,
                context_id,
                timeout_ms,
            } => write!(
                f,
                "{} for AppContext '{}' timed out after {}ms, outcome unknown",
                operation, context_id, timeout_ms
            ),
            Self::Cancelled { operation } => write!(f, "{} was cancelled", operation),
            Self::CleanupRequired {
                context_id,
                primary,
                cleanup,
            } => write!(
                f,
                "{} (manual cleanup of AppContext '{}' required: {})",
                primary, context_id, cleanup
            ),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::StoreError {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError {
            context: "json".to_string(),
            details: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_distinct() {
        let errors = vec![
            CoreError::not_found("Cluster", "p+c"),
            CoreError::AlreadyExists {
                entity: "Cluster".to_string(),
                key: "p+c".to_string(),
            },
            CoreError::InvalidState {
                cluster: "p+c".to_string(),
                state: "Approved".to_string(),
            },
            CoreError::MustTerminateFirst {
                cluster: "p+c".to_string(),
                operation: "creating".to_string(),
            },
            CoreError::AlreadyApplied {
                cluster: "p+c".to_string(),
            },
            CoreError::NotApplied {
                cluster: "p+c".to_string(),
            },
            CoreError::StateConflict {
                cluster: "p+c".to_string(),
            },
            CoreError::NoStateInfo,
            CoreError::validation("level", "bad"),
            CoreError::store("put", "disk full"),
            CoreError::RsyncTimeout {
                operation: "InstallApp".to_string(),
                context_id: "1".to_string(),
                timeout_ms: 10,
            },
        ];

        let mut codes: Vec<&str> = errors.iter().map(|e| e.error_code()).collect();
        let total = codes.len();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), total);
    }

    #[test]
    fn test_core_error_display() {
        let err = CoreError::AlreadyApplied {
            cluster: "provA+clusterX".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Cluster network intents have already been applied: provA+clusterX"
        );

        let err = CoreError::InvalidState {
            cluster: "provA+clusterX".to_string(),
            state: "Instantiated".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Cluster is in an invalid state: provA+clusterX Instantiated"
        );

        let err = CoreError::NoStateInfo;
        assert_eq!(err.to_string(), "No state information");
    }

    #[test]
    fn test_cleanup_required_keeps_primary_error() {
        let primary = CoreError::store("put", "connection refused");
        let err = CoreError::CleanupRequired {
            context_id: "42".to_string(),
            primary: Box::new(primary),
            cleanup: "context gone".to_string(),
        };

        assert_eq!(err.error_code(), "CLEANUP_REQUIRED");
        assert_eq!(err.primary().error_code(), "STORE_ERROR");
        assert!(err.to_string().starts_with("Store error during 'put'"));
        assert!(!err.is_precondition());
    }

    #[test]
    fn test_precondition_classification() {
        assert!(
            CoreError::AlreadyApplied {
                cluster: "x".to_string()
            }
            .is_precondition()
        );
        assert!(!CoreError::store("get", "io").is_precondition());
        assert!(
            !CoreError::Cancelled {
                operation: "InstallApp".to_string()
            }
            .is_precondition()
        );
    }
}
