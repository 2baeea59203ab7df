// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Remote-sync (rsync) boundary.
//!
//! The resource synchronizer reads an AppContext and installs (or removes) its
//! resources on the remote clusters. The core only asks it to act on a
//! context id; transport is up to the [`RsyncClient`] implementation.
//!
//! Every call goes through [`RsyncInvoker`], which bounds it with a timeout
//! and lets the caller cancel it. A timed-out or cancelled call has an unknown
//! outcome and nothing is rolled back.

pub mod mock;

pub use self::mock::{MockBehavior, MockRsyncClient};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::CoreError;

/// Name of the resource synchronizer service.
pub const RSYNC_NAME: &str = "rsync";

/// Default timeout of a single rsync call.
pub const DEFAULT_RSYNC_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from rsync transports.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RsyncError {
    /// No connection to the service.
    #[error("Connection unavailable: {0}")]
    Unavailable(String),

    /// The call reached the service and failed.
    #[error("RPC failed: {0}")]
    Rpc(String),
}

/// Answer to an install request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallAppResponse {
    /// The AppContext was accepted for installation.
    pub installed: bool,
    /// Service message.
    pub message: String,
}

/// Answer to an uninstall request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UninstallAppResponse {
    /// The AppContext was accepted for removal.
    pub uninstalled: bool,
    /// Service message.
    pub message: String,
}

/// Client of the resource synchronizer.
#[async_trait]
pub trait RsyncClient: Send + Sync {
    /// Transport identifier (e.g. "grpc", "mock").
    fn client_type(&self) -> &'static str;

    /// Ask the synchronizer to install AppContext `context_id`.
    async fn install_app(&self, context_id: &str) -> Result<InstallAppResponse, RsyncError>;

    /// Ask the synchronizer to remove AppContext `context_id`.
    async fn uninstall_app(&self, context_id: &str) -> Result<UninstallAppResponse, RsyncError>;
}

/// Issues rsync calls with a timeout and cancellation.
#[derive(Clone)]
pub struct RsyncInvoker {
    client: Arc<dyn RsyncClient>,
    timeout: Duration,
}

impl std::fmt::Debug for RsyncInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsyncInvoker")
            .field("client", &self.client.client_type())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RsyncInvoker {
    /// Wrap `client` with a per-call `timeout`.
    pub fn new(client: Arc<dyn RsyncClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Per-call timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Install an AppContext. A negative answer is an [`CoreError::RsyncFailed`].
    pub async fn install(&self, context_id: &str, cancel: &CancellationToken) -> Result<(), CoreError> {
        let response = self
            .call("InstallApp", context_id, cancel, self.client.install_app(context_id))
            .await?;
        if !response.installed {
            return Err(CoreError::RsyncFailed {
                operation: "InstallApp".to_string(),
                context_id: context_id.to_string(),
                details: response.message,
            });
        }
        debug!(context_id = %context_id, message = %response.message, "AppContext install accepted");
        Ok(())
    }

    /// Remove an AppContext. A negative answer is an [`CoreError::RsyncFailed`].
    pub async fn uninstall(&self, context_id: &str, cancel: &CancellationToken) -> Result<(), CoreError> {
        let response = self
            .call("UninstallApp", context_id, cancel, self.client.uninstall_app(context_id))
            .await?;
        if !response.uninstalled {
            return Err(CoreError::RsyncFailed {
                operation: "UninstallApp".to_string(),
                context_id: context_id.to_string(),
                details: response.message,
            });
        }
        debug!(context_id = %context_id, message = %response.message, "AppContext uninstall accepted");
        Ok(())
    }

    async fn call<T>(
        &self,
        operation: &str,
        context_id: &str,
        cancel: &CancellationToken,
        fut: impl Future<Output = Result<T, RsyncError>>,
    ) -> Result<T, CoreError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(operation, context_id = %context_id, "rsync call cancelled, outcome unknown");
                Err(CoreError::Cancelled {
                    operation: operation.to_string(),
                })
            }
            result = tokio::time::timeout(self.timeout, fut) => match result {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(RsyncError::Unavailable(details))) => {
                    warn!(operation, details = %details, "rsync connection unavailable");
                    Err(CoreError::RsyncUnavailable {
                        service: RSYNC_NAME.to_string(),
                    })
                }
                Ok(Err(e)) => Err(CoreError::RsyncFailed {
                    operation: operation.to_string(),
                    context_id: context_id.to_string(),
                    details: e.to_string(),
                }),
                Err(_) => {
                    warn!(operation, context_id = %context_id, "rsync call timed out, outcome unknown");
                    Err(CoreError::RsyncTimeout {
                        operation: operation.to_string(),
                        context_id: context_id.to_string(),
                        timeout_ms: self.timeout.as_millis() as u64,
                    })
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_install_and_uninstall_recorded() {
        let mock = Arc::new(MockRsyncClient::new());
        let invoker = RsyncInvoker::new(mock.clone(), Duration::from_secs(1));
        let cancel = CancellationToken::new();

        invoker.install("42", &cancel).await.unwrap();
        invoker.uninstall("42", &cancel).await.unwrap();
        assert_eq!(mock.installed().await, vec!["42"]);
        assert_eq!(mock.uninstalled().await, vec!["42"]);
    }

    #[tokio::test]
    async fn test_negative_answer_is_failure() {
        let invoker = RsyncInvoker::new(
            Arc::new(MockRsyncClient::with_behavior(MockBehavior::Reject)),
            Duration::from_secs(1),
        );
        let err = invoker
            .install("42", &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "RSYNC_FAILED");
        assert!(err.to_string().contains("Mock rejection"));
    }

    #[tokio::test]
    async fn test_unavailable_maps_to_precondition() {
        let invoker = RsyncInvoker::new(
            Arc::new(MockRsyncClient::with_behavior(MockBehavior::Unavailable)),
            Duration::from_secs(1),
        );
        let err = invoker
            .uninstall("42", &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "RSYNC_UNAVAILABLE");
        assert!(err.is_precondition());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let invoker = RsyncInvoker::new(
            Arc::new(MockRsyncClient::with_behavior(MockBehavior::Hang)),
            Duration::from_secs(10),
        );
        let err = invoker
            .install("42", &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            CoreError::RsyncTimeout { timeout_ms, .. } => assert_eq!(timeout_ms, 10_000),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_cancel() {
        let invoker = RsyncInvoker::new(
            Arc::new(MockRsyncClient::with_behavior(MockBehavior::Hang)),
            Duration::from_secs(60),
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let err = invoker.install("42", &cancel).await.unwrap_err();
        assert_eq!(err.error_code(), "CANCELLED");
    }
}
