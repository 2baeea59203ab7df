// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock rsync client for testing.
//!
//! Records every call and answers according to a [`MockBehavior`] without
//! talking to a real synchronizer.

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{InstallAppResponse, RsyncClient, RsyncError, UninstallAppResponse};

/// How the mock answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockBehavior {
    /// Accept every request.
    #[default]
    Accept,
    /// Answer every request negatively.
    Reject,
    /// Fail every request at the transport level.
    Error,
    /// Report the connection as unavailable.
    Unavailable,
    /// Never answer.
    Hang,
}

/// Mock rsync client.
#[derive(Debug, Default)]
pub struct MockRsyncClient {
    behavior: Mutex<MockBehavior>,
    installed: Mutex<Vec<String>>,
    uninstalled: Mutex<Vec<String>>,
}

impl MockRsyncClient {
    /// A mock that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// A mock with the given behavior.
    pub fn with_behavior(behavior: MockBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            ..Self::default()
        }
    }

    /// Change how later requests are answered.
    pub async fn set_behavior(&self, behavior: MockBehavior) {
        *self.behavior.lock().await = behavior;
    }

    /// Context ids of accepted install requests, in call order.
    pub async fn installed(&self) -> Vec<String> {
        self.installed.lock().await.clone()
    }

    /// Context ids of accepted uninstall requests, in call order.
    pub async fn uninstalled(&self) -> Vec<String> {
        self.uninstalled.lock().await.clone()
    }

    async fn answer(&self, context_id: &str, log: &Mutex<Vec<String>>) -> Result<(bool, String), RsyncError> {
        let behavior = *self.behavior.lock().await;
        match behavior {
            MockBehavior::Accept => {
                log.lock().await.push(context_id.to_string());
                Ok((true, format!("Mock accepted {}", context_id)))
            }
            MockBehavior::Reject => Ok((false, "Mock rejection".to_string())),
            MockBehavior::Error => Err(RsyncError::Rpc("Mock transport failure".to_string())),
            MockBehavior::Unavailable => Err(RsyncError::Unavailable("mock".to_string())),
            MockBehavior::Hang => {
                std::future::pending::<()>().await;
                Err(RsyncError::Rpc("unreachable".to_string()))
            }
        }
    }
}

#[async_trait]
impl RsyncClient for MockRsyncClient {
    fn client_type(&self) -> &'static str {
        "mock"
    }

    async fn install_app(&self, context_id: &str) -> Result<InstallAppResponse, RsyncError> {
        let (installed, message) = self.answer(context_id, &self.installed).await?;
        Ok(InstallAppResponse { installed, message })
    }

    async fn uninstall_app(&self, context_id: &str) -> Result<UninstallAppResponse, RsyncError> {
        let (uninstalled, message) = self.answer(context_id, &self.uninstalled).await?;
        Ok(UninstallAppResponse {
            uninstalled,
            message,
        })
    }
}
