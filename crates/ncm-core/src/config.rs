// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::time::Duration;

use crate::rsync::DEFAULT_RSYNC_TIMEOUT;
use crate::status::OutputFormat;

/// ncm-core configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// SQLite URL of the context database, in-memory when unset
    pub context_db_url: Option<String>,
    /// SQLite URL of the document store, in-memory when unset
    pub document_db_url: Option<String>,
    /// Timeout of a single rsync call
    pub rsync_timeout: Duration,
    /// Output format used when a status query does not name one
    pub status_default_output: OutputFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            context_db_url: None,
            document_db_url: None,
            rsync_timeout: DEFAULT_RSYNC_TIMEOUT,
            status_default_output: OutputFormat::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional (with defaults):
    /// - `NCM_CONTEXT_DB_URL`: SQLite URL of the context database (default: in-memory)
    /// - `NCM_DOCUMENT_DB_URL`: SQLite URL of the document store (default: in-memory)
    /// - `NCM_RSYNC_TIMEOUT_SECS`: rsync call timeout in seconds (default: 10)
    /// - `NCM_STATUS_DEFAULT_OUTPUT`: `summary`, `all` or `detail` (default: all)
    pub fn from_env() -> Result<Self, ConfigError> {
        let context_db_url = non_empty_var("NCM_CONTEXT_DB_URL");
        let document_db_url = non_empty_var("NCM_DOCUMENT_DB_URL");

        let rsync_timeout_secs: u64 = std::env::var("NCM_RSYNC_TIMEOUT_SECS")
            .unwrap_or_else(|_| DEFAULT_RSYNC_TIMEOUT.as_secs().to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("NCM_RSYNC_TIMEOUT_SECS", "must be a positive integer")
            })?;
        if rsync_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "NCM_RSYNC_TIMEOUT_SECS",
                "must be a positive integer",
            ));
        }

        let status_default_output: OutputFormat = std::env::var("NCM_STATUS_DEFAULT_OUTPUT")
            .unwrap_or_else(|_| OutputFormat::default().to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid(
                    "NCM_STATUS_DEFAULT_OUTPUT",
                    "must be one of summary, all, detail",
                )
            })?;

        Ok(Self {
            context_db_url,
            document_db_url,
            rsync_timeout: Duration::from_secs(rsync_timeout_secs),
            status_default_output,
        })
    }

    /// Read a `.env` file if present, then load from the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_env()
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: [&str; 4] = [
        "NCM_CONTEXT_DB_URL",
        "NCM_DOCUMENT_DB_URL",
        "NCM_RSYNC_TIMEOUT_SECS",
        "NCM_STATUS_DEFAULT_OUTPUT",
    ];

    /// Sets env vars for a test and restores them afterwards
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn clean() -> Self {
            let mut guard = Self { vars: Vec::new() };
            for key in VARS {
                guard.remove(key);
            }
            guard
        }

        fn set(&mut self, key: &str, value: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::remove_var(key) };
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    #[test]
    fn test_config_from_env_with_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = EnvGuard::clean();

        let config = Config::from_env().unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.rsync_timeout, Duration::from_secs(10));
        assert_eq!(config.status_default_output, OutputFormat::All);
    }

    #[test]
    fn test_config_from_env_all_custom() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        guard.set("NCM_CONTEXT_DB_URL", "sqlite:ctx.db");
        guard.set("NCM_DOCUMENT_DB_URL", "sqlite:docs.db");
        guard.set("NCM_RSYNC_TIMEOUT_SECS", "30");
        guard.set("NCM_STATUS_DEFAULT_OUTPUT", "summary");

        let config = Config::from_env().unwrap();
        assert_eq!(config.context_db_url.as_deref(), Some("sqlite:ctx.db"));
        assert_eq!(config.document_db_url.as_deref(), Some("sqlite:docs.db"));
        assert_eq!(config.rsync_timeout, Duration::from_secs(30));
        assert_eq!(config.status_default_output, OutputFormat::Summary);
    }

    #[test]
    fn test_config_empty_url_means_memory() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        guard.set("NCM_CONTEXT_DB_URL", "");
        assert_eq!(Config::from_env().unwrap().context_db_url, None);
    }

    #[test]
    fn test_config_invalid_timeout() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        for bad in ["abc", "-5", "0"] {
            guard.set("NCM_RSYNC_TIMEOUT_SECS", bad);
            let err = Config::from_env().unwrap_err();
            assert!(matches!(err, ConfigError::Invalid("NCM_RSYNC_TIMEOUT_SECS", _)));
        }
    }

    #[test]
    fn test_config_invalid_output() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        guard.set("NCM_STATUS_DEFAULT_OUTPUT", "verbose");
        let err = Config::from_env().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid value for NCM_STATUS_DEFAULT_OUTPUT: must be one of summary, all, detail"
        );
    }
}
