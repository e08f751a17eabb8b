//! Service configuration loaded from environment variables.
//!
//! The storage backend is chosen here and nowhere else: the rest of the
//! crate receives an already-built `ObjectStore` handle.

use std::env;
use std::path::PathBuf;

/// Default cap on identity keys listed in a notification.
pub const DEFAULT_MAX_SUMMARY_RECORDS: usize = 25;

/// Which storage backend to use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageMode {
    /// Directory tree rooted at the given path.
    Local { root: PathBuf },
    /// Cloud Storage bucket.
    Gcs { bucket: String },
}

/// Service configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend selection (`STORAGE_TYPE`)
    pub storage: StorageMode,
    /// GCP project ID
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    /// Pub/Sub topic for new-record notifications; log-only when unset
    pub notify_topic: Option<String>,
    /// Secret path segment for the event endpoints
    pub event_path_token: String,
    /// Cloud Storage emulator base URL (skips auth when set)
    pub storage_emulator_host: Option<String>,
    /// Pub/Sub emulator base URL (skips auth when set)
    pub pubsub_emulator_host: Option<String>,
    /// Cap on identity keys listed in a notification summary
    pub max_summary_records: usize,
}

impl Config {
    /// Config for tests: local storage under `root`, log-only notifications.
    pub fn test_default_with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageMode::Local { root: root.into() },
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            notify_topic: None,
            event_path_token: "test-event-token".to_string(),
            storage_emulator_host: None,
            pubsub_emulator_host: None,
            max_summary_records: DEFAULT_MAX_SUMMARY_RECORDS,
        }
    }

    /// Config for tests with a throwaway local root.
    pub fn test_default() -> Self {
        Self::test_default_with_root("local_testing")
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let storage = match env::var("STORAGE_TYPE")
            .unwrap_or_else(|_| "local".to_string())
            .to_lowercase()
            .as_str()
        {
            "local" => StorageMode::Local {
                root: PathBuf::from(
                    env::var("LOCAL_STORAGE_PATH").unwrap_or_else(|_| "local_testing".to_string()),
                ),
            },
            "gcs" => StorageMode::Gcs {
                bucket: env::var("GCS_BUCKET")
                    .map(|v| v.trim().to_string())
                    .map_err(|_| ConfigError::Missing("GCS_BUCKET"))?,
            },
            other => {
                return Err(ConfigError::Invalid {
                    name: "STORAGE_TYPE",
                    value: other.to_string(),
                })
            }
        };

        let max_summary_records = match env::var("MAX_SUMMARY_RECORDS") {
            Ok(v) => v.parse().map_err(|_| ConfigError::Invalid {
                name: "MAX_SUMMARY_RECORDS",
                value: v,
            })?,
            Err(_) => DEFAULT_MAX_SUMMARY_RECORDS,
        };

        Ok(Self {
            storage,
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            notify_topic: non_empty_var("NOTIFY_TOPIC"),
            event_path_token: env::var("EVENT_PATH_TOKEN")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("EVENT_PATH_TOKEN"))?,
            storage_emulator_host: non_empty_var("STORAGE_EMULATOR_HOST"),
            pubsub_emulator_host: non_empty_var("PUBSUB_EMULATOR_HOST"),
            max_summary_records,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}
