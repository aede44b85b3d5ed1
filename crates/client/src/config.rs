use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{error::Result, retry::BackoffPolicy};

const DEFAULT_CONFIG_PATH: &str = "config/client.toml";

/// Tuning of the sync engine. Every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Resource groups drained at the same time.
    pub max_concurrency: usize,
    pub bucket_capacity: u32,
    /// Tokens added per second; `0` disables the bucket.
    pub refill_per_sec: u32,
    pub min_dispatch_interval_ms: u64,
    pub request_timeout_ms: u64,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Retries after the first attempt before an operation is surfaced.
    pub max_retries: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            bucket_capacity: 10,
            refill_per_sec: 5,
            min_dispatch_interval_ms: 50,
            request_timeout_ms: 10_000,
            backoff_base_ms: 1_000,
            backoff_max_ms: 5 * 60 * 1_000,
            max_retries: 8,
        }
    }
}

impl SyncConfig {
    pub fn min_dispatch_interval(&self) -> Duration {
        Duration::from_millis(self.min_dispatch_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_millis(self.backoff_base_ms),
            max: Duration::from_millis(self.backoff_max_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub username: String,
    /// Never taken from the command line.
    pub password: String,
    /// Directory holding the queue and cache documents.
    pub state_dir: String,
    pub sync: SyncConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            username: String::new(),
            password: String::new(),
            state_dir: "state".to_string(),
            sync: SyncConfig::default(),
        }
    }
}

/// Reads the optional TOML file, then `BORSA_CLIENT_*` overrides
/// (`BORSA_CLIENT_SYNC__MAX_RETRIES=3` for nested keys).
pub fn load(path: Option<&str>) -> Result<ClientConfig> {
    let config_path = path.unwrap_or(DEFAULT_CONFIG_PATH);
    let settings = config::Config::builder()
        .add_source(config::File::with_name(config_path).required(false))
        .add_source(
            config::Environment::with_prefix("BORSA_CLIENT")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;
    Ok(settings.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent");
        let config = load(path.to_str()).unwrap();
        assert_eq!(config.sync, SyncConfig::default());
        assert_eq!(config.base_url, "http://127.0.0.1:3000");
    }

    #[test]
    fn file_overrides_nested_sync_settings() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "username = \"alice\"\n[sync]\nmax_retries = 2\nrequest_timeout_ms = 1500"
        )
        .unwrap();
        let config = load(file.path().to_str()).unwrap();
        assert_eq!(config.username, "alice");
        assert_eq!(config.sync.max_retries, 2);
        assert_eq!(config.sync.request_timeout(), Duration::from_millis(1500));
        assert_eq!(config.sync.max_concurrency, 4);
    }
}
