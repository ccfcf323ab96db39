//! Monitor settings

use anyhow::Result;
use serde::Deserialize;

/// Tunables loaded from the environment (prefix `MONITOR_`).
///
/// The target container and output path come from the CLI; everything
/// here has a sensible default for a local engine.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Engine endpoint; falls back to DOCKER_HOST, then the local TCP
    /// default
    #[serde(default = "default_docker_host")]
    pub docker_host: String,

    /// Timeout for establishing engine connections, in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Attempts for a single row append before giving up
    #[serde(default = "default_write_retries")]
    pub write_retries: u32,

    /// Initial reconnect backoff in milliseconds
    #[serde(default = "default_reconnect_initial_backoff")]
    pub reconnect_initial_backoff_ms: u64,

    /// Reconnect backoff cap in milliseconds
    #[serde(default = "default_reconnect_max_backoff")]
    pub reconnect_max_backoff_ms: u64,

    /// Reconnect attempts before the monitor stops
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,
}

fn default_docker_host() -> String {
    std::env::var("DOCKER_HOST").unwrap_or_else(|_| monitor_lib::DEFAULT_ENDPOINT.to_string())
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_write_retries() -> u32 {
    3
}

fn default_reconnect_initial_backoff() -> u64 {
    1_000
}

fn default_reconnect_max_backoff() -> u64 {
    30_000
}

fn default_reconnect_attempts() -> u32 {
    5
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            docker_host: default_docker_host(),
            connect_timeout_secs: default_connect_timeout(),
            write_retries: default_write_retries(),
            reconnect_initial_backoff_ms: default_reconnect_initial_backoff(),
            reconnect_max_backoff_ms: default_reconnect_max_backoff(),
            reconnect_attempts: default_reconnect_attempts(),
        }
    }
}

impl Settings {
    /// Load configuration from the environment.
    pub fn load() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Environment::with_prefix("MONITOR"))
            .build()?;

        Ok(settings.try_deserialize().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.connect_timeout_secs, 10);
        assert_eq!(settings.write_retries, 3);
        assert_eq!(settings.reconnect_attempts, 5);
        assert!(settings.reconnect_initial_backoff_ms <= settings.reconnect_max_backoff_ms);
    }
}
