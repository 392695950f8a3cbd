// Client-side defaults plus env and YAML override helpers.
use anyhow::{Context, Result};
use serde::Deserialize;
use sqlmon_wire::setup::SetupParams;
use std::fs;
use std::time::Duration;

/// Reconnect attempts after an established connection is lost.
pub(crate) const DEFAULT_RECONNECT_MAX_ATTEMPTS: u32 = 5;
/// Fixed delay between reconnect attempts.
pub(crate) const DEFAULT_RECONNECT_DELAY_MS: u64 = 3000;
/// Receive-buffer size per subscription stream.
///
/// The client signals unbounded demand to the server, so this bounded buffer
/// is the only thing standing between a slow consumer and unbounded memory
/// growth. Override with `SQLMON_SUB_QUEUE_CAPACITY`.
pub(crate) const DEFAULT_SUB_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub setup: SetupParams,
    pub reconnect_max_attempts: u32,
    pub reconnect_delay: Duration,
    pub sub_queue_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            setup: SetupParams::default(),
            reconnect_max_attempts: DEFAULT_RECONNECT_MAX_ATTEMPTS,
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            sub_queue_capacity: DEFAULT_SUB_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
struct ClientConfigOverride {
    reconnect_max_attempts: Option<u32>,
    reconnect_delay_ms: Option<u64>,
    sub_queue_capacity: Option<usize>,
    keep_alive_ms: Option<u64>,
    lifetime_ms: Option<u64>,
}

impl ClientConfig {
    /// Defaults, then `SQLMON_*` env overrides, then an optional YAML file
    /// (`config_path` argument or `SQLMON_CLIENT_CONFIG`).
    pub fn from_env_or_yaml(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::from_env();
        let override_path = config_path
            .map(|value| value.to_string())
            .or_else(|| std::env::var("SQLMON_CLIENT_CONFIG").ok());
        if let Some(path) = override_path.as_deref() {
            let contents =
                fs::read_to_string(path).with_context(|| format!("read client config: {path}"))?;
            let override_cfg: ClientConfigOverride =
                serde_yaml::from_str(&contents).context("parse client config yaml")?;
            override_cfg.apply(&mut config);
        }
        Ok(config)
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(value) = read_u32_env("SQLMON_RECONNECT_MAX_ATTEMPTS") {
            config.reconnect_max_attempts = value;
        }
        if let Some(value) = read_u64_env("SQLMON_RECONNECT_DELAY_MS") {
            config.reconnect_delay = Duration::from_millis(value);
        }
        if let Some(value) = read_usize_env("SQLMON_SUB_QUEUE_CAPACITY") {
            config.sub_queue_capacity = value;
        }
        if let Some(value) = read_u64_env("SQLMON_KEEP_ALIVE_MS") {
            config.setup.keep_alive = Duration::from_millis(value);
        }
        if let Some(value) = read_u64_env("SQLMON_LIFETIME_MS") {
            config.setup.lifetime = Duration::from_millis(value);
        }
        config
    }
}

impl ClientConfigOverride {
    fn apply(&self, config: &mut ClientConfig) {
        // Zero values are treated as absent so a sparse file cannot disable
        // reconnection or shrink queues to nothing by accident.
        if let Some(value) = self.reconnect_max_attempts {
            if value > 0 {
                config.reconnect_max_attempts = value;
            }
        }
        if let Some(value) = self.reconnect_delay_ms {
            if value > 0 {
                config.reconnect_delay = Duration::from_millis(value);
            }
        }
        if let Some(value) = self.sub_queue_capacity {
            if value > 0 {
                config.sub_queue_capacity = value;
            }
        }
        if let Some(value) = self.keep_alive_ms {
            if value > 0 {
                config.setup.keep_alive = Duration::from_millis(value);
            }
        }
        if let Some(value) = self.lifetime_ms {
            if value > 0 {
                config.setup.lifetime = Duration::from_millis(value);
            }
        }
    }
}

fn read_u32_env(key: &str) -> Option<u32> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .filter(|value| *value > 0)
}

fn read_u64_env(key: &str) -> Option<u64> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
}

fn read_usize_env(key: &str) -> Option<usize> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
}
