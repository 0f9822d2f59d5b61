use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::metric::FoldSettings;

/// Daemon configuration, loadable from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Flush window length in seconds
    pub flush_interval_secs: u64,
    /// UDP ingestion bind address
    pub udp_bind: String,
    /// TCP ingestion bind address
    pub tcp_bind: String,
    /// Aliveness responder bind address; disabled when absent
    pub liveness_bind: Option<String>,
    /// Idle read timeout for TCP ingestion connections, in seconds
    pub tcp_read_timeout_secs: u64,
    pub timer: TimerConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    /// Inner percentile window applied to every timer fold (1..=100)
    pub percentile: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Downstream Graphite-protocol collector address
    pub addr: String,
    /// Prefix prepended to every output key
    pub prefix: String,
    /// Connect/write attempts per batch before it is dropped
    pub max_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            flush_interval_secs: 10,
            udp_bind: "0.0.0.0:8125".to_string(),
            tcp_bind: "0.0.0.0:8125".to_string(),
            liveness_bind: Some("0.0.0.0:8325".to_string()),
            tcp_read_timeout_secs: 30,
            timer: TimerConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl Default for TimerConfig {
    fn default() -> Self {
        TimerConfig { percentile: 90 }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            addr: "127.0.0.1:2003".to_string(),
            prefix: "stats".to_string(),
            max_attempts: 3,
        }
    }
}

impl Config {
    /// Load and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        let config: Config = toml::from_str(&text).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flush_interval_secs == 0 {
            return Err(ConfigError::Invalid("flush_interval_secs must be > 0".into()));
        }
        if self.timer.percentile == 0 || self.timer.percentile > 100 {
            return Err(ConfigError::Invalid(
                "timer.percentile must be in 1..=100".into(),
            ));
        }
        if self.store.max_attempts == 0 {
            return Err(ConfigError::Invalid("store.max_attempts must be > 0".into()));
        }
        Ok(())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn tcp_read_timeout(&self) -> Duration {
        Duration::from_secs(self.tcp_read_timeout_secs)
    }

    pub fn fold_settings(&self) -> FoldSettings {
        FoldSettings {
            timer_percentile: self.timer.percentile,
        }
    }

    /// Set the flush window length in seconds
    pub fn with_flush_interval(mut self, secs: u64) -> Self {
        self.flush_interval_secs = secs;
        self
    }

    /// Set the timer inner-percentile window
    pub fn with_percentile(mut self, percentile: u8) -> Self {
        self.timer.percentile = percentile;
        self
    }
}

/// Error type for config loading
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "failed to read config: {}", e),
            ConfigError::Parse(e) => write!(f, "failed to parse config: {}", e),
            ConfigError::Invalid(reason) => write!(f, "invalid config: {}", reason),
        }
    }
}

impl std::error::Error for ConfigError {}
