//! Global configuration parsing and validation.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Stream registry and shutdown choreography settings.
///
/// All durations are expressed in milliseconds in the TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct StreamConfig {
    /// Ceiling on simultaneously active job streams.
    #[serde(default = "default_max_concurrent_streams")]
    pub max_concurrent_streams: usize,
    /// Interval between keep-alive comments on an open stream.
    #[serde(default = "default_keep_alive_interval_ms")]
    pub keep_alive_interval_ms: u64,
    /// Silence (no semantic event) after which a stream is reclaimed.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    /// Period of the idle reclamation sweep.
    #[serde(default = "default_idle_sweep_interval_ms")]
    pub idle_sweep_interval_ms: u64,
    /// Delay between a terminal event and the `stream_end` event.
    #[serde(default = "default_stage1_delay_ms")]
    pub stage1_delay_ms: u64,
    /// Delay between a terminal event and closing the connection.
    #[serde(default = "default_stage2_delay_ms")]
    pub stage2_delay_ms: u64,
}

fn default_max_concurrent_streams() -> usize {
    10
}

fn default_keep_alive_interval_ms() -> u64 {
    30_000
}

fn default_idle_timeout_ms() -> u64 {
    300_000
}

fn default_idle_sweep_interval_ms() -> u64 {
    60_000
}

fn default_stage1_delay_ms() -> u64 {
    50
}

fn default_stage2_delay_ms() -> u64 {
    100
}

fn default_http_port() -> u16 {
    8787
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_concurrent_streams: default_max_concurrent_streams(),
            keep_alive_interval_ms: default_keep_alive_interval_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            idle_sweep_interval_ms: default_idle_sweep_interval_ms(),
            stage1_delay_ms: default_stage1_delay_ms(),
            stage2_delay_ms: default_stage2_delay_ms(),
        }
    }
}

impl StreamConfig {
    /// Keep-alive ping interval.
    #[must_use]
    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_millis(self.keep_alive_interval_ms)
    }

    /// Idle threshold used by the reclamation sweep.
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Period of the reclamation sweep.
    #[must_use]
    pub fn idle_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.idle_sweep_interval_ms)
    }

    /// Terminal event to `stream_end` delay.
    #[must_use]
    pub fn stage1_delay(&self) -> Duration {
        Duration::from_millis(self.stage1_delay_ms)
    }

    /// Terminal event to close delay.
    #[must_use]
    pub fn stage2_delay(&self) -> Duration {
        Duration::from_millis(self.stage2_delay_ms)
    }

    /// Validate the stream settings.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when a value is zero or the close delay
    /// precedes the `stream_end` delay.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_streams == 0 {
            return Err(AppError::Config(
                "max_concurrent_streams must be greater than zero".into(),
            ));
        }

        let non_zero = [
            ("keep_alive_interval_ms", self.keep_alive_interval_ms),
            ("idle_timeout_ms", self.idle_timeout_ms),
            ("idle_sweep_interval_ms", self.idle_sweep_interval_ms),
            ("stage1_delay_ms", self.stage1_delay_ms),
            ("stage2_delay_ms", self.stage2_delay_ms),
        ];
        for (name, value) in non_zero {
            if value == 0 {
                return Err(AppError::Config(format!("{name} must be greater than zero")));
            }
        }

        if self.stage2_delay_ms < self.stage1_delay_ms {
            return Err(AppError::Config(
                "stage2_delay_ms must not be shorter than stage1_delay_ms".into(),
            ));
        }

        Ok(())
    }
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// HTTP port for the SSE endpoint.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Stream registry settings.
    #[serde(default)]
    pub streams: StreamConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            streams: StreamConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.streams.validate()?;
        Ok(config)
    }
}
