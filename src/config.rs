//! Virtual pump settings.
//!
//! Loaded from, in increasing priority: built-in defaults, an optional TOML
//! file, and `VPUMP_`-prefixed environment variables (`VPUMP_STEP_MS=50`).

use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How the pump reacts to the `COMMAND` and `ON` control bits.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    /// `COMMAND` + `ON` switches the pump on if it is off and off if it is on.
    #[default]
    Toggle,
    /// `COMMAND` + `ON` keeps the pump on.
    Level,
}

/// What a write to a read-only parameter returns.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CannotChangeReply {
    /// Mode `error` with error code `CANNOT_CHANGE`.
    #[default]
    Error,
    /// Mode `no write`.
    NoWrite,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PumpConfig {
    /// Interval between hardware ticks.
    pub step_ms: u64,
    /// Frequency change rate in Hz/s.
    pub abs_acceleration: f64,
    /// Converter temperature while on, °C.
    pub nominal_temperature: i16,
    /// Motor current while on, 0.1 A.
    pub nominal_current: u16,
    /// Intermediate circuit voltage while on, 0.1 V.
    pub nominal_voltage: u16,
    /// Idle sleep of the connection loop.
    pub poll_interval_ms: u64,
    /// How long the connection loop waits for input in one poll.
    pub read_timeout_ms: u64,
    /// How long shutdown waits for background threads.
    pub shutdown_timeout_ms: u64,
    pub control_mode: ControlMode,
    pub cannot_change_reply: CannotChangeReply,
    /// How long writes fail with `SAVING` after the save-data parameter is
    /// written. 0 disables the save window.
    pub save_duration_ms: u64,
    pub log_level: String,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            step_ms: 100,
            abs_acceleration: 100.0,
            nominal_temperature: 30,
            nominal_current: 10,
            nominal_voltage: 24,
            poll_interval_ms: 1,
            read_timeout_ms: 10,
            shutdown_timeout_ms: 2000,
            control_mode: ControlMode::Toggle,
            cannot_change_reply: CannotChangeReply::Error,
            save_duration_ms: 0,
            log_level: "info".to_string(),
        }
    }
}

impl PumpConfig {
    pub const ENV_PREFIX: &'static str = "VPUMP_";

    /// Defaults, then `path` if given, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(PumpConfig::default()));
        if let Some(path) = path {
            if !path.is_file() {
                return Err(ConfigError::Invalid {
                    field: "path",
                    reason: format!("{} is not a file", path.display()),
                });
            }
            figment = figment.merge(Toml::file(path));
        }
        let config: PumpConfig = figment.merge(Env::prefixed(Self::ENV_PREFIX)).extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason: &str| ConfigError::Invalid {
            field,
            reason: reason.to_string(),
        };
        if self.step_ms == 0 {
            return Err(invalid("step_ms", "must be positive"));
        }
        if !self.abs_acceleration.is_finite() || self.abs_acceleration < 0.0 {
            return Err(invalid("abs_acceleration", "must be a non-negative number"));
        }
        if self.read_timeout_ms == 0 {
            return Err(invalid("read_timeout_ms", "must be positive"));
        }
        if self.shutdown_timeout_ms == 0 {
            return Err(invalid("shutdown_timeout_ms", "must be positive"));
        }
        if self.log_level.trim().is_empty() {
            return Err(invalid("log_level", "must not be empty"));
        }
        Ok(())
    }

    pub fn step(&self) -> Duration {
        Duration::from_millis(self.step_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn save_duration(&self) -> Duration {
        Duration::from_millis(self.save_duration_ms)
    }
}
