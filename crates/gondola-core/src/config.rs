//! Typed configuration for the controller.
//!
//! Every section has a `Default` matching the constants in
//! [`constants`](crate::constants), so an empty TOML document is a valid
//! configuration. Durations are stored as plain numbers to keep the file
//! format readable and are converted with the accessor methods.
//!
//! # Examples
//!
//! ```
//! use gondola_core::ControllerConfig;
//!
//! let config = ControllerConfig::from_toml_str(
//!     r#"
//!     [serial]
//!     port = "/dev/ttyACM0"
//!
//!     [[gondolas]]
//!     label = "drill"
//!     position_id = 71
//!     "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.serial.port, "/dev/ttyACM0");
//! assert_eq!(config.engine.read_attempts, 4);
//! assert_eq!(config.gondolas.len(), 1);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::{Error, GondolaEntry, PositionId, Result};

/// Serial link settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_SERIAL_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: DEFAULT_SERIAL_READ_TIMEOUT_MS,
        }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Protocol engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub read_attempts: u32,
    pub read_delay_ms: u64,
    pub await_tool_timeout_secs: f64,
    pub await_tool_max_retries: u32,
    pub default_position_id: PositionId,
    pub poll_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            read_attempts: DEFAULT_READ_ATTEMPTS,
            read_delay_ms: DEFAULT_READ_DELAY_MS,
            await_tool_timeout_secs: DEFAULT_AWAIT_TOOL_TIMEOUT_SECS,
            await_tool_max_retries: DEFAULT_AWAIT_TOOL_MAX_RETRIES,
            default_position_id: DEFAULT_POSITION_ID,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl EngineConfig {
    pub fn read_delay(&self) -> Duration {
        Duration::from_millis(self.read_delay_ms)
    }

    pub fn await_tool_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.await_tool_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Identification gate settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub min_confidence: f64,
    pub window_secs: f64,
    pub window_capacity: usize,
    pub min_hits: usize,
    pub emit_interval_secs: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            window_secs: DEFAULT_WINDOW_SECS,
            window_capacity: DEFAULT_WINDOW_CAPACITY,
            min_hits: DEFAULT_MIN_HITS,
            emit_interval_secs: DEFAULT_EMIT_INTERVAL_SECS,
        }
    }
}

impl GateConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs_f64(self.window_secs)
    }

    pub fn emit_interval(&self) -> Duration {
        Duration::from_secs_f64(self.emit_interval_secs)
    }
}

/// Status endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    pub bind_addr: String,
    pub log_capacity: usize,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_STATUS_ADDR.to_string(),
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

/// Complete controller configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub serial: SerialConfig,
    pub engine: EngineConfig,
    pub gate: GateConfig,
    pub status: StatusConfig,

    /// Initial gondola registry, in matching order.
    pub gondolas: Vec<GondolaEntry>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            engine: EngineConfig::default(),
            gate: GateConfig::default(),
            status: StatusConfig::default(),
            gondolas: default_gondolas(),
        }
    }
}

/// The canonical label set mapped to consecutive positions from 71.
pub fn default_gondolas() -> Vec<GondolaEntry> {
    DEFAULT_GONDOLA_LABELS
        .iter()
        .zip(FIRST_POSITION_ID..)
        .map(|(label, position_id)| GondolaEntry::new(*label, position_id))
        .collect()
}

impl ControllerConfig {
    /// Parse and validate a TOML document.
    ///
    /// # Errors
    /// Returns `Error::ConfigParse` for malformed TOML and `Error::Config`
    /// when a value is out of range.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    ///
    /// # Errors
    /// Returns `Error::Io` if the file cannot be read, otherwise see
    /// [`from_toml_str`](Self::from_toml_str).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Reject values the engine cannot work with.
    ///
    /// Duplicate position ids are not rejected; the registry reports them as warnings.
    ///
    /// # Errors
    /// Returns `Error::Config` describing the first offending key.
    pub fn validate(&self) -> Result<()> {
        if self.serial.port.trim().is_empty() {
            return Err(Error::Config("serial.port must not be empty".into()));
        }
        if self.serial.baud_rate == 0 {
            return Err(Error::Config("serial.baud_rate must be positive".into()));
        }
        if self.engine.read_attempts == 0 {
            return Err(Error::Config("engine.read_attempts must be at least 1".into()));
        }
        if !(self.engine.await_tool_timeout_secs.is_finite()
            && self.engine.await_tool_timeout_secs > 0.0)
        {
            return Err(Error::Config(
                "engine.await_tool_timeout_secs must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.gate.min_confidence) {
            return Err(Error::Config("gate.min_confidence must be within 0..=1".into()));
        }
        if !(self.gate.window_secs.is_finite() && self.gate.window_secs > 0.0) {
            return Err(Error::Config("gate.window_secs must be positive".into()));
        }
        if !(self.gate.emit_interval_secs.is_finite() && self.gate.emit_interval_secs >= 0.0) {
            return Err(Error::Config("gate.emit_interval_secs must not be negative".into()));
        }
        if self.gate.window_capacity == 0 || self.gate.min_hits == 0 {
            return Err(Error::Config(
                "gate.window_capacity and gate.min_hits must be at least 1".into(),
            ));
        }
        if self.gate.min_hits > self.gate.window_capacity {
            return Err(Error::Config(
                "gate.min_hits cannot exceed gate.window_capacity".into(),
            ));
        }
        if self.status.log_capacity == 0 {
            return Err(Error::Config("status.log_capacity must be at least 1".into()));
        }
        for entry in &self.gondolas {
            entry
                .validate()
                .map_err(|e| Error::Config(format!("gondolas: {e}")))?;
        }
        Ok(())
    }
}
