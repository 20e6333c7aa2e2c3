//! Configuration for ticc-mux
//!
//! Loaded from a TOML file; every field has a default so a partial file (or
//! no file at all) yields a working four-instrument setup.

use crate::core::{ChannelSet, QueueRole};
use crate::error::{Error, Result};
use crate::queue::OrderKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub queues: QueueConfig,
    #[serde(default)]
    pub reset: ResetConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial instrument settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SerialConfig {
    /// Device paths, one line source each (default: /dev/ttyTICC0..3)
    #[serde(default = "default_ports")]
    pub ports: Vec<String>,

    /// Baud rate shared by all instruments (default: 115200)
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Read timeout in milliseconds; bounds shutdown latency (default: 100)
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

/// Channel identifiers used for per-channel routing
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChannelsConfig {
    /// Substrings matched against record text (default: chA..chH)
    #[serde(default = "default_channel_names")]
    pub names: Vec<String>,
}

/// TCP listener settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NetworkConfig {
    /// Interface to bind (default: 0.0.0.0)
    #[serde(default = "default_bind_host")]
    pub bind_host: String,

    /// Merged port; sorted is base+1, channel i is base+2+i (default: 9190)
    #[serde(default = "default_base_port")]
    pub base_port: u16,

    /// Socket write timeout in milliseconds (default: 5000).
    ///
    /// 0 gives plain blocking writes, so a client that stops reading stalls
    /// its publisher until it disconnects.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

/// Queue capacities and sort behaviour
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct QueueConfig {
    /// Intake channel capacity (default: 20)
    #[serde(default = "default_intake")]
    pub intake: usize,

    /// Merged queue capacity (default: 5)
    #[serde(default = "default_merged")]
    pub merged: usize,

    /// Time-ordered queue capacity (default: 50)
    #[serde(default = "default_time_ordered")]
    pub time_ordered: usize,

    /// Capacity of each per-channel queue (default: 5)
    #[serde(default = "default_per_channel")]
    pub per_channel: usize,

    /// Records held back in the time-ordered queue (default: 20)
    #[serde(default = "default_sort_window")]
    pub sort_window: usize,

    /// Sort key for the time-ordered queue (default: lexical)
    #[serde(default)]
    pub order: OrderKind,
}

/// Instrument reset pulse on a GPIO line
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ResetConfig {
    /// Pulse the line before opening serial ports (default: false)
    #[serde(default)]
    pub enabled: bool,

    /// GPIO number (default: 21)
    #[serde(default = "default_gpio_pin")]
    pub gpio_pin: u32,

    /// High time in milliseconds (default: 100)
    #[serde(default = "default_pulse_ms")]
    pub pulse_ms: u64,

    /// Wait after the pulse before opening ports (default: 10000)
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// sysfs GPIO directory (default: /sys/class/gpio)
    #[serde(default = "default_sysfs_root")]
    pub sysfs_root: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_ports() -> Vec<String> {
    (0..4).map(|i| format!("/dev/ttyTICC{}", i)).collect()
}
fn default_baud_rate() -> u32 {
    115_200
}
fn default_read_timeout_ms() -> u64 {
    100
}
fn default_channel_names() -> Vec<String> {
    ('A'..='H').map(|c| format!("ch{}", c)).collect()
}
fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}
fn default_base_port() -> u16 {
    9190
}
fn default_write_timeout_ms() -> u64 {
    5000
}
fn default_intake() -> usize {
    20
}
fn default_merged() -> usize {
    5
}
fn default_time_ordered() -> usize {
    50
}
fn default_per_channel() -> usize {
    5
}
fn default_sort_window() -> usize {
    20
}
fn default_gpio_pin() -> u32 {
    21
}
fn default_pulse_ms() -> u64 {
    100
}
fn default_settle_ms() -> u64 {
    10_000
}
fn default_sysfs_root() -> PathBuf {
    PathBuf::from("/sys/class/gpio")
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            ports: default_ports(),
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            names: default_channel_names(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_host: default_bind_host(),
            base_port: default_base_port(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            intake: default_intake(),
            merged: default_merged(),
            time_ordered: default_time_ordered(),
            per_channel: default_per_channel(),
            sort_window: default_sort_window(),
            order: OrderKind::default(),
        }
    }
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            gpio_pin: default_gpio_pin(),
            pulse_ms: default_pulse_ms(),
            settle_ms: default_settle_ms(),
            sysfs_root: default_sysfs_root(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl NetworkConfig {
    /// Write timeout for client sockets, `None` when disabled
    pub fn write_timeout(&self) -> Option<Duration> {
        (self.write_timeout_ms > 0).then(|| Duration::from_millis(self.write_timeout_ms))
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            log::info!("Loading configuration from {}", path.display());
            Self::from_file(path)
        } else {
            log::info!("No config file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Channel identifiers as a validated set
    pub fn channel_set(&self) -> Result<ChannelSet> {
        ChannelSet::new(self.channels.names.iter().cloned())
    }

    /// Check invariants that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.serial.ports.is_empty() {
            return Err(Error::Config("no serial ports configured".to_string()));
        }
        if self.serial.baud_rate == 0 {
            return Err(Error::Config("baud rate must be positive".to_string()));
        }

        let channels = self.channel_set()?;

        let q = &self.queues;
        for (name, capacity) in [
            ("intake", q.intake),
            ("merged", q.merged),
            ("time_ordered", q.time_ordered),
            ("per_channel", q.per_channel),
        ] {
            if capacity == 0 {
                return Err(Error::Config(format!("queue capacity {} is zero", name)));
            }
        }
        if q.sort_window >= q.time_ordered {
            return Err(Error::Config(format!(
                "sort_window ({}) must be below time_ordered capacity ({})",
                q.sort_window, q.time_ordered
            )));
        }

        // Highest port in use is the last channel's (or the sorted port)
        let last = match channels.len() {
            0 => QueueRole::TimeOrdered,
            n => QueueRole::Channel(n - 1),
        };
        last.port(self.network.base_port)?;

        Ok(())
    }
}
