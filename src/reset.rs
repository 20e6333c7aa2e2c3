//! Instrument reset line driven through Linux sysfs GPIO
//!
//! The TICC boards share one reset line. Pulsing it high restarts every
//! instrument so they all begin a fresh measurement run before the serial
//! ports are opened.

use crate::config::ResetConfig;
use crate::core::Shutdown;
use crate::error::{Error, Result};
use crossbeam_channel::RecvTimeoutError;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

/// How long to wait for the kernel to create the pin directory after export
const EXPORT_TIMEOUT: Duration = Duration::from_millis(500);

/// One GPIO output under a sysfs root
#[derive(Debug, Clone)]
pub struct ResetLine {
    root: PathBuf,
    pin: u32,
}

impl ResetLine {
    /// Line `pin` under `root` (normally `/sys/class/gpio`)
    pub fn new(root: impl Into<PathBuf>, pin: u32) -> Self {
        Self {
            root: root.into(),
            pin,
        }
    }

    /// Line described by the `[reset]` config section
    pub fn from_config(config: &ResetConfig) -> Self {
        Self::new(&config.sysfs_root, config.gpio_pin)
    }

    fn pin_dir(&self) -> PathBuf {
        self.root.join(format!("gpio{}", self.pin))
    }

    fn write(&self, path: &Path, value: &str) -> Result<()> {
        fs::write(path, value)
            .map_err(|e| Error::Gpio(format!("write {:?} to {}: {}", value, path.display(), e)))
    }

    /// Export the pin if needed. Returns true if this call exported it.
    fn export(&self) -> Result<bool> {
        if self.pin_dir().is_dir() {
            return Ok(false);
        }
        self.write(&self.root.join("export"), &self.pin.to_string())?;

        let deadline = Instant::now() + EXPORT_TIMEOUT;
        while !self.pin_dir().is_dir() {
            if Instant::now() >= deadline {
                return Err(Error::Gpio(format!(
                    "gpio{} did not appear after export",
                    self.pin
                )));
            }
            thread::sleep(Duration::from_millis(10));
        }
        Ok(true)
    }

    fn set(&self, high: bool) -> Result<()> {
        self.write(&self.pin_dir().join("value"), if high { "1" } else { "0" })
    }

    /// Drive the line high for `high_time`, then low again.
    ///
    /// The pin is left unexported if it was not exported beforehand.
    pub fn pulse(&self, high_time: Duration) -> Result<()> {
        let exported = self.export()?;
        let result = self.write(&self.pin_dir().join("direction"), "out").and_then(|_| {
            self.set(true)?;
            thread::sleep(high_time);
            self.set(false)
        });

        if exported
            && let Err(e) = self.write(&self.root.join("unexport"), &self.pin.to_string())
        {
            log::debug!("GPIO {} unexport failed: {}", self.pin, e);
        }
        result
    }
}

/// Pulse the reset line and wait for the instruments to come back.
///
/// A failed pulse is logged and startup continues; the instruments may
/// simply not be wired to a reset line. The settle wait ends early on
/// shutdown.
pub fn reset_instruments(config: &ResetConfig, shutdown: &Shutdown) {
    let line = ResetLine::from_config(config);
    log::info!("Resetting instruments via GPIO {}", config.gpio_pin);
    match line.pulse(Duration::from_millis(config.pulse_ms)) {
        Ok(()) => {
            log::info!("Waiting {} ms for instruments to settle", config.settle_ms);
            let settle = Duration::from_millis(config.settle_ms);
            if let Err(RecvTimeoutError::Disconnected) = shutdown.done().recv_timeout(settle) {
                log::info!("Settle wait interrupted by shutdown");
            }
        }
        Err(e) => log::warn!("Instrument reset failed, continuing without it: {}", e),
    }
}
