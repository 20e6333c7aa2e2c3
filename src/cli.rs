//! Command line arguments

use crate::config::Config;
use clap::Parser;
use std::path::PathBuf;

/// Multiplex TICC serial measurement streams onto TCP ports
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Serial devices to read, one per instrument
    #[arg(long, num_args = 1..)]
    pub comports: Option<Vec<String>>,

    /// Channel identifiers for per-channel ports, in port order
    #[arg(long, num_args = 1..)]
    pub chnames: Option<Vec<String>>,

    /// Merged data port; sorted is +1, channels start at +2
    #[arg(long)]
    pub baseport: Option<u16>,

    /// Serial baud rate
    #[arg(long)]
    pub baudrate: Option<u32>,

    /// Configuration file (used only if it exists)
    #[arg(short, long, default_value = "ticc-mux.toml")]
    pub config: PathBuf,

    /// Pulse this GPIO to reset the instruments before starting
    #[arg(long)]
    pub reset_gpio: Option<u32>,

    /// Skip the instrument reset even if the config enables it
    #[arg(long, conflicts_with = "reset_gpio")]
    pub no_reset: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Args {
    /// Overlay command line values onto `config`
    pub fn apply(&self, config: &mut Config) {
        if let Some(ports) = &self.comports {
            config.serial.ports = ports.clone();
        }
        if let Some(names) = &self.chnames {
            config.channels.names = names.clone();
        }
        if let Some(port) = self.baseport {
            config.network.base_port = port;
        }
        if let Some(baud) = self.baudrate {
            config.serial.baud_rate = baud;
        }
        if let Some(pin) = self.reset_gpio {
            config.reset.enabled = true;
            config.reset.gpio_pin = pin;
        }
        if self.no_reset {
            config.reset.enabled = false;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_leave_config_untouched() {
        let args = Args::parse_from(["ticc-mux"]);
        assert_eq!(args.config, PathBuf::from("ticc-mux.toml"));

        let mut config = Config::default();
        args.apply(&mut config);
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_overrides() {
        let args = Args::parse_from([
            "ticc-mux",
            "--comports",
            "/dev/ttyUSB0",
            "/dev/ttyUSB1",
            "--chnames",
            "chA",
            "chB",
            "chC",
            "--baseport",
            "9300",
            "--baudrate",
            "57600",
            "--reset-gpio",
            "4",
            "--log-level",
            "debug",
        ]);

        let mut config = Config::default();
        args.apply(&mut config);
        assert_eq!(config.serial.ports, vec!["/dev/ttyUSB0", "/dev/ttyUSB1"]);
        assert_eq!(config.channels.names, vec!["chA", "chB", "chC"]);
        assert_eq!(config.network.base_port, 9300);
        assert_eq!(config.serial.baud_rate, 57600);
        assert!(config.reset.enabled);
        assert_eq!(config.reset.gpio_pin, 4);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_no_reset_overrides_config() {
        let args = Args::parse_from(["ticc-mux", "--no-reset"]);
        let mut config = Config::default();
        config.reset.enabled = true;
        args.apply(&mut config);
        assert!(!config.reset.enabled);
    }

    #[test]
    fn test_no_reset_conflicts_with_reset_gpio() {
        assert!(Args::try_parse_from(["ticc-mux", "--no-reset", "--reset-gpio", "21"]).is_err());
    }
}
