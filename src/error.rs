//! Error types for ticc-mux

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// ticc-mux error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial port error (open or configure)
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Line received from an instrument is not ASCII text
    #[error("Decode error: {0}")]
    Decode(String),

    /// Fatal fault on a serial channel; terminates the process
    #[error("Serial fault on {port}: {reason}")]
    SerialFault {
        /// Device path of the failing port
        port: String,
        /// Human readable cause
        reason: String,
    },

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration could not be serialized
    #[error("Config write error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    /// GPIO reset line error
    #[error("GPIO error: {0}")]
    Gpio(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
