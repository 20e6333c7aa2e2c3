//! ticc-mux - serial-to-TCP multiplexer for TICC time interval counters
//!
//! Several instruments print one measurement per line on their serial ports.
//! ticc-mux reads them all, validates each line, and republishes the records
//! on TCP ports as newline-terminated text:
//!
//! - `base_port`: every record, in arrival order
//! - `base_port + 1`: every record, sorted inside a small window
//! - `base_port + 2 + i`: records tagged with channel identifier `i`
//!
//! All queues are bounded and drop on overflow so a slow or absent TCP client
//! never stalls the serial readers.

pub mod app;
pub mod cli;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod error;
pub mod ingest;
pub mod queue;
pub mod reset;
pub mod streaming;
pub mod transport;

// Re-export commonly used types
pub use app::{Pipeline, PipelineHandles};
pub use config::Config;
pub use crate::core::{ChannelSet, QueueRole, Record, Shutdown};
pub use error::{Error, Result};
