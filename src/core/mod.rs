//! Core data types shared by every stage of the pipeline.
//!
//! - [`types`]: Record, channel set and queue roles
//! - [`shutdown`]: Cancellation signal observed by all workers

pub mod shutdown;
pub mod types;

pub use shutdown::Shutdown;
pub use types::{COMMENT_MARKER, ChannelSet, LineVerdict, MIN_RECORD_LEN, QueueRole, Record};
