//! Serial ingestion: framing and per-instrument reader threads

pub mod line_reader;
pub mod line_source;

pub use line_reader::{LineReader, MAX_LINE_LEN};
pub use line_source::{LineSource, LineSourceStats, serial_fault};
