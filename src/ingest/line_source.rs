//! Line source: one reader thread per instrument
//!
//! Reads lines from a serial transport, filters comments and short lines, and
//! offers each record to the shared intake channel without ever blocking.
//!
//! # Failure semantics
//!
//! A read or decode fault on the serial channel is fatal for the whole
//! process: the source logs it, records it on the [`Shutdown`] handle and
//! exits. There is no reconnect loop.

use super::line_reader::{LineReader, decode_ascii};
use crate::core::{LineVerdict, Record, Shutdown};
use crate::error::{Error, Result};
use crate::transport::Transport;
use crossbeam_channel::{Sender, TrySendError};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one line source, readable from other threads
#[derive(Debug, Default)]
pub struct LineSourceStats {
    /// Lines read (including the discarded first line)
    pub lines: AtomicU64,
    /// Lines starting with `#`
    pub comments: AtomicU64,
    /// Lines below the minimum length
    pub too_short: AtomicU64,
    /// Records accepted into the intake channel
    pub accepted: AtomicU64,
    /// Records dropped because intake was full
    pub dropped: AtomicU64,
}

impl LineSourceStats {
    fn bump(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Snapshot of (lines, comments, too_short, accepted, dropped)
    pub fn snapshot(&self) -> (u64, u64, u64, u64, u64) {
        (
            self.lines.load(Ordering::Relaxed),
            self.comments.load(Ordering::Relaxed),
            self.too_short.load(Ordering::Relaxed),
            self.accepted.load(Ordering::Relaxed),
            self.dropped.load(Ordering::Relaxed),
        )
    }
}

/// Reader loop state for one serial instrument
pub struct LineSource<T: Transport> {
    name: String,
    transport: T,
    reader: LineReader,
    intake: Sender<Record>,
    shutdown: Shutdown,
    stats: Arc<LineSourceStats>,
}

impl<T: Transport> LineSource<T> {
    /// Create a line source for the instrument called `name` (its device path)
    pub fn new(
        name: impl Into<String>,
        transport: T,
        intake: Sender<Record>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            name: name.into(),
            transport,
            reader: LineReader::new(),
            intake,
            shutdown,
            stats: Arc::new(LineSourceStats::default()),
        }
    }

    /// Shared counters for this source
    pub fn stats(&self) -> Arc<LineSourceStats> {
        Arc::clone(&self.stats)
    }

    /// Run until shutdown or a serial fault.
    ///
    /// On a fault the process-wide shutdown is failed with the port name
    /// before the error is returned.
    pub fn run(mut self) -> Result<()> {
        log::info!("{}: line source started", self.name);

        let result = self.read_loop();
        match &result {
            Ok(()) => log::info!("{}: line source stopped", self.name),
            Err(e) => {
                log::error!("{}: serial fault: {}", self.name, e);
                self.shutdown.fail(format!("{}: {}", self.name, e));
            }
        }
        result
    }

    fn read_loop(&mut self) -> Result<()> {
        // The first line is usually a fragment caught mid-transmission
        let mut first_discarded = false;

        while !self.shutdown.is_triggered() {
            if !first_discarded {
                let overflows = self.reader.overflows();
                let raw = self.reader.next_raw(&mut self.transport)?;

                if self.reader.overflows() > overflows {
                    // The overlong fragment was the first line; anything
                    // framed after it is a real line
                    LineSourceStats::bump(&self.stats.lines);
                    log::debug!("{}: discarded overlong first line", self.name);
                    first_discarded = true;
                    if let Some(raw) = raw {
                        let line = decode_ascii(raw)?;
                        LineSourceStats::bump(&self.stats.lines);
                        self.handle_line(&line);
                    }
                } else if let Some(raw) = raw {
                    LineSourceStats::bump(&self.stats.lines);
                    log::debug!("{}: discarded first line ({} bytes)", self.name, raw.len());
                    first_discarded = true;
                }
                continue;
            }

            let Some(line) = self.reader.next_line(&mut self.transport)? else {
                continue;
            };
            LineSourceStats::bump(&self.stats.lines);
            self.handle_line(&line);
        }
        Ok(())
    }

    fn handle_line(&mut self, line: &str) {
        match Record::classify(line) {
            LineVerdict::Comment => {
                LineSourceStats::bump(&self.stats.comments);
                log::trace!("{}: comment {:?}", self.name, line);
            }
            LineVerdict::TooShort => {
                LineSourceStats::bump(&self.stats.too_short);
                log::trace!("{}: short line {:?}", self.name, line);
            }
            LineVerdict::Accepted(record) => match self.intake.try_send(record) {
                Ok(()) => {
                    LineSourceStats::bump(&self.stats.accepted);
                }
                Err(TrySendError::Full(record)) => {
                    let dropped = LineSourceStats::bump(&self.stats.dropped);
                    log::trace!("{}: intake full, dropped {:?}", self.name, record);
                    if dropped % 100 == 0 {
                        log::warn!("{}: {} records dropped (intake full)", self.name, dropped);
                    }
                }
                Err(TrySendError::Disconnected(_)) => {
                    // Dispatcher is gone; nothing downstream will consume
                    log::debug!("{}: intake closed", self.name);
                    self.shutdown.trigger();
                }
            },
        }
    }
}

/// Wrap a transport-level error with the port it happened on
pub fn serial_fault(port: &str, err: &Error) -> Error {
    Error::SerialFault {
        port: port.to_string(),
        reason: err.to_string(),
    }
}
