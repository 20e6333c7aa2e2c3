//! Bounded record queues between the dispatcher and the port publishers.
//!
//! Every queue has exactly one producer (the dispatcher) and one consumer
//! (its publisher). Inserts never block: when a queue is at capacity the new
//! record is dropped and counted. Consumers block according to the queue's
//! release discipline:
//!
//! | Queue        | Backing                    | Release                         |
//! |--------------|----------------------------|---------------------------------|
//! | Merged       | [`FifoQueue`]              | arrival order, as soon as ready |
//! | PerChannel   | [`FifoQueue`]              | arrival order, as soon as ready |
//! | TimeOrdered  | [`SortedQueue`]            | smallest key, only while depth > sort window |

pub mod fifo;
pub mod order;
pub mod sorted;

pub use fifo::FifoQueue;
pub use order::{LeadingTimestampOrder, LexicalOrder, OrderKind, RecordOrder};
pub use sorted::SortedQueue;

use crate::core::{Record, Shutdown};
use std::sync::atomic::{AtomicU64, Ordering};

/// Log a warning every this many drops on one queue
const DROP_WARN_INTERVAL: u64 = 100;

/// Producer/consumer seam shared by all output queues
pub trait RecordQueue: Send + Sync {
    /// Queue name used in logs
    fn name(&self) -> &str;

    /// Non-blocking insert. Returns `false` if the record was dropped.
    fn offer(&self, record: Record) -> bool;

    /// Blocking remove following the queue's release discipline.
    ///
    /// Returns `None` once `shutdown` is triggered.
    fn take(&self, shutdown: &Shutdown) -> Option<Record>;

    /// Non-blocking remove; `None` if nothing is releasable right now
    fn try_take(&self) -> Option<Record>;

    /// Discard the whole backlog, returning how many records were dropped
    fn drain(&self) -> usize;

    /// Records currently buffered
    fn len(&self) -> usize;

    /// True if nothing is buffered
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum records held at once
    fn capacity(&self) -> usize;

    /// Records dropped on insert since creation
    fn dropped(&self) -> u64;
}

/// Per-queue backpressure drop counter with rate-limited logging
#[derive(Debug)]
pub struct DropTally {
    name: String,
    count: AtomicU64,
}

impl DropTally {
    /// New counter for the named queue
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            count: AtomicU64::new(0),
        }
    }

    /// Count one dropped record
    pub fn record(&self, record: &Record) {
        let total = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        log::trace!("{}: queue full, dropped {:?}", self.name, record);
        if total % DROP_WARN_INTERVAL == 0 {
            log::warn!("{}: {} records dropped (queue full)", self.name, total);
        }
    }

    /// Total drops so far
    pub fn total(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Queue name
    pub fn name(&self) -> &str {
        &self.name
    }
}
