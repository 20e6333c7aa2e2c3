//! FIFO queue backed by a bounded crossbeam channel

use super::{DropTally, RecordQueue};
use crate::core::{Record, Shutdown};
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, select};

/// Bounded first-in first-out queue with drop-on-full inserts
pub struct FifoQueue {
    tx: Sender<Record>,
    rx: Receiver<Record>,
    capacity: usize,
    drops: DropTally,
}

impl FifoQueue {
    /// Create a queue holding at most `capacity` records
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self {
            tx,
            rx,
            capacity,
            drops: DropTally::new(name),
        }
    }
}

impl RecordQueue for FifoQueue {
    fn name(&self) -> &str {
        self.drops.name()
    }

    fn offer(&self, record: Record) -> bool {
        match self.tx.try_send(record) {
            Ok(()) => true,
            Err(TrySendError::Full(record)) => {
                self.drops.record(&record);
                false
            }
            // Unreachable while self holds the receiver
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    fn take(&self, shutdown: &Shutdown) -> Option<Record> {
        if shutdown.is_triggered() {
            return None;
        }
        select! {
            recv(self.rx) -> msg => msg.ok(),
            recv(shutdown.done()) -> _ => None,
        }
    }

    fn try_take(&self) -> Option<Record> {
        self.rx.try_recv().ok()
    }

    fn drain(&self) -> usize {
        self.rx.try_iter().count()
    }

    fn len(&self) -> usize {
        self.rx.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn dropped(&self) -> u64 {
        self.drops.total()
    }
}
