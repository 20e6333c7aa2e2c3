//! Dispatcher: sole consumer of the intake channel
//!
//! Replicates every record, in a fixed order, into the merged queue, the
//! time-ordered queue and each per-channel queue whose identifier occurs in
//! the record text. All inserts are non-blocking; a full queue drops the copy
//! meant for it without affecting the others.

use crate::core::{ChannelSet, Record, Shutdown};
use crate::queue::RecordQueue;
use crossbeam_channel::{Receiver, select};
use std::sync::Arc;

/// Result of replicating one record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Queues that accepted a copy
    pub delivered: usize,
    /// Queues that were full
    pub dropped: usize,
}

/// Fan-out stage between intake and the output queues
pub struct Dispatcher {
    intake: Receiver<Record>,
    merged: Arc<dyn RecordQueue>,
    time_ordered: Arc<dyn RecordQueue>,
    channels: ChannelSet,
    channel_queues: Vec<Arc<dyn RecordQueue>>,
    shutdown: Shutdown,
}

impl Dispatcher {
    /// Create a dispatcher. `channel_queues[i]` belongs to `channels.name(i)`.
    pub fn new(
        intake: Receiver<Record>,
        merged: Arc<dyn RecordQueue>,
        time_ordered: Arc<dyn RecordQueue>,
        channels: ChannelSet,
        channel_queues: Vec<Arc<dyn RecordQueue>>,
        shutdown: Shutdown,
    ) -> Self {
        debug_assert_eq!(channels.len(), channel_queues.len());
        Self {
            intake,
            merged,
            time_ordered,
            channels,
            channel_queues,
            shutdown,
        }
    }

    /// Replicate one record into every destination queue
    pub fn dispatch(&self, record: &Record) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        let mut offer = |queue: &Arc<dyn RecordQueue>| {
            if queue.offer(record.clone()) {
                outcome.delivered += 1;
            } else {
                outcome.dropped += 1;
            }
        };

        offer(&self.merged);
        offer(&self.time_ordered);
        for index in self.channels.matches(record) {
            if let Some(queue) = self.channel_queues.get(index) {
                offer(queue);
            }
        }
        outcome
    }

    /// Consume intake until shutdown or until every line source has hung up.
    ///
    /// Returns the number of records processed.
    pub fn run(self) -> u64 {
        log::info!(
            "Dispatcher started ({} channel queues)",
            self.channel_queues.len()
        );
        let mut processed = 0u64;

        loop {
            if self.shutdown.is_triggered() {
                break;
            }
            select! {
                recv(self.intake) -> msg => match msg {
                    Ok(record) => {
                        let outcome = self.dispatch(&record);
                        processed += 1;
                        if outcome.dropped > 0 {
                            log::trace!(
                                "Record {:?}: {} delivered, {} dropped",
                                record,
                                outcome.delivered,
                                outcome.dropped
                            );
                        }
                    }
                    Err(_) => {
                        log::info!("Intake closed, no more data");
                        break;
                    }
                },
                recv(self.shutdown.done()) -> _ => break,
            }
        }

        log::info!("Dispatcher exiting ({} records processed)", processed);
        processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{FifoQueue, LexicalOrder, SortedQueue};
    use crossbeam_channel::bounded;
    use std::thread;

    struct Fixture {
        merged: Arc<dyn RecordQueue>,
        sorted: Arc<dyn RecordQueue>,
        per_channel: Vec<Arc<dyn RecordQueue>>,
        dispatcher: Dispatcher,
    }

    fn fixture(intake: Receiver<Record>, shutdown: Shutdown) -> Fixture {
        let channels = ChannelSet::new(["chA", "chB"]).unwrap();
        let merged: Arc<dyn RecordQueue> = Arc::new(FifoQueue::new("merged", 5));
        let sorted: Arc<dyn RecordQueue> =
            Arc::new(SortedQueue::new("sorted", 50, 20, LexicalOrder));
        let per_channel: Vec<Arc<dyn RecordQueue>> = channels
            .iter()
            .map(|name| Arc::new(FifoQueue::new(name, 5)) as Arc<dyn RecordQueue>)
            .collect();
        let dispatcher = Dispatcher::new(
            intake,
            Arc::clone(&merged),
            Arc::clone(&sorted),
            channels,
            per_channel.clone(),
            shutdown,
        );
        Fixture {
            merged,
            sorted,
            per_channel,
            dispatcher,
        }
    }

    fn record(text: &str) -> Record {
        Record::classify(text).accepted().expect("valid record")
    }

    #[test]
    fn test_routes_by_channel_tag() {
        let (_tx, rx) = bounded(20);
        let f = fixture(rx, Shutdown::new());

        let outcome = f.dispatcher.dispatch(&record("1623091234.001 1.000e-09 chA"));
        assert_eq!(
            outcome,
            DispatchOutcome {
                delivered: 3,
                dropped: 0
            }
        );
        assert_eq!(f.merged.len(), 1);
        assert_eq!(f.sorted.len(), 1);
        assert_eq!(f.per_channel[0].len(), 1);
        assert_eq!(f.per_channel[1].len(), 0);
    }

    #[test]
    fn test_untagged_record_only_merged() {
        let (_tx, rx) = bounded(20);
        let f = fixture(rx, Shutdown::new());

        f.dispatcher.dispatch(&record("1623091234.001 1.000e-09 chZ"));
        assert_eq!(f.merged.len(), 1);
        assert_eq!(f.sorted.len(), 1);
        assert!(f.per_channel.iter().all(|q| q.is_empty()));
    }

    #[test]
    fn test_full_merged_does_not_block_others() {
        let (_tx, rx) = bounded(20);
        let f = fixture(rx, Shutdown::new());

        for i in 0..5 {
            f.dispatcher
                .dispatch(&record(&format!("162309123{}.000 1.0e-09 chB", i)));
        }
        let outcome = f.dispatcher.dispatch(&record("1623091239.000 1.0e-09 chA"));

        assert_eq!(outcome.dropped, 1);
        assert_eq!(outcome.delivered, 2);
        assert_eq!(f.merged.len(), 5);
        assert_eq!(f.merged.dropped(), 1);
        assert_eq!(f.sorted.len(), 6);
        assert_eq!(f.per_channel[0].len(), 1);
    }

    #[test]
    fn test_merged_preserves_dispatch_order() {
        let (tx, rx) = bounded(20);
        let shutdown = Shutdown::new();
        let f = fixture(rx, shutdown.clone());
        let merged = Arc::clone(&f.merged);

        let texts = [
            "1623091234.003 1.000e-09 chA",
            "1623091234.001 1.000e-09 chB",
            "1623091234.002 1.000e-09 chA",
        ];
        for t in texts {
            tx.send(record(t)).unwrap();
        }
        drop(tx);

        // Disconnected intake ends the loop once drained
        let processed = thread::spawn(move || f.dispatcher.run()).join().unwrap();
        assert_eq!(processed, 3);

        let out: Vec<String> = std::iter::from_fn(|| merged.try_take())
            .map(|r| r.as_str().to_string())
            .collect();
        assert_eq!(out, texts);
    }

    #[test]
    fn test_run_stops_on_shutdown() {
        let (_tx, rx) = bounded::<Record>(20);
        let shutdown = Shutdown::new();
        let f = fixture(rx, shutdown.clone());

        let handle = thread::spawn(move || f.dispatcher.run());
        thread::sleep(std::time::Duration::from_millis(20));
        shutdown.trigger();
        assert_eq!(handle.join().unwrap(), 0);
    }
}
