//! Priority queue that doubles as a time sorter
//!
//! Records arriving from several instruments interleave slightly out of
//! order. The queue keeps at least `min_depth` records buffered and only
//! releases the smallest one when the depth exceeds that window, so a late
//! record still gets a chance to overtake records queued ahead of it.

use super::order::RecordOrder;
use super::{DropTally, RecordQueue};
use crate::core::{Record, Shutdown};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// How often a blocked consumer rechecks the shutdown flag
const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

/// Heap entry; `seq` keeps equal keys in arrival order
struct Entry<K> {
    key: K,
    seq: u64,
    record: Record,
}

impl<K: Ord> PartialEq for Entry<K> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<K: Ord> Eq for Entry<K> {}

impl<K: Ord> PartialOrd for Entry<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: Ord> Ord for Entry<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

struct State<K> {
    heap: BinaryHeap<Reverse<Entry<K>>>,
    next_seq: u64,
}

/// Bounded min-heap with a depth-gated pop
pub struct SortedQueue<O: RecordOrder> {
    order: O,
    state: Mutex<State<O::Key>>,
    available: Condvar,
    capacity: usize,
    min_depth: usize,
    drops: DropTally,
}

impl<O: RecordOrder> SortedQueue<O> {
    /// Create a queue holding at most `capacity` records that releases
    /// only while more than `min_depth` are buffered.
    pub fn new(name: impl Into<String>, capacity: usize, min_depth: usize, order: O) -> Self {
        Self {
            order,
            state: Mutex::new(State {
                heap: BinaryHeap::with_capacity(capacity),
                next_seq: 0,
            }),
            available: Condvar::new(),
            capacity,
            min_depth,
            drops: DropTally::new(name),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<O::Key>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn pop_releasable(&self, state: &mut State<O::Key>) -> Option<Record> {
        if state.heap.len() > self.min_depth {
            state.heap.pop().map(|Reverse(entry)| entry.record)
        } else {
            None
        }
    }
}

impl<O: RecordOrder> RecordQueue for SortedQueue<O> {
    fn name(&self) -> &str {
        self.drops.name()
    }

    fn offer(&self, record: Record) -> bool {
        let mut state = self.lock();
        if state.heap.len() >= self.capacity {
            drop(state);
            self.drops.record(&record);
            return false;
        }
        let key = self.order.key(&record);
        let seq = state.next_seq;
        state.next_seq += 1;
        state.heap.push(Reverse(Entry { key, seq, record }));
        let releasable = state.heap.len() > self.min_depth;
        drop(state);

        if releasable {
            self.available.notify_one();
        }
        true
    }

    fn take(&self, shutdown: &Shutdown) -> Option<Record> {
        let mut state = self.lock();
        loop {
            if shutdown.is_triggered() {
                return None;
            }
            if let Some(record) = self.pop_releasable(&mut state) {
                return Some(record);
            }
            state = match self.available.wait_timeout(state, SHUTDOWN_POLL) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    fn try_take(&self) -> Option<Record> {
        let mut state = self.lock();
        self.pop_releasable(&mut state)
    }

    fn drain(&self) -> usize {
        let mut state = self.lock();
        let drained = state.heap.len();
        state.heap.clear();
        drained
    }

    fn len(&self) -> usize {
        self.lock().heap.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn dropped(&self) -> u64 {
        self.drops.total()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::order::{LeadingTimestampOrder, LexicalOrder};
    use std::sync::Arc;
    use std::thread;

    fn record(text: &str) -> Record {
        Record::classify(text).accepted().expect("valid record")
    }

    fn stamped(i: usize) -> Record {
        record(&format!("16230912{:02}.000000000000 chA", i))
    }

    #[test]
    fn test_no_release_at_or_below_window() {
        let queue = SortedQueue::new("sorted", 50, 20, LexicalOrder);
        for i in 0..20 {
            assert!(queue.offer(stamped(i)));
        }
        assert_eq!(queue.len(), 20);
        assert!(queue.try_take().is_none());

        assert!(queue.offer(stamped(20)));
        assert!(queue.try_take().is_some());
        assert_eq!(queue.len(), 20);
        assert!(queue.try_take().is_none());
    }

    #[test]
    fn test_releases_smallest_first() {
        let queue = SortedQueue::new("sorted", 50, 20, LexicalOrder);
        // Insert newest first
        for i in (0..25).rev() {
            queue.offer(stamped(i));
        }

        let released: Vec<Record> = std::iter::from_fn(|| queue.try_take()).collect();
        assert_eq!(released.len(), 5);
        for (i, r) in released.iter().enumerate() {
            assert_eq!(r, &stamped(i));
        }
    }

    #[test]
    fn test_capacity_bound() {
        let queue = SortedQueue::new("sorted", 50, 20, LexicalOrder);
        for i in 0..60 {
            queue.offer(stamped(i));
        }
        assert_eq!(queue.len(), 50);
        assert_eq!(queue.dropped(), 10);
    }

    #[test]
    fn test_equal_keys_keep_arrival_order() {
        let queue = SortedQueue::new("sorted", 10, 0, LeadingTimestampOrder);
        // Same timestamp, different trailing text; timestamp order ties fall back to text
        let a = record("1623091234.5 1.000e-09 chB");
        let b = record("1623091234.5 1.000e-09 chA");
        queue.offer(a.clone());
        queue.offer(b.clone());
        assert_eq!(queue.try_take(), Some(b));
        assert_eq!(queue.try_take(), Some(a));

        // Identical records come out in insertion order
        let same = record("1623091235.0 1.000e-09 chA");
        queue.offer(same.clone());
        queue.offer(same.clone());
        assert_eq!(queue.try_take(), Some(same.clone()));
        assert_eq!(queue.try_take(), Some(same));
    }

    #[test]
    fn test_drain_empties_heap() {
        let queue = SortedQueue::new("sorted", 50, 20, LexicalOrder);
        for i in 0..30 {
            queue.offer(stamped(i));
        }
        assert_eq!(queue.drain(), 30);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_take_wakes_when_window_exceeded() {
        let queue = Arc::new(SortedQueue::new("sorted", 50, 2, LexicalOrder));
        let shutdown = Shutdown::new();

        let consumer = {
            let queue = Arc::clone(&queue);
            let shutdown = shutdown.clone();
            thread::spawn(move || queue.take(&shutdown))
        };

        queue.offer(stamped(3));
        queue.offer(stamped(1));
        queue.offer(stamped(2));

        assert_eq!(consumer.join().unwrap(), Some(stamped(1)));
    }

    #[test]
    fn test_take_observes_shutdown() {
        let queue = Arc::new(SortedQueue::new("sorted", 50, 20, LexicalOrder));
        let shutdown = Shutdown::new();
        queue.offer(stamped(1));

        let consumer = {
            let queue = Arc::clone(&queue);
            let shutdown = shutdown.clone();
            thread::spawn(move || queue.take(&shutdown))
        };

        thread::sleep(Duration::from_millis(20));
        shutdown.trigger();
        assert_eq!(consumer.join().unwrap(), None);
        // Buffered record is left in place
        assert_eq!(queue.len(), 1);
    }
}
