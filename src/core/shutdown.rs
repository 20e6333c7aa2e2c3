//! Process-wide cancellation signal
//!
//! Every worker holds a clone of [`Shutdown`]. Polling loops check
//! [`Shutdown::is_triggered`]; blocking receives `select!` on
//! [`Shutdown::done`], which disconnects the moment shutdown is triggered.

use crossbeam_channel::{Receiver, Sender, bounded};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

struct Inner {
    triggered: AtomicBool,
    /// Dropped on trigger; never sent on
    done_tx: Mutex<Option<Sender<()>>>,
    done_rx: Receiver<()>,
    fatal: Mutex<Option<String>>,
}

/// Cloneable shutdown handle
#[derive(Clone)]
pub struct Shutdown {
    inner: Arc<Inner>,
}

impl Shutdown {
    /// Create an untriggered signal
    pub fn new() -> Self {
        let (done_tx, done_rx) = bounded(0);
        Self {
            inner: Arc::new(Inner {
                triggered: AtomicBool::new(false),
                done_tx: Mutex::new(Some(done_tx)),
                done_rx,
                fatal: Mutex::new(None),
            }),
        }
    }

    /// Request orderly shutdown (interrupt path)
    pub fn trigger(&self) {
        if !self.inner.triggered.swap(true, Ordering::SeqCst) {
            log::debug!("Shutdown triggered");
        }
        let mut tx = self
            .inner
            .done_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        tx.take();
    }

    /// Record a fatal fault and shut down.
    ///
    /// Only the first reason is kept.
    pub fn fail(&self, reason: impl Into<String>) {
        {
            let mut fatal = self.inner.fatal.lock().unwrap_or_else(|e| e.into_inner());
            if fatal.is_none() {
                *fatal = Some(reason.into());
            }
        }
        self.trigger();
    }

    /// True once `trigger` or `fail` was called
    #[inline]
    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::Relaxed)
    }

    /// Reason passed to the first `fail` call, if any
    pub fn fatal_reason(&self) -> Option<String> {
        self.inner
            .fatal
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Receiver that becomes disconnected on shutdown.
    ///
    /// Use inside `crossbeam_channel::select!` next to a data receiver.
    pub fn done(&self) -> &Receiver<()> {
        &self.inner.done_rx
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::RecvTimeoutError;
    use std::time::Duration;

    #[test]
    fn test_trigger_disconnects_done() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_triggered());
        assert_eq!(
            shutdown.done().recv_timeout(Duration::from_millis(10)),
            Err(RecvTimeoutError::Timeout)
        );

        shutdown.trigger();
        assert!(shutdown.is_triggered());
        assert_eq!(
            shutdown.done().recv_timeout(Duration::from_millis(10)),
            Err(RecvTimeoutError::Disconnected)
        );
        assert!(shutdown.fatal_reason().is_none());
    }

    #[test]
    fn test_clones_share_state() {
        let shutdown = Shutdown::new();
        let clone = shutdown.clone();
        clone.trigger();
        assert!(shutdown.is_triggered());
    }

    #[test]
    fn test_fail_keeps_first_reason() {
        let shutdown = Shutdown::new();
        shutdown.fail("ttyTICC0 read error");
        shutdown.fail("ttyTICC1 read error");
        assert!(shutdown.is_triggered());
        assert_eq!(
            shutdown.fatal_reason().as_deref(),
            Some("ttyTICC0 read error")
        );
    }
}
