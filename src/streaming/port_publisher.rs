//! Port publisher: streams one output queue to one TCP client at a time.
//!
//! # Wire format
//!
//! Plain ASCII, one record per line, `\n` terminated. No header, no
//! handshake; a client is just a byte-stream consumer.
//!
//! # Connection lifecycle
//!
//! ```text
//! Listening ──accept──▶ Draining ──▶ Streaming ──write error──▶ Listening
//! ```
//!
//! 1. The listener is bound at startup and polled non-blocking so the
//!    shutdown flag is observed.
//! 2. On accept, the queue backlog is discarded so the client never sees
//!    records that piled up while nobody was connected.
//! 3. Records are taken from the queue (blocking, per its release
//!    discipline) and written to the socket.
//! 4. Any write error closes the connection and returns to listening. The
//!    queue keeps filling (and dropping) while no client is attached.
//!
//! A second client connecting while one is being served waits in the
//! listen backlog until the first disconnects.

use crate::core::{Record, Shutdown};
use crate::error::Result;
use crate::queue::RecordQueue;
use std::io::{ErrorKind, Write};
use std::net::{Shutdown as SocketShutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

/// Sleep between accept polls when no client is pending
const ACCEPT_POLL: Duration = Duration::from_millis(10);

/// Publisher connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublisherState {
    /// Waiting for a client
    Listening,
    /// Discarding stale backlog for a fresh client
    Draining,
    /// Forwarding records to the client
    Streaming,
}

/// Counters for one publisher, readable from other threads
#[derive(Debug, Default)]
pub struct PublisherStats {
    /// Clients accepted
    pub connections: AtomicU64,
    /// Records discarded by drain-on-connect
    pub drained: AtomicU64,
    /// Records written to clients
    pub sent: AtomicU64,
    /// Connections closed after a socket error
    pub disconnects: AtomicU64,
}

impl PublisherStats {
    /// Clients accepted so far
    pub fn connections(&self) -> u64 {
        self.connections.load(Ordering::Relaxed)
    }

    /// Records written so far
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Records discarded on connect so far
    pub fn drained(&self) -> u64 {
        self.drained.load(Ordering::Relaxed)
    }

    /// Connections lost to socket errors so far
    pub fn disconnects(&self) -> u64 {
        self.disconnects.load(Ordering::Relaxed)
    }
}

/// How a streaming session ended
enum SessionEnd {
    /// Socket error; go back to listening
    ClientLost,
    /// Process shutdown
    Shutdown,
}

/// Serves one output queue on one TCP port
pub struct PortPublisher {
    label: String,
    listener: TcpListener,
    queue: Arc<dyn RecordQueue>,
    shutdown: Shutdown,
    write_timeout: Option<Duration>,
    stats: Arc<PublisherStats>,
}

impl PortPublisher {
    /// Bind `addr` and prepare to serve `queue`.
    pub fn bind(
        label: impl Into<String>,
        addr: SocketAddr,
        queue: Arc<dyn RecordQueue>,
        shutdown: Shutdown,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)?;
        Self::from_listener(label, listener, queue, shutdown)
    }

    /// Serve `queue` on an already bound listener
    pub fn from_listener(
        label: impl Into<String>,
        listener: TcpListener,
        queue: Arc<dyn RecordQueue>,
        shutdown: Shutdown,
    ) -> Result<Self> {
        listener.set_nonblocking(true)?;
        Ok(Self {
            label: label.into(),
            listener,
            queue,
            shutdown,
            write_timeout: None,
            stats: Arc::new(PublisherStats::default()),
        })
    }

    /// Fail writes that stall longer than `timeout` (treated as a lost client)
    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared counters for this publisher
    pub fn stats(&self) -> Arc<PublisherStats> {
        Arc::clone(&self.stats)
    }

    /// Accept/stream loop; returns on shutdown
    pub fn run(self) {
        let port = self.listener.local_addr().map(|a| a.port()).unwrap_or(0);
        log::info!(
            "Listening and ready to send {} data on port {}",
            self.label,
            port
        );

        let mut state = PublisherState::Listening;
        while !self.shutdown.is_triggered() {
            debug_assert_eq!(state, PublisherState::Listening);
            let (stream, addr) = match self.listener.accept() {
                Ok(conn) => conn,
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL);
                    continue;
                }
                Err(e) => {
                    log::error!("{}: accept error: {}", self.label, e);
                    thread::sleep(ACCEPT_POLL);
                    continue;
                }
            };

            if let Err(e) = self.prepare(&stream) {
                log::warn!("{}: failed to configure client {}: {}", self.label, addr, e);
                continue;
            }
            log::info!("{}: client connection accepted from {}", self.label, addr);

            state = PublisherState::Draining;
            log::debug!("{}: {:?}", self.label, state);
            let drained = self.queue.drain();
            self.stats
                .drained
                .fetch_add(drained as u64, Ordering::Relaxed);
            if drained > 0 {
                log::debug!("{}: discarded {} stale records", self.label, drained);
            }
            // Counted only once the backlog is gone
            self.stats.connections.fetch_add(1, Ordering::Relaxed);

            state = PublisherState::Streaming;
            log::debug!("{}: {:?}", self.label, state);
            let end = self.stream_to(stream, addr);

            state = PublisherState::Listening;
            if let SessionEnd::Shutdown = end {
                break;
            }
        }

        log::info!(
            "{}: publisher exiting ({} records sent to {} clients)",
            self.label,
            self.stats.sent(),
            self.stats.connections()
        );
    }

    fn prepare(&self, stream: &TcpStream) -> std::io::Result<()> {
        stream.set_nonblocking(false)?;
        stream.set_write_timeout(self.write_timeout)?;
        stream.set_nodelay(true)?;
        Ok(())
    }

    fn stream_to(&self, mut stream: TcpStream, addr: SocketAddr) -> SessionEnd {
        loop {
            let Some(record) = self.queue.take(&self.shutdown) else {
                let _ = stream.shutdown(SocketShutdown::Both);
                log::info!("{}: closing client {} for shutdown", self.label, addr);
                return SessionEnd::Shutdown;
            };

            if let Err(e) = Self::send(&mut stream, &record) {
                self.stats.disconnects.fetch_add(1, Ordering::Relaxed);
                log::info!("{}: client connection closed by {} ({})", self.label, addr, e);
                let _ = stream.shutdown(SocketShutdown::Both);
                return SessionEnd::ClientLost;
            }
            self.stats.sent.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn send(stream: &mut TcpStream, record: &Record) -> std::io::Result<()> {
        stream.write_all(&record.frame())
    }
}
