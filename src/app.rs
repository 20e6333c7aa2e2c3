//! Pipeline wiring: queues, listeners and worker threads
//!
//! ```text
//! LineSource ×N ──▶ intake ──▶ Dispatcher ──┬──▶ merged       ──▶ PortPublisher (base)
//!                                            ├──▶ time-ordered ──▶ PortPublisher (base+1)
//!                                            └──▶ channel i    ──▶ PortPublisher (base+2+i)
//! ```
//!
//! [`Pipeline::bind`] does everything that can fail on configuration (queue
//! sizes, port numbers, listener binds) before any thread is started.

use crate::config::Config;
use crate::core::{ChannelSet, QueueRole, Record, Shutdown};
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::ingest::{LineSource, LineSourceStats};
use crate::queue::{
    FifoQueue, LeadingTimestampOrder, LexicalOrder, OrderKind, RecordQueue, SortedQueue,
};
use crate::streaming::{PortPublisher, PublisherStats};
use crate::transport::Transport;
use crossbeam_channel::{Receiver, Sender, bounded};
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Fully bound but not yet running pipeline
pub struct Pipeline {
    shutdown: Shutdown,
    channels: ChannelSet,
    intake_tx: Sender<Record>,
    intake_rx: Receiver<Record>,
    merged: Arc<dyn RecordQueue>,
    time_ordered: Arc<dyn RecordQueue>,
    channel_queues: Vec<Arc<dyn RecordQueue>>,
    publishers: Vec<PortPublisher>,
    addresses: Vec<(String, SocketAddr)>,
}

impl Pipeline {
    /// Validate `config`, create every queue and bind every listener.
    pub fn bind(config: &Config, shutdown: Shutdown) -> Result<Self> {
        config.validate()?;
        let channels = config.channel_set()?;
        let q = &config.queues;

        let (intake_tx, intake_rx) = bounded(q.intake);
        let merged: Arc<dyn RecordQueue> = Arc::new(FifoQueue::new("merged", q.merged));
        let time_ordered: Arc<dyn RecordQueue> = match q.order {
            OrderKind::Lexical => Arc::new(SortedQueue::new(
                "sorted",
                q.time_ordered,
                q.sort_window,
                LexicalOrder,
            )),
            OrderKind::Timestamp => Arc::new(SortedQueue::new(
                "sorted",
                q.time_ordered,
                q.sort_window,
                LeadingTimestampOrder,
            )),
        };
        let channel_queues: Vec<Arc<dyn RecordQueue>> = channels
            .iter()
            .map(|name| Arc::new(FifoQueue::new(name, q.per_channel)) as Arc<dyn RecordQueue>)
            .collect();

        let mut roles = vec![
            (QueueRole::Merged, Arc::clone(&merged)),
            (QueueRole::TimeOrdered, Arc::clone(&time_ordered)),
        ];
        roles.extend(
            channel_queues
                .iter()
                .enumerate()
                .map(|(i, queue)| (QueueRole::Channel(i), Arc::clone(queue))),
        );

        let mut publishers = Vec::with_capacity(roles.len());
        let mut addresses = Vec::with_capacity(roles.len());
        for (role, queue) in roles {
            let label = role.label(&channels);
            let port = role.port(config.network.base_port)?;
            let listener =
                TcpListener::bind((config.network.bind_host.as_str(), port)).map_err(|e| {
                    Error::Other(format!(
                        "Failed to bind {} port {}:{}: {}",
                        label, config.network.bind_host, port, e
                    ))
                })?;
            let addr = listener.local_addr()?;
            let publisher = PortPublisher::from_listener(&label, listener, queue, shutdown.clone())?
                .with_write_timeout(config.network.write_timeout());
            log::info!("{} data on {}", label, addr);
            addresses.push((label, addr));
            publishers.push(publisher);
        }

        Ok(Self {
            shutdown,
            channels,
            intake_tx,
            intake_rx,
            merged,
            time_ordered,
            channel_queues,
            publishers,
            addresses,
        })
    }

    /// Label and bound address of every publisher, merged first
    pub fn addresses(&self) -> &[(String, SocketAddr)] {
        &self.addresses
    }

    /// Spawn one thread per line source, the dispatcher and every publisher.
    ///
    /// `sources` pairs each instrument name (its device path) with its
    /// transport.
    pub fn start<T>(self, sources: Vec<(String, T)>) -> Result<PipelineHandles>
    where
        T: Transport + 'static,
    {
        let Pipeline {
            shutdown,
            channels,
            intake_tx,
            intake_rx,
            merged,
            time_ordered,
            channel_queues,
            publishers,
            addresses,
        } = self;

        let mut queues = vec![Arc::clone(&merged), Arc::clone(&time_ordered)];
        queues.extend(channel_queues.iter().cloned());

        // Publishers first so no record is produced without a consumer thread
        let mut publisher_handles = Vec::with_capacity(publishers.len());
        let mut publisher_stats = Vec::with_capacity(publishers.len());
        for (publisher, (label, _)) in publishers.into_iter().zip(&addresses) {
            publisher_stats.push((label.clone(), publisher.stats()));
            let handle = thread::Builder::new()
                .name(format!("pub-{}", label))
                .spawn(move || publisher.run())
                .map_err(|e| Error::Other(format!("Failed to spawn {} publisher: {}", label, e)))?;
            publisher_handles.push(handle);
        }

        let dispatcher = Dispatcher::new(
            intake_rx,
            merged,
            time_ordered,
            channels,
            channel_queues,
            shutdown.clone(),
        );
        let dispatcher_handle = thread::Builder::new()
            .name("dispatcher".to_string())
            .spawn(move || dispatcher.run())
            .map_err(|e| Error::Other(format!("Failed to spawn dispatcher: {}", e)))?;

        let mut source_handles = Vec::with_capacity(sources.len());
        let mut source_stats = Vec::with_capacity(sources.len());
        for (index, (name, transport)) in sources.into_iter().enumerate() {
            let source = LineSource::new(&name, transport, intake_tx.clone(), shutdown.clone());
            source_stats.push((name.clone(), source.stats()));
            let handle = thread::Builder::new()
                .name(format!("source-{}", index))
                .spawn(move || source.run())
                .map_err(|e| Error::Other(format!("Failed to spawn reader for {}: {}", name, e)))?;
            source_handles.push(handle);
        }
        // Dispatcher sees a disconnected intake once every source has exited
        drop(intake_tx);

        log::info!(
            "Pipeline running: {} sources, {} publishers",
            source_handles.len(),
            publisher_handles.len()
        );

        Ok(PipelineHandles {
            shutdown,
            sources: source_handles,
            dispatcher: dispatcher_handle,
            publishers: publisher_handles,
            source_stats,
            publisher_stats,
            queues,
            addresses,
        })
    }
}

/// Running pipeline
pub struct PipelineHandles {
    shutdown: Shutdown,
    sources: Vec<JoinHandle<Result<()>>>,
    dispatcher: JoinHandle<u64>,
    publishers: Vec<JoinHandle<()>>,
    source_stats: Vec<(String, Arc<LineSourceStats>)>,
    publisher_stats: Vec<(String, Arc<PublisherStats>)>,
    queues: Vec<Arc<dyn RecordQueue>>,
    addresses: Vec<(String, SocketAddr)>,
}

impl PipelineHandles {
    /// Label and bound address of every publisher, merged first
    pub fn addresses(&self) -> &[(String, SocketAddr)] {
        &self.addresses
    }

    /// Counters of every line source, in start order
    pub fn source_stats(&self) -> &[(String, Arc<LineSourceStats>)] {
        &self.source_stats
    }

    /// Counters of every publisher, merged first
    pub fn publisher_stats(&self) -> &[(String, Arc<PublisherStats>)] {
        &self.publisher_stats
    }

    /// Output queues, merged first
    pub fn queues(&self) -> &[Arc<dyn RecordQueue>] {
        &self.queues
    }

    /// Block until shutdown, join every thread and return the fatal reason.
    ///
    /// `None` means an orderly stop (interrupt or [`Self::stop`]).
    pub fn wait(self) -> Option<String> {
        // Only ever disconnects; nothing is sent on it
        let _ = self.shutdown.done().recv();
        log::info!("Shutting down...");

        for handle in self.sources {
            if handle.join().is_err() {
                log::error!("Line source thread panicked");
            }
        }
        match self.dispatcher.join() {
            Ok(processed) => log::debug!("Dispatcher processed {} records", processed),
            Err(_) => log::error!("Dispatcher thread panicked"),
        }
        for handle in self.publishers {
            if handle.join().is_err() {
                log::error!("Publisher thread panicked");
            }
        }

        for queue in &self.queues {
            let dropped = queue.dropped();
            if dropped > 0 {
                log::info!("{}: {} records dropped (queue full)", queue.name(), dropped);
            }
        }
        for (name, stats) in &self.source_stats {
            let (lines, comments, too_short, accepted, dropped) = stats.snapshot();
            log::info!(
                "{}: {} lines, {} comments, {} short, {} accepted, {} dropped",
                name,
                lines,
                comments,
                too_short,
                accepted,
                dropped
            );
        }

        self.shutdown.fatal_reason()
    }

    /// Trigger an orderly shutdown and wait for it
    pub fn stop(self) -> Option<String> {
        self.shutdown.trigger();
        self.wait()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use std::io::{BufRead, BufReader};
    use std::net::TcpStream;
    use std::time::Duration;

    fn local_config(base_port: u16) -> Config {
        let mut config = Config::default();
        config.network.bind_host = "127.0.0.1".to_string();
        config.network.base_port = base_port;
        config.channels.names = vec!["chA".to_string(), "chB".to_string()];
        config
    }

    /// Bind on a free port range, retrying on collisions
    fn bind_somewhere(config: &mut Config) -> Pipeline {
        for attempt in 0..50u16 {
            let base = 20000 + (std::process::id() as u16 % 1000) * 20 + attempt * 7;
            config.network.base_port = base;
            if let Ok(pipeline) = Pipeline::bind(config, Shutdown::new()) {
                return pipeline;
            }
        }
        panic!("no free port range found");
    }

    #[test]
    fn test_bind_assigns_ports_in_role_order() {
        let mut config = local_config(0);
        let pipeline = bind_somewhere(&mut config);
        let base = config.network.base_port;

        let labels: Vec<(&str, u16)> = pipeline
            .addresses()
            .iter()
            .map(|(l, a)| (l.as_str(), a.port()))
            .collect();
        assert_eq!(
            labels,
            vec![
                ("merged", base),
                ("sorted", base + 1),
                ("chA", base + 2),
                ("chB", base + 3)
            ]
        );
    }

    #[test]
    fn test_bind_rejects_invalid_config() {
        let mut config = local_config(9190);
        config.queues.sort_window = 60;
        assert!(matches!(
            Pipeline::bind(&config, Shutdown::new()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_port_in_use_fails_bind() {
        let mut config = local_config(0);
        let first = bind_somewhere(&mut config);
        assert!(Pipeline::bind(&config, Shutdown::new()).is_err());
        drop(first);
    }

    #[test]
    fn test_stop_without_fault() {
        let mut config = local_config(0);
        let pipeline = bind_somewhere(&mut config);
        let mock = MockTransport::new();
        let handles = pipeline
            .start(vec![("/dev/ttyTICC0".to_string(), mock)])
            .unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(handles.stop(), None);
    }

    #[test]
    fn test_record_reaches_channel_port() {
        let mut config = local_config(0);
        let pipeline = bind_somewhere(&mut config);
        let cha_addr = pipeline.addresses()[2].1;

        let mock = MockTransport::new();
        let handles = pipeline
            .start(vec![("/dev/ttyTICC0".to_string(), mock.clone())])
            .unwrap();

        let client = TcpStream::connect(cha_addr).unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(3)))
            .unwrap();
        let cha_stats = Arc::clone(&handles.publisher_stats()[2].1);
        while cha_stats.connections() == 0 {
            std::thread::sleep(Duration::from_millis(5));
        }

        mock.inject_lines(&["partial", "1623091234.001 1.000e-09 chA"]);
        let mut reader = BufReader::new(client);
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        assert_eq!(line, "1623091234.001 1.000e-09 chA\n");

        assert_eq!(handles.stop(), None);
    }
}
