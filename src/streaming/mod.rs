//! TCP output: one publisher per output queue

pub mod port_publisher;

pub use port_publisher::{PortPublisher, PublisherState, PublisherStats};
