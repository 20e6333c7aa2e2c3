//! Transport layer for instrument byte streams

use crate::error::Result;

pub mod mock;
mod serial;

pub use mock::MockTransport;
pub use serial::SerialTransport;

/// Byte source for one instrument
pub trait Transport: Send {
    /// Read data into buffer, returns number of bytes read.
    ///
    /// `Ok(0)` means nothing arrived within the read timeout; callers use it
    /// to poll for shutdown. A vanished device must surface as an error.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;
}
