//! Scripted transport for tests and hardware-free runs

use super::Transport;
use crate::error::Result;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

enum Step {
    Data(Vec<u8>),
    Fail(io::ErrorKind),
}

/// Mock transport fed from another thread.
///
/// Clones share the same script, so a test can keep one handle and move the
/// other into a line source.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<VecDeque<Step>>>,
}

impl MockTransport {
    /// Create a new mock transport with nothing to read
    pub fn new() -> Self {
        MockTransport {
            inner: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Inject bytes to be read
    pub fn inject_read(&self, data: &[u8]) {
        self.lock().push_back(Step::Data(data.to_vec()));
    }

    /// Inject text lines, each terminated with `\r\n` like the instrument does
    pub fn inject_lines<S: AsRef<str>>(&self, lines: &[S]) {
        let mut bytes = Vec::new();
        for line in lines {
            bytes.extend_from_slice(line.as_ref().as_bytes());
            bytes.extend_from_slice(b"\r\n");
        }
        self.inject_read(&bytes);
    }

    /// Make the next read fail once all earlier data is consumed
    pub fn inject_error(&self, kind: io::ErrorKind) {
        self.lock().push_back(Step::Fail(kind));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Step>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut script = self.lock();
        match script.pop_front() {
            None => {
                drop(script);
                // Behave like a serial read timeout
                std::thread::sleep(std::time::Duration::from_millis(1));
                Ok(0)
            }
            Some(Step::Fail(kind)) => Err(io::Error::new(kind, "injected fault").into()),
            Some(Step::Data(mut data)) => {
                let n = data.len().min(buffer.len());
                buffer[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    script.push_front(Step::Data(data.split_off(n)));
                }
                Ok(n)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_in_chunks() {
        let mut mock = MockTransport::new();
        mock.inject_read(b"abcdef");

        let mut buf = [0u8; 4];
        assert_eq!(mock.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(mock.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");
        assert_eq!(mock.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_injected_error_after_data() {
        let mut mock = MockTransport::new();
        mock.inject_read(b"ok");
        mock.inject_error(io::ErrorKind::BrokenPipe);

        let mut buf = [0u8; 16];
        assert_eq!(mock.read(&mut buf).unwrap(), 2);
        assert!(mock.read(&mut buf).is_err());
        // Script exhausted; reads behave like a timeout again
        assert_eq!(mock.read(&mut buf).unwrap(), 0);
    }
}
