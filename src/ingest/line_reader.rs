//! Newline framing over a byte transport

use crate::error::{Error, Result};
use crate::transport::Transport;

/// Longest line accepted before the buffer is discarded
pub const MAX_LINE_LEN: usize = 1024;

/// Bytes requested per transport read
const READ_CHUNK: usize = 256;

/// Accumulates transport bytes and splits them into lines
pub struct LineReader {
    buffer: Vec<u8>,
    /// Set after an overlong line; bytes are skipped until the next newline
    resyncing: bool,
    overflows: u64,
}

impl LineReader {
    /// Create an empty reader
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MAX_LINE_LEN),
            resyncing: false,
            overflows: 0,
        }
    }

    /// Number of overlong lines discarded so far
    pub fn overflows(&self) -> u64 {
        self.overflows
    }

    /// Next complete line as raw bytes, without the `\n` or a trailing `\r`.
    ///
    /// Returns `Ok(None)` if the transport had nothing within its timeout.
    pub fn next_raw<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<Option<Vec<u8>>> {
        loop {
            if let Some(line) = self.split_line() {
                return Ok(Some(line));
            }

            let mut chunk = [0u8; READ_CHUNK];
            let n = transport.read(&mut chunk)?;
            if n == 0 {
                return Ok(None);
            }
            self.push(&chunk[..n]);
        }
    }

    /// Next complete line decoded as ASCII text.
    ///
    /// Non-ASCII content is a decode fault.
    pub fn next_line<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<Option<String>> {
        match self.next_raw(transport)? {
            None => Ok(None),
            Some(raw) => decode_ascii(raw).map(Some),
        }
    }

    fn push(&mut self, bytes: &[u8]) {
        for &b in bytes {
            if self.resyncing {
                if b == b'\n' {
                    self.resyncing = false;
                }
                continue;
            }
            self.buffer.push(b);
            if b != b'\n' && self.buffer.len() > MAX_LINE_LEN && !self.buffer.contains(&b'\n') {
                self.overflows += 1;
                log::warn!(
                    "Discarding {} bytes without line terminator",
                    self.buffer.len()
                );
                self.buffer.clear();
                self.resyncing = true;
            }
        }
    }

    fn split_line(&mut self) -> Option<Vec<u8>> {
        let pos = self.buffer.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(line)
    }
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode a raw line as ASCII; anything else is a decode fault
pub(crate) fn decode_ascii(raw: Vec<u8>) -> Result<String> {
    if let Some(pos) = raw.iter().position(|b| !b.is_ascii()) {
        return Err(Error::Decode(format!(
            "non-ASCII byte 0x{:02X} at offset {}",
            raw[pos], pos
        )));
    }
    String::from_utf8(raw).map_err(|e| Error::Decode(e.to_string()))
}
