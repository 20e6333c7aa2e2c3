//! Record, channel set and queue role types

use crate::error::{Error, Result};
use std::fmt;
use std::sync::Arc;

/// Lines shorter than this are partial or bogus and never enter the pipeline.
pub const MIN_RECORD_LEN: usize = 18;

/// Lines starting with this marker are instrument comments.
pub const COMMENT_MARKER: char = '#';

/// One validated measurement line.
///
/// Immutable once created; clones share the same text buffer so the
/// dispatcher can copy a record into several queues without reallocating.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Record {
    text: Arc<str>,
}

/// Outcome of validating a raw line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineVerdict {
    /// Valid record, may enter the pipeline
    Accepted(Record),
    /// Starts with the comment marker
    Comment,
    /// Fewer than [`MIN_RECORD_LEN`] characters after trimming
    TooShort,
}

impl LineVerdict {
    /// The record, if the line was accepted
    pub fn accepted(self) -> Option<Record> {
        match self {
            LineVerdict::Accepted(record) => Some(record),
            _ => None,
        }
    }
}

impl Record {
    /// Trim a raw line and decide whether it is a record.
    pub fn classify(line: &str) -> LineVerdict {
        let line = line.trim();
        if line.starts_with(COMMENT_MARKER) {
            LineVerdict::Comment
        } else if line.chars().count() < MIN_RECORD_LEN {
            LineVerdict::TooShort
        } else {
            LineVerdict::Accepted(Record { text: line.into() })
        }
    }

    /// Record text without terminator
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Length in bytes (records are ASCII)
    #[inline]
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Always false for accepted records; present for API symmetry
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Substring test used for channel tagging
    #[inline]
    pub fn contains(&self, needle: &str) -> bool {
        self.text.contains(needle)
    }

    /// Newline-terminated wire frame
    pub fn frame(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(self.text.len() + 1);
        frame.extend_from_slice(self.text.as_bytes());
        frame.push(b'\n');
        frame
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Record({:?})", &*self.text)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Ordered channel identifiers, fixed at startup.
///
/// Index `i` owns the per-channel queue and port `base + 2 + i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSet {
    names: Vec<String>,
}

impl ChannelSet {
    /// Build a channel set, rejecting empty identifiers (they would match every record).
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if let Some(pos) = names.iter().position(|n| n.is_empty()) {
            return Err(Error::Config(format!(
                "channel identifier #{} is empty",
                pos
            )));
        }
        Ok(Self { names })
    }

    /// Number of channels
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True if no channels are configured
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Identifier at `index`
    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// Iterate identifiers in configured order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Indices of all channels whose identifier occurs in the record text
    pub fn matches(&self, record: &Record) -> Vec<usize> {
        self.names
            .iter()
            .enumerate()
            .filter(|(_, name)| record.contains(name))
            .map(|(i, _)| i)
            .collect()
    }
}

/// Role of an output queue and its publisher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueRole {
    /// Every record, arrival order
    Merged,
    /// Every record, sorted by the configured order
    TimeOrdered,
    /// Records tagged with channel `i`
    Channel(usize),
}

impl QueueRole {
    /// TCP port for this role relative to `base`
    pub fn port(self, base: u16) -> Result<u16> {
        let offset = match self {
            QueueRole::Merged => 0usize,
            QueueRole::TimeOrdered => 1,
            QueueRole::Channel(i) => 2 + i,
        };
        u16::try_from(base as usize + offset).map_err(|_| {
            Error::Config(format!(
                "port for {:?} overflows (base {} + {})",
                self, base, offset
            ))
        })
    }

    /// Short label used for thread names and log lines
    pub fn label(self, channels: &ChannelSet) -> String {
        match self {
            QueueRole::Merged => "merged".to_string(),
            QueueRole::TimeOrdered => "sorted".to_string(),
            QueueRole::Channel(i) => channels
                .name(i)
                .map(str::to_string)
                .unwrap_or_else(|| format!("ch{}", i)),
        }
    }
}
