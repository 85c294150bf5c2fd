//! Append-only remote log abstraction

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// Final status recorded by the producer once it stops appending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Success,
    Failure,
}

impl Completion {
    /// Interpret the completion marker stored alongside the log.
    pub fn from_marker(value: &str) -> Self {
        let value = value.trim();
        if value.eq_ignore_ascii_case("successful") || value.eq_ignore_ascii_case("succeeded") {
            Completion::Success
        } else {
            Completion::Failure
        }
    }
}

/// Bytes read from a log at some offset.
#[derive(Debug, Clone, Default)]
pub struct LogChunk {
    pub data: Bytes,
    /// `Some` only when nothing will ever be appended after this chunk.
    pub completion: Option<Completion>,
}

impl LogChunk {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            completion: None,
        }
    }

    pub fn complete(mut self, completion: Completion) -> Self {
        self.completion = Some(completion);
        self
    }
}

/// A remote log that only grows.
#[async_trait]
pub trait AppendLog: Send {
    /// Read whatever exists at `offset` and beyond.
    ///
    /// An empty chunk without completion means "nothing new yet".
    async fn fetch(&mut self, offset: u64) -> Result<LogChunk>;
}

/// Opens an [`AppendLog`] for a location handed out by the registry.
pub trait LogSource: Send + Sync {
    fn open(&self, location: &str) -> Result<Box<dyn AppendLog>>;
}
