//! acrflow build log streaming
//!
//! Tails the append-only log of a remote build and mirrors it line by line into
//! the job output, with cooperative cancellation.
//!
//! ```text
//! RegistryClient ──log_location──▶ LogSource::open ──▶ AppendLog
//!                                                          │ fetch(offset)
//!                     BuildLogOrchestrator ◀── LogTailer ◀─┘
//!                              │
//!                              ▼
//!                         StatusSink
//! ```

pub mod append_log;
pub mod blob;
pub mod error;
pub mod orchestrator;
pub mod session;
pub mod sink;
pub mod tailer;

#[cfg(test)]
mod testing;

pub use append_log::{AppendLog, Completion, LogChunk, LogSource};
pub use blob::{BlobAppendLog, BlobLogSource};
pub use error::{LogError, Result};
pub use orchestrator::BuildLogOrchestrator;
pub use session::BuildSession;
pub use sink::{ConsoleSink, MemorySink, StatusSink};
pub use tailer::{LogTailer, MAX_LINE_BYTES, TailEvent, TailState, TerminalState};
