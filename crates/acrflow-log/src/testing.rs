//! Test doubles shared by the tailer and orchestrator tests.

use crate::append_log::{AppendLog, LogChunk, LogSource};
use crate::error::{LogError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Replays scripted fetch results, then reports "nothing new" forever.
pub struct ScriptedLog {
    script: VecDeque<Result<LogChunk>>,
    offsets: Arc<Mutex<Vec<u64>>>,
}

impl ScriptedLog {
    pub fn new(script: Vec<Result<LogChunk>>) -> Self {
        Self {
            script: script.into(),
            offsets: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Offsets requested so far.
    pub fn offsets(&self) -> Arc<Mutex<Vec<u64>>> {
        Arc::clone(&self.offsets)
    }
}

#[async_trait]
impl AppendLog for ScriptedLog {
    async fn fetch(&mut self, offset: u64) -> Result<LogChunk> {
        self.offsets.lock().unwrap().push(offset);
        self.script.pop_front().unwrap_or_else(|| Ok(LogChunk::empty()))
    }
}

/// Hands out one prepared [`ScriptedLog`].
pub struct ScriptedSource {
    log: Mutex<Option<ScriptedLog>>,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<LogChunk>>) -> Self {
        Self {
            log: Mutex::new(Some(ScriptedLog::new(script))),
        }
    }
}

impl LogSource for ScriptedSource {
    fn open(&self, location: &str) -> Result<Box<dyn AppendLog>> {
        match self.log.lock().unwrap().take() {
            Some(log) => Ok(Box::new(log)),
            None => Err(LogError::InvalidLocation(format!("already opened: {}", location))),
        }
    }
}
