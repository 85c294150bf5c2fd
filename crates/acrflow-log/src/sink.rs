//! Job status output

use colored::Colorize;

/// Ordered, one-way console output of the invoking job.
pub trait StatusSink: Send {
    fn log_status(&mut self, message: &str);
    fn log_error(&mut self, message: &str);
}

/// Build log lines to stdout, errors to stderr.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl StatusSink for ConsoleSink {
    fn log_status(&mut self, message: &str) {
        println!("{}", message);
    }

    fn log_error(&mut self, message: &str) {
        eprintln!("{}", message.red());
    }
}

/// Keeps everything in memory, for embedding and tests.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub status: Vec<String>,
    pub errors: Vec<String>,
}

impl StatusSink for MemorySink {
    fn log_status(&mut self, message: &str) {
        self.status.push(message.to_string());
    }

    fn log_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }
}
