use acrflow_registry::RegistryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Log storage returned {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("Invalid log location: {0}")]
    InvalidLocation(String),

    /// The read was interrupted; the tailer reports this as a cancellation.
    #[error("Log read interrupted")]
    Interrupted,

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LogError {
    pub fn is_interrupted(&self) -> bool {
        match self {
            LogError::Interrupted => true,
            LogError::Io(e) => e.kind() == std::io::ErrorKind::Interrupted,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, LogError>;
