use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Invalid ignore pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Ignore file not found: {0}")]
    IgnoreFileNotFound(PathBuf),

    #[error("Failed to create archive {path}: {source}")]
    CreateArchive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to add {path} to archive: {source}")]
    AddEntry {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContextError {
    /// ユーザー向けの分かりやすいエラーメッセージ
    pub fn user_message(&self) -> String {
        match self {
            ContextError::InvalidPattern { pattern, reason } => {
                format!(
                    "Ignore pattern '{}' could not be parsed: {}\n\
                     \n\
                     Patterns use shell glob syntax (*, ?, [abc], **).\n\
                     Prefix a pattern with '!' to force-include matching paths.",
                    pattern, reason
                )
            }
            ContextError::IgnoreFileNotFound(path) => {
                format!(
                    "Ignore file not found: {}\n\
                     \n\
                     Check the ignore_file setting or remove it to package everything.",
                    path.display()
                )
            }
            _ => format!("{}", self),
        }
    }

    /// Whether the error was raised before any archive work started.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ContextError::InvalidPattern { .. } | ContextError::IgnoreFileNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ContextError>;
