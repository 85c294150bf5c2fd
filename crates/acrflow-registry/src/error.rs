//! Registry client error types

use thiserror::Error;

/// Registry control-plane errors
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Registry API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Build not found: {0}")]
    BuildNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RegistryError {
    /// ユーザー向けの分かりやすいエラーメッセージ
    pub fn user_message(&self) -> String {
        match self {
            RegistryError::AuthenticationFailed(detail) => format!(
                "Registry rejected the access token: {}\n\
                 \n\
                 Refresh it, for example with:\n\
                 \x20 export ACRFLOW_ACCESS_TOKEN=$(az account get-access-token --query accessToken -o tsv)",
                detail
            ),
            RegistryError::BuildNotFound(id) => format!(
                "Build '{}' was not found.\n\
                 \n\
                 Check the build id and the --registry / --resource-group settings.",
                id
            ),
            _ => format!("{}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
