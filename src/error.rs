use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("Server error: {status} - {message}")]
    Server { status: u16, message: String },

    #[error("Malformed response to {operation}: {source}")]
    MalformedResponse {
        operation: &'static str,
        source: serde_json::Error,
    },

    #[error("Invalid book form: {0}")]
    InvalidForm(String),

    #[error("Couldn't read attachment {}: {source}", .path.display())]
    Attachment { path: PathBuf, source: io::Error },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Couldn't read config file {}: {source}", .path.display())]
    Config { path: PathBuf, source: io::Error },

    #[error("Couldn't parse config file {}: {source}", .path.display())]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound { .. })
    }

    /// HTTP status behind the failure, when the backend answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::NotFound { .. } => Some(404),
            ClientError::Server { status, .. } => Some(*status),
            ClientError::Request(err) => err.status().map(|status| status.as_u16()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}
