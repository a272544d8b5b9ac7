use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum BatcherError {
    #[error("invalid batch name: {0}")]
    InvalidBatchName(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("no listing endpoint configured (set \"endpoint\" or pass --endpoint)")]
    MissingEndpoint,

    #[error("listing request failed: {0}")]
    UpstreamHttp(String),

    #[error("listing returned status {status}: {message}")]
    UpstreamStatus { status: u16, message: String },

    #[error("listing body is not a JSON array: {0}")]
    UpstreamBody(String),

    #[error("download of {url} failed: {message}")]
    DownloadHttp { url: String, message: String },

    #[error("download of {url} returned status {status}")]
    DownloadStatus { url: String, status: u16 },

    #[error("failed to read ledger at {path}: {message}")]
    LedgerRead { path: String, message: String },

    #[error("ledger at {path} is corrupt: {message}")]
    LedgerCorrupt { path: String, message: String },

    #[error("failed to persist ledger: {0}")]
    LedgerWrite(String),

    #[error("ledger already records {0}")]
    DuplicateRecord(String),

    #[error("{0} already exists in its batch directory")]
    FileExists(String),

    #[error("gallery path rejected: {0}")]
    InvalidGalleryPath(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl BatcherError {
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            BatcherError::UpstreamHttp(_)
                | BatcherError::UpstreamStatus { .. }
                | BatcherError::UpstreamBody(_)
        )
    }
}
