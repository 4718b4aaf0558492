use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum HarvestError {
    #[error("invalid contract id: {0}")]
    InvalidContractId(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("failed to read id source at {0}")]
    IdSourceRead(PathBuf),

    #[error("--resume needs a checkpoint file (set output.checkpoint in the config)")]
    ResumeWithoutCheckpoint,

    #[error("API request failed: {0}")]
    ApiHttp(String),

    #[error("API returned status {status}: {message}")]
    ApiStatus { status: u16, message: String },

    #[error("browser session failed: {0}")]
    Browser(String),

    #[error("timed out waiting for {0}")]
    BrowserTimeout(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("archive failed: {0}")]
    Archive(String),
}

impl HarvestError {
    /// HTTP status carried by the error, if the remote side produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            HarvestError::ApiStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}
