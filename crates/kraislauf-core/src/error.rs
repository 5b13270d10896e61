use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Which remote operation a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Chat,
    Upload,
}

impl Operation {
    pub fn path(&self) -> &'static str {
        match self {
            Operation::Chat => "/api/chat",
            Operation::Upload => "/api/upload",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Chat => f.write_str("chat"),
            Operation::Upload => f.write_str("upload"),
        }
    }
}

/// The only failure the assistant service client reports upward.
///
/// Transport errors, non-success statuses, timeouts and malformed bodies all
/// collapse into this; the concrete cause is logged where it happens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("{operation} request to the assistant service failed")]
    RemoteCallFailed { operation: Operation },
}

impl ClientError {
    pub fn failed(operation: Operation) -> Self {
        Self::RemoteCallFailed { operation }
    }
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Could not read image {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} is not an image")]
    NotAnImage(String),

    #[error("{0} is empty")]
    Empty(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
}
