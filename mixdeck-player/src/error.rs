//! Error types for mixdeck-player
//!
//! Defines player error types using thiserror for clear error propagation.
//! Session-start errors are handled inside the pipeline's start transition;
//! they are logged and published as events, never returned to the control loop.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for mixdeck-player
#[derive(Error, Debug)]
pub enum Error {
    /// Storage could not find the requested file
    #[error("File not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// RIFF/WAVE header failed validation
    #[error("Invalid WAV header: {reason}")]
    InvalidHeader { reason: String },

    /// Read, seek or open failure on the storage device
    #[error("Storage error on {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Raw I/O error on an already opened stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Buffer allocation or worker thread creation failed
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Audio sink start/write/stop failure
    #[error("Audio sink error: {0}")]
    Sink(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation not valid in the current pipeline state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Errors from the shared common crate
    #[error(transparent)]
    Common(#[from] mixdeck_common::Error),
}

impl Error {
    /// Wrap an I/O error with the path it occurred on.
    ///
    /// `NotFound` is mapped to [`Error::NotFound`] so callers can tell a
    /// missing file from a failing card.
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound { path }
        } else {
            Error::Storage { path, source }
        }
    }

    /// Header validation failure
    pub fn invalid_header(reason: impl Into<String>) -> Self {
        Error::InvalidHeader {
            reason: reason.into(),
        }
    }
}

/// Convenience Result type using mixdeck-player Error
pub type Result<T> = std::result::Result<T, Error>;
