//! Error types for gsnd-ap
//!
//! Defines module-specific error types using thiserror for clear error propagation.
//! Per-pipeline errors travel to the engine inside a completion report; argument
//! errors are returned synchronously from the engine API.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for gsnd-ap
#[derive(Error, Debug)]
pub enum Error {
    /// Source file could not be opened or mapped
    #[error("Failed to open {path}: {reason}")]
    OpenFailed { path: PathBuf, reason: String },

    /// Audio decoding errors
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Playback device could not be opened or configured
    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Invalid request (bad index, empty playlist, bad pool geometry)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Bounded resource is full (effect queue)
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Blocking operation aborted because the owning pipeline was stopped
    #[error("Operation cancelled")]
    Cancelled,

    /// Configuration loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from the shared library
    #[error(transparent)]
    Common(#[from] gsnd_common::Error),
}

/// Convenience Result type using gsnd-ap Error
pub type Result<T> = std::result::Result<T, Error>;
