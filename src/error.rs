//! Error types for chitra-cam

use std::path::PathBuf;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Chitra-cam error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No data arrived within the configured read timeout
    #[error("Read timed out")]
    Timeout,

    /// Peer closed the connection, or the socket is not usable
    #[error("Connection error: {0}")]
    Connection(String),

    /// Malformed or oversized wire message
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Operation invalid for the current connection/streaming state
    #[error("Invalid state: {0}")]
    State(String),

    /// Image decode failure
    #[error("Image decode error: {0}")]
    Decode(#[from] image::ImageError),

    /// Wire serialization failure
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// No image files found under the configured root
    #[error("No image files found under {}", .0.display())]
    NoImages(PathBuf),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
