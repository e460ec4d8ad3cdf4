//! # Error Types
//!
//! Custom error types for the rover dashboard using `thiserror`.

use thiserror::Error;

/// Main error type for the rover dashboard
#[derive(Debug, Error)]
pub enum DashboardError {
    /// A command was issued while no session is Connected
    #[error("Not connected to rover")]
    NotConnected,

    /// Connection-level failure reported by the broker transport
    #[error("Transport error: {0}")]
    Transport(String),

    /// Outbound publish could not be handed to the transport
    #[error("Publish failed: {0}")]
    Publish(String),

    /// Inbound payload is not the structured data we expected
    #[error("Payload parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Rover identifier is empty or whitespace
    #[error("Invalid rover id: {0:?}")]
    InvalidRoverId(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Persisted state could not be encoded
    #[error("State encoding error: {0}")]
    StateEncode(#[from] toml::ser::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the rover dashboard
pub type Result<T> = std::result::Result<T, DashboardError>;
