//! Error types for the relay
//!
//! Defines relay-level errors and outbound queue delivery errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Relay-level errors
///
/// Registry errors (`InvalidName`, `AlreadyExists`, `NotFound`) are surfaced
/// to the requester as a rejection. Connection faults are contained by the
/// connection pump and turned into a leave for that client.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Room name is empty or contains characters other than ASCII alphanumerics and '-'
    #[error("Invalid room name: {0:?}")]
    InvalidName(String),

    /// A live room with this name already exists
    #[error("Room already exists: {0}")]
    AlreadyExists(String),

    /// No live room with this name (never created, expired or closing)
    #[error("Room not found: {0}")]
    NotFound(String),

    /// Read/write failure on a client's WebSocket connection
    #[error("Connection fault: {0}")]
    ConnectionFault(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed configuration value
    #[error("Invalid value {value:?} for {key}")]
    Config { key: &'static str, value: String },
}

/// Outbound queue delivery errors
///
/// Occurs when the room actor cannot hand a frame to a member.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The member's outbound queue is full (slow consumer)
    #[error("Outbound queue overflow")]
    QueueOverflow,

    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,
}
