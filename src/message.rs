//! Message protocol definitions
//!
//! JSON wire unit exchanged with clients: `{"username": ..., "message": ...}`.
//! The same shape is used in both directions.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Sender name used for messages generated by the relay itself
pub const SERVER_NAME: &str = "SERVER";

/// Body of the notice sent to every member when a room closes
pub const CLOSING_NOTICE: &str = "The room is closing.";

/// A serialized `ChatMessage`, shared by every member queue during fan-out
pub type Frame = Arc<str>;

/// Chat message
///
/// Immutable once created. Clients may omit `username`; the connection
/// pump always replaces it with the connection's resolved identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Display name of the sender
    #[serde(default)]
    pub username: String,
    /// Message body
    pub message: String,
}

impl ChatMessage {
    /// Create a new message
    pub fn new(username: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            message: message.into(),
        }
    }

    /// The notice broadcast to every member when a room shuts down
    pub fn closing_notice() -> Self {
        Self::new(SERVER_NAME, CLOSING_NOTICE)
    }

    /// Re-attribute this message to `name`, discarding any client-supplied sender
    pub fn with_sender(self, name: &str) -> Self {
        Self {
            username: name.to_string(),
            message: self.message,
        }
    }

    /// Serialize into a wire frame
    pub fn encode(&self) -> Result<Frame, RelayError> {
        Ok(serde_json::to_string(self)?.into())
    }

    /// Parse a wire frame (text or binary payload)
    pub fn decode(payload: &[u8]) -> Result<Self, RelayError> {
        Ok(serde_json::from_slice(payload)?)
    }
}
