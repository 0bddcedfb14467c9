//! Basic type definitions for the relay
//!
//! Provides newtype wrappers for type safety:
//! - `ClientId`: UUID-based identifier of one attached connection
//! - `RoomId`: UUID-based identifier of one room incarnation
//!
//! plus the room-name and display-name rules shared by the registry
//! and the upgrade handler.

use uuid::Uuid;

/// Display name given to connections without a resolved identity
pub const ANONYMOUS_NAME: &str = "anon";

/// Unique client identifier (newtype pattern)
///
/// Wraps a UUID v4 for type-safe client identification.
/// Implements Hash and Eq for use as HashMap keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub Uuid);

impl ClientId {
    /// Create a new random client ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one room incarnation
///
/// Two rooms created under the same name at different times get different
/// ids, so a closing room only ever deregisters itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoomId(pub Uuid);

impl RoomId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RoomId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Check a room name: non-empty, ASCII alphanumerics and '-' only.
///
/// Names are case-sensitive; "Alpha" and "alpha" are different rooms.
pub fn is_valid_room_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Resolve the display name for a connection
///
/// Returns the trimmed name if one is given, otherwise `ANONYMOUS_NAME`.
pub fn resolve_display_name(name: Option<&str>) -> String {
    match name.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => ANONYMOUS_NAME.to_string(),
    }
}
