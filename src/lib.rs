//! Room-Scoped WebSocket Relay Library
//!
//! Clients connect over WebSocket, join a named room, and receive every
//! message broadcast to that room until they disconnect or the room closes.
//!
//! # Features
//! - Named rooms created on demand or explicitly, with optional expiry
//! - Recent-history replay for late joiners
//! - Sender identity enforced by the server
//! - Slow consumers evicted instead of stalling the room
//! - Closing notice to every member when a room shuts down
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - Each room is a `RoomActor` task owning its members and history
//! - Each connection runs an inbound and an outbound task (the pump)
//! - `RoomRegistry` maps names to room handles behind a mutex
//! - No locks on room state - all access goes through message passing
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use room_relay::{handle_connection, Config, RoomRegistry};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Arc::new(Config::default());
//!     let registry = RoomRegistry::new(config.room);
//!     let listener = TcpListener::bind(&config.addr).await.unwrap();
//!
//!     while let Ok((stream, _)) = listener.accept().await {
//!         tokio::spawn(handle_connection(stream, registry.clone(), config.clone()));
//!     }
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod history;
pub mod message;
pub mod pump;
pub mod registry;
pub mod room;
pub mod types;

// Re-export main types for convenience
pub use client::ClientHandle;
pub use config::{Config, RoomSettings};
pub use error::{RelayError, SendError};
pub use handler::handle_connection;
pub use history::History;
pub use message::{ChatMessage, Frame};
pub use pump::Connection;
pub use registry::RoomRegistry;
pub use room::{Lifetime, RoomEvent, RoomHandle};
pub use types::{is_valid_room_name, resolve_display_name, ClientId, RoomId};
