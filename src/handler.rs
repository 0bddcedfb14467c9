//! WebSocket connection handler
//!
//! Handles individual TCP connections: maps the upgrade request path
//! `/ws/<room>?name=<display name>` to a room, performs the WebSocket
//! handshake and hands the connection to the room's pump.

use std::sync::Arc;

use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{StatusCode, Uri};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::RelayError;
use crate::registry::RoomRegistry;
use crate::room::RoomHandle;
use crate::types::resolve_display_name;

/// Path prefix of room connections
pub const ROUTE_PREFIX: &str = "/ws/";

/// Target of an upgrade request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Requested room name (not yet validated)
    pub room: String,
    /// Resolved display name
    pub display_name: String,
}

/// Parse `/ws/<room>?name=<display name>`
pub fn parse_route(uri: &Uri) -> Result<Route, RelayError> {
    let room = uri
        .path()
        .strip_prefix(ROUTE_PREFIX)
        .ok_or_else(|| RelayError::InvalidName(uri.path().to_string()))?;

    let name = uri.query().and_then(|query| {
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == "name")
            .map(|(_, value)| value.into_owned())
    });

    Ok(Route {
        room: room.to_string(),
        display_name: resolve_display_name(name.as_deref()),
    })
}

/// Handle a new TCP connection
///
/// Resolves the room during the handshake so unknown or invalid rooms are
/// rejected with an HTTP status instead of an upgraded socket.
pub async fn handle_connection(
    stream: TcpStream,
    registry: RoomRegistry,
    config: Arc<Config>,
) -> Result<(), RelayError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    let mut target: Option<(RoomHandle, String)> = None;
    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let route = parse_route(request.uri()).map_err(|e| reject(&e))?;
        let room = resolve_room(&registry, &config, &route.room).map_err(|e| reject(&e))?;
        target = Some((room, route.display_name));
        Ok(response)
    };

    let ws_stream = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
        Ok(ws_stream) => ws_stream,
        Err(e) => {
            warn!("Handshake with {} failed: {}", peer_addr, e);
            return Err(e.into());
        }
    };

    let Some((room, display_name)) = target else {
        return Ok(());
    };

    info!(room = %room.name(), "Client connected from {} as {}", peer_addr, display_name);

    room.attach(ws_stream, &display_name).await
}

fn resolve_room(
    registry: &RoomRegistry,
    config: &Config,
    name: &str,
) -> Result<RoomHandle, RelayError> {
    if config.auto_create {
        registry.lookup_or_create(name, config.room_ttl)
    } else {
        registry.lookup(name)
    }
}

/// Build the HTTP rejection for a failed upgrade
fn reject(err: &RelayError) -> ErrorResponse {
    let status = match err {
        RelayError::InvalidName(_) => StatusCode::BAD_REQUEST,
        RelayError::NotFound(_) => StatusCode::NOT_FOUND,
        RelayError::AlreadyExists(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let mut response = ErrorResponse::new(Some(err.to_string()));
    *response.status_mut() = status;
    response
}
