//! Room-Scoped WebSocket Relay - Entry Point
//!
//! Starts the TCP listener and room registry, accepting connections until
//! Ctrl-C, then closes every room.

use std::env;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use room_relay::{handle_connection, Config, RoomRegistry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=room_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("room_relay=info")),
        )
        .init();

    // Bind address from command line overrides RELAY_ADDR
    let mut config = Config::from_env()?;
    if let Some(addr) = env::args().nth(1) {
        config.addr = addr;
    }
    let config = Arc::new(config);

    let listener = TcpListener::bind(&config.addr).await?;
    info!("Room relay listening on {}", config.addr);

    let registry = RoomRegistry::new(config.room);

    // Connection accept loop
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    info!("New connection from {}", addr);
                    let registry = registry.clone();
                    let config = config.clone();

                    // Spawn handler task for each connection
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, registry, config).await {
                            error!("Connection handler error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down, closing {} rooms", registry.len());
                break;
            }
        }
    }

    registry.shutdown_all().await;

    Ok(())
}
