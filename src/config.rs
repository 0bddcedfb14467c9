//! Relay configuration
//!
//! Read from `RELAY_*` environment variables, each with a default.

use std::str::FromStr;
use std::time::Duration;

use crate::error::RelayError;

/// Default server address
pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Messages kept per room for late joiners
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Per-client outbound queue size
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Room control channel size
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// How long an auto-created room may stay empty before it closes
pub const DEFAULT_EMPTY_GRACE: Duration = Duration::from_secs(5);

/// Per-room sizing shared by every room the registry creates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomSettings {
    /// Maximum history length; 0 disables history
    pub history_limit: usize,
    /// Outbound queue capacity of each member; overflow evicts the member
    pub queue_capacity: usize,
    /// Capacity of the room's control channel
    pub event_capacity: usize,
    /// Idle time after which an empty auto-created room closes
    pub empty_grace: Duration,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            empty_grace: DEFAULT_EMPTY_GRACE,
        }
    }
}

/// Process configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Listen address
    pub addr: String,
    /// Room sizing
    pub room: RoomSettings,
    /// TTL given to rooms created on first connection (None = never expire)
    pub room_ttl: Option<Duration>,
    /// Create unknown rooms on first connection instead of rejecting
    pub auto_create: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            room: RoomSettings::default(),
            room_ttl: None,
            auto_create: true,
        }
    }
}

impl Config {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, RelayError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` to fetch each variable
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RelayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let ttl_secs: u64 = parse(&lookup, "RELAY_ROOM_TTL_SECS", 0)?;
        let grace_ms: u64 = parse(
            &lookup,
            "RELAY_EMPTY_GRACE_MS",
            DEFAULT_EMPTY_GRACE.as_millis() as u64,
        )?;

        Ok(Self {
            addr: lookup("RELAY_ADDR").unwrap_or(defaults.addr),
            room: RoomSettings {
                history_limit: parse(&lookup, "RELAY_HISTORY_LIMIT", DEFAULT_HISTORY_LIMIT)?,
                queue_capacity: positive(&lookup, "RELAY_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY)?,
                event_capacity: positive(&lookup, "RELAY_EVENT_CAPACITY", DEFAULT_EVENT_CAPACITY)?,
                empty_grace: Duration::from_millis(grace_ms),
            },
            room_ttl: (ttl_secs > 0).then(|| Duration::from_secs(ttl_secs)),
            auto_create: parse(&lookup, "RELAY_AUTO_CREATE", defaults.auto_create)?,
        })
    }
}

fn parse<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, RelayError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| RelayError::Config { key, value }),
        None => Ok(default),
    }
}

// Channel capacities must be non-zero.
fn positive<F>(lookup: &F, key: &'static str, default: usize) -> Result<usize, RelayError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = parse(lookup, key, default)?;
    if value == 0 {
        return Err(RelayError::Config {
            key,
            value: value.to_string(),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config, RelayError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.addr, DEFAULT_ADDR);
        assert!(config.room_ttl.is_none());
        assert!(config.auto_create);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("RELAY_ADDR", "0.0.0.0:9000"),
            ("RELAY_HISTORY_LIMIT", "5"),
            ("RELAY_QUEUE_CAPACITY", "8"),
            ("RELAY_ROOM_TTL_SECS", "60"),
            ("RELAY_EMPTY_GRACE_MS", "250"),
            ("RELAY_AUTO_CREATE", "false"),
        ])
        .unwrap();

        assert_eq!(config.addr, "0.0.0.0:9000");
        assert_eq!(config.room.history_limit, 5);
        assert_eq!(config.room.queue_capacity, 8);
        assert_eq!(config.room.event_capacity, DEFAULT_EVENT_CAPACITY);
        assert_eq!(config.room_ttl, Some(Duration::from_secs(60)));
        assert_eq!(config.room.empty_grace, Duration::from_millis(250));
        assert!(!config.auto_create);
    }

    #[test]
    fn test_malformed_value() {
        let err = load(&[("RELAY_HISTORY_LIMIT", "lots")]).unwrap_err();
        assert!(matches!(
            err,
            RelayError::Config { key: "RELAY_HISTORY_LIMIT", .. }
        ));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(load(&[("RELAY_QUEUE_CAPACITY", "0")]).is_err());
    }
}
