//! Room registry
//!
//! Process-wide directory of live rooms. Unlike room state, which is
//! serialized by each room actor, the name → handle map is shared by every
//! connection task and is guarded by a mutex.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::RoomSettings;
use crate::error::RelayError;
use crate::room::{self, Lifetime, RoomHandle};
use crate::types::{is_valid_room_name, RoomId};

/// Shared room directory
///
/// Cheap to clone; all clones refer to the same set of rooms.
#[derive(Debug, Clone)]
pub struct RoomRegistry {
    inner: Arc<Inner>,
}

/// Non-owning registry reference held by room actors
///
/// Lets a closing room deregister itself without keeping the registry,
/// and through it every other room, alive.
#[derive(Debug, Clone)]
pub struct RegistryRef(Weak<Inner>);

impl RegistryRef {
    pub(crate) fn deregister(&self, name: &str, id: RoomId) {
        if let Some(inner) = self.0.upgrade() {
            RoomRegistry { inner }.deregister(name, id);
        }
    }
}

#[derive(Debug)]
struct Inner {
    rooms: Mutex<HashMap<String, RoomHandle>>,
    settings: RoomSettings,
}

impl RoomRegistry {
    /// Create an empty registry whose rooms use `settings`
    pub fn new(settings: RoomSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                rooms: Mutex::new(HashMap::new()),
                settings,
            }),
        }
    }

    /// Create and start a room
    ///
    /// With a `ttl`, the room shuts itself down once it elapses.
    /// Must be called from within a tokio runtime.
    pub fn create(&self, name: &str, ttl: Option<Duration>) -> Result<RoomHandle, RelayError> {
        if !is_valid_room_name(name) {
            return Err(RelayError::InvalidName(name.to_string()));
        }

        let mut rooms = self.inner.rooms.lock();
        if rooms.contains_key(name) {
            return Err(RelayError::AlreadyExists(name.to_string()));
        }
        let handle = self.start(name, ttl, Lifetime::Persistent);
        rooms.insert(name.to_string(), handle.clone());
        debug!("Total rooms: {}", rooms.len());

        Ok(handle)
    }

    /// Find a live room by name
    pub fn lookup(&self, name: &str) -> Result<RoomHandle, RelayError> {
        self.inner
            .rooms
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| RelayError::NotFound(name.to_string()))
    }

    /// Find a live room, creating it if absent
    ///
    /// Lookup and creation happen under one lock, so concurrent callers
    /// always end up with the same room. A room created here closes once it
    /// has been empty for the configured grace period.
    pub fn lookup_or_create(
        &self,
        name: &str,
        ttl: Option<Duration>,
    ) -> Result<RoomHandle, RelayError> {
        if !is_valid_room_name(name) {
            return Err(RelayError::InvalidName(name.to_string()));
        }

        let mut rooms = self.inner.rooms.lock();
        if let Some(handle) = rooms.get(name) {
            return Ok(handle.clone());
        }
        let handle = self.start(name, ttl, Lifetime::CloseWhenEmpty);
        rooms.insert(name.to_string(), handle.clone());

        Ok(handle)
    }

    /// Whether a live room with this name exists
    pub fn contains(&self, name: &str) -> bool {
        self.inner.rooms.lock().contains_key(name)
    }

    /// Deregister a room without closing it
    ///
    /// The room keeps running for attached clients but can no longer be
    /// found or joined by name.
    pub fn remove(&self, name: &str) -> Option<RoomHandle> {
        let removed = self.inner.rooms.lock().remove(name);
        if removed.is_some() {
            info!(room = %name, "Room deregistered");
        }
        removed
    }

    /// Administrative close: shut the room down
    ///
    /// The room deregisters itself as it starts closing.
    pub async fn close(&self, name: &str) -> Result<(), RelayError> {
        let handle = self.lookup(name)?;
        handle.shutdown().await;
        Ok(())
    }

    /// Close every room and wait until each has stopped accepting events
    pub async fn shutdown_all(&self) {
        let handles: Vec<RoomHandle> = self.inner.rooms.lock().values().cloned().collect();
        for handle in &handles {
            handle.shutdown().await;
        }
        for handle in handles {
            handle.closed().await;
        }
    }

    /// Names of all live rooms, sorted
    pub fn room_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.rooms.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of live rooms
    pub fn len(&self) -> usize {
        self.inner.rooms.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove `name` only if it still maps to room `id`
    ///
    /// Called by a room actor as it starts closing.
    pub(crate) fn deregister(&self, name: &str, id: RoomId) {
        let mut rooms = self.inner.rooms.lock();
        if rooms.get(name).is_some_and(|handle| handle.id() == id) {
            rooms.remove(name);
            info!(room = %name, "Room deregistered");
            debug!("Total rooms: {}", rooms.len());
        }
    }

    // Spawns the actor and, if needed, its expiry timer.
    fn start(&self, name: &str, ttl: Option<Duration>, lifetime: Lifetime) -> RoomHandle {
        let registry = RegistryRef(Arc::downgrade(&self.inner));
        let handle = room::spawn(name, self.inner.settings, lifetime, Some(registry));
        info!(room = %name, ttl = ?ttl, "Room created");

        if let Some(ttl) = ttl {
            let timer = handle.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(ttl) => {
                        info!(room = %timer.name(), "Room expired");
                        timer.shutdown().await;
                    }
                    _ = timer.closed() => {}
                }
            });
        }

        handle
    }
}
