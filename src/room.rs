//! Room actor implementation
//!
//! Each room is an actor: one task owns the membership set and history and
//! processes `RoomEvent`s strictly in arrival order. Nothing outside that
//! task touches room state, so no locks are needed on it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::client::ClientHandle;
use crate::config::RoomSettings;
use crate::error::RelayError;
use crate::history::History;
use crate::message::{ChatMessage, Frame};
use crate::pump;
use crate::registry::RegistryRef;
use crate::types::{ClientId, RoomId};

/// Events sent from handles to a room actor
#[derive(Debug)]
pub enum RoomEvent {
    /// Add a member; the history snapshot is sent back on `reply`
    Join {
        client: ClientHandle,
        reply: oneshot::Sender<Vec<ChatMessage>>,
    },
    /// Remove a member (no-op if absent)
    Leave { client_id: ClientId },
    /// Record and fan out a message
    Broadcast { message: ChatMessage },
    /// Close the room
    Shutdown,
}

/// Cloneable handle to a running room actor
#[derive(Debug, Clone)]
pub struct RoomHandle {
    id: RoomId,
    name: String,
    queue_capacity: usize,
    events: mpsc::Sender<RoomEvent>,
    // Written only by the actor
    members: Arc<AtomicUsize>,
}

impl RoomHandle {
    /// Room name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identifier of this room incarnation
    pub fn id(&self) -> RoomId {
        self.id
    }

    /// Outbound queue capacity for members of this room
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Number of members as of the last event the actor processed
    pub fn member_count(&self) -> usize {
        self.members.load(Ordering::Acquire)
    }

    /// Join `client`, returning the history to deliver before live traffic
    ///
    /// Fails with `NotFound` once the room has started closing.
    pub async fn join(&self, client: ClientHandle) -> Result<Vec<ChatMessage>, RelayError> {
        let (reply, history) = oneshot::channel();
        self.send(RoomEvent::Join { client, reply }).await?;
        history.await.map_err(|_| self.not_found())
    }

    /// Remove a member. Idempotent; a no-op on a closed room.
    pub async fn leave(&self, client_id: ClientId) {
        let _ = self.events.send(RoomEvent::Leave { client_id }).await;
    }

    /// Broadcast `message` to every current member
    pub async fn broadcast(&self, message: ChatMessage) -> Result<(), RelayError> {
        self.send(RoomEvent::Broadcast { message }).await
    }

    /// Close the room. A no-op if it is already closing or closed.
    pub async fn shutdown(&self) {
        let _ = self.events.send(RoomEvent::Shutdown).await;
    }

    /// Whether the room actor has stopped accepting events
    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }

    /// Wait until the room actor stops accepting events
    pub async fn closed(&self) {
        self.events.closed().await
    }

    /// Join this room over `connection` and pump messages until the client
    /// disconnects, is evicted, or the room closes.
    pub async fn attach<S>(&self, connection: S, display_name: &str) -> Result<(), RelayError>
    where
        S: pump::Connection,
    {
        pump::attach(self.clone(), connection, display_name).await
    }

    async fn send(&self, event: RoomEvent) -> Result<(), RelayError> {
        self.events
            .send(event)
            .await
            .map_err(|_| self.not_found())
    }

    fn not_found(&self) -> RelayError {
        RelayError::NotFound(self.name.clone())
    }
}

/// How a room ends besides `Shutdown`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// Runs until shut down or every handle is dropped
    Persistent,
    /// Also closes after staying empty for `settings.empty_grace`
    CloseWhenEmpty,
}

/// Start a room actor for `name`
///
/// When `registry` is given, the room deregisters itself from it as it
/// starts closing.
pub fn spawn(
    name: &str,
    settings: RoomSettings,
    lifetime: Lifetime,
    registry: Option<RegistryRef>,
) -> RoomHandle {
    let (events, receiver) = mpsc::channel(settings.event_capacity.max(1));
    let handle = RoomHandle {
        id: RoomId::new(),
        name: name.to_string(),
        queue_capacity: settings.queue_capacity,
        events,
        members: Arc::new(AtomicUsize::new(0)),
    };
    let empty_grace = match lifetime {
        Lifetime::Persistent => None,
        Lifetime::CloseWhenEmpty => Some(settings.empty_grace),
    };
    let actor = RoomActor::new(&handle, settings.history_limit, receiver, registry)
        .with_empty_grace(empty_grace);
    tokio::spawn(actor.run());
    handle
}

/// The room actor
///
/// Sole owner of one room's members and history.
pub(crate) struct RoomActor {
    id: RoomId,
    name: String,
    members: HashMap<ClientId, ClientHandle>,
    member_count: Arc<AtomicUsize>,
    history: History,
    events: mpsc::Receiver<RoomEvent>,
    registry: Option<RegistryRef>,
    empty_grace: Option<Duration>,
}

impl RoomActor {
    fn new(
        handle: &RoomHandle,
        history_limit: usize,
        events: mpsc::Receiver<RoomEvent>,
        registry: Option<RegistryRef>,
    ) -> Self {
        Self {
            id: handle.id,
            name: handle.name.clone(),
            members: HashMap::new(),
            member_count: handle.members.clone(),
            history: History::new(history_limit),
            events,
            registry,
            empty_grace: None,
        }
    }

    fn with_empty_grace(mut self, empty_grace: Option<Duration>) -> Self {
        self.empty_grace = empty_grace;
        self
    }

    /// Run the room event loop
    ///
    /// Processes events until `Shutdown` arrives, every handle is dropped,
    /// or the room has been empty for its grace period, then closes the room.
    pub(crate) async fn run(mut self) {
        info!(room = %self.name, "Room opened");

        while let Some(event) = self.next_event().await {
            match event {
                RoomEvent::Join { client, reply } => {
                    let client_id = client.id;
                    let history = self.join(client);
                    if reply.send(history).is_err() {
                        // Joiner gave up before we answered
                        self.leave(client_id);
                    }
                }
                RoomEvent::Leave { client_id } => self.leave(client_id),
                RoomEvent::Broadcast { message } => self.broadcast(message),
                RoomEvent::Shutdown => break,
            }
        }

        self.shutdown();
        info!(room = %self.name, "Room closed");
    }

    /// Wait for the next event
    ///
    /// Yields `None` when the channel is closed, or when the room may close
    /// once empty and no event arrives within the grace period.
    async fn next_event(&mut self) -> Option<RoomEvent> {
        match self.empty_grace {
            Some(grace) if self.members.is_empty() => {
                match tokio::time::timeout(grace, self.events.recv()).await {
                    Ok(event) => event,
                    Err(_) => {
                        info!(room = %self.name, "Room empty for {:?}", grace);
                        None
                    }
                }
            }
            _ => self.events.recv().await,
        }
    }

    /// Add a member and return the history snapshot, oldest first
    fn join(&mut self, client: ClientHandle) -> Vec<ChatMessage> {
        info!(room = %self.name, client = %client.id, name = %client.name, "Client joined");
        self.members.insert(client.id, client);
        self.member_count.store(self.members.len(), Ordering::Release);
        debug!(room = %self.name, "Members: {}", self.members.len());
        self.history.snapshot()
    }

    /// Remove a member, closing its outbound queue
    fn leave(&mut self, client_id: ClientId) {
        if self.members.remove(&client_id).is_some() {
            info!(room = %self.name, client = %client_id, "Client left");
            self.member_count.store(self.members.len(), Ordering::Release);
            debug!(room = %self.name, "Members: {}", self.members.len());
        }
    }

    /// Record a message and enqueue it on every member's queue
    fn broadcast(&mut self, message: ChatMessage) {
        let frame = match message.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(room = %self.name, "Failed to serialize message: {}", e);
                return;
            }
        };
        debug!(room = %self.name, "Broadcast: {}", frame);
        self.history.push(message);
        self.fan_out(&frame);
    }

    /// Deliver `frame` to every member without waiting
    ///
    /// Members whose queue is full or closed are evicted.
    fn fan_out(&mut self, frame: &Frame) {
        let mut evicted = Vec::new();
        for (client_id, client) in &self.members {
            if let Err(e) = client.try_deliver(frame.clone()) {
                warn!(room = %self.name, client = %client_id, "Evicting client: {}", e);
                evicted.push(*client_id);
            }
        }
        for client_id in evicted {
            self.leave(client_id);
        }
    }

    /// Close the room
    ///
    /// Deregisters, stops accepting events, sends the closing notice to every
    /// member and drops all member queues. Joins still buffered are refused.
    fn shutdown(&mut self) {
        info!(room = %self.name, "Closing room");

        if let Some(registry) = &self.registry {
            registry.deregister(&self.name, self.id);
        }
        self.events.close();

        match ChatMessage::closing_notice().encode() {
            Ok(frame) => self.fan_out(&frame),
            Err(e) => warn!(room = %self.name, "Failed to serialize closing notice: {}", e),
        }
        for (client_id, _) in self.members.drain() {
            debug!(room = %self.name, client = %client_id, "Closing client");
        }
        self.member_count.store(0, Ordering::Release);

        // Dropping a pending join's reply fails it with NotFound
        while let Ok(event) = self.events.try_recv() {
            debug!(room = %self.name, "Discarding event after close: {:?}", event);
        }
    }
}
