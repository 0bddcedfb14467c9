//! Client handle definition
//!
//! The room actor's view of an attached connection: who it is and the
//! outbound queue feeding its write loop.

use tokio::sync::mpsc;

use crate::error::SendError;
use crate::message::Frame;
use crate::types::ClientId;

/// Attached client as seen by a room
///
/// Not `Clone`: the room actor owns the only sender of the outbound queue,
/// so dropping the handle closes the queue and ends the client's write loop.
#[derive(Debug)]
pub struct ClientHandle {
    /// Unique identifier for this connection
    pub id: ClientId,
    /// Resolved display name
    pub name: String,
    /// Room → client frame queue
    outbound: mpsc::Sender<Frame>,
}

impl ClientHandle {
    /// Create a handle with a fresh bounded outbound queue
    ///
    /// Returns the handle together with the receiving end, which belongs
    /// to the connection's write loop.
    pub fn new(
        id: ClientId,
        name: impl Into<String>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Frame>) {
        let (outbound, queue) = mpsc::channel(capacity.max(1));
        let handle = Self {
            id,
            name: name.into(),
            outbound,
        };
        (handle, queue)
    }

    /// Enqueue a frame without waiting
    ///
    /// Fails with `QueueOverflow` when the consumer is behind and with
    /// `ChannelClosed` when the write loop has already gone.
    pub fn try_deliver(&self, frame: Frame) -> Result<(), SendError> {
        self.outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::QueueOverflow,
            mpsc::error::TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }
}
