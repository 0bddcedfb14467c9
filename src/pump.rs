//! Connection pump
//!
//! Bridges one client's WebSocket connection to one room: an inbound task
//! decodes frames and broadcasts them, an outbound task drains the client's
//! queue onto the socket. Either side failing makes the client leave.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

use crate::client::ClientHandle;
use crate::error::RelayError;
use crate::message::{ChatMessage, Frame};
use crate::room::RoomHandle;
use crate::types::ClientId;

/// A duplex WebSocket connection the pump can drive
///
/// Implemented for `WebSocketStream` over any transport.
pub trait Connection:
    Stream<Item = Result<Message, WsError>>
    + Sink<Message, Error = WsError>
    + Send
    + Unpin
    + 'static
{
}

impl<T> Connection for T where
    T: Stream<Item = Result<Message, WsError>>
        + Sink<Message, Error = WsError>
        + Send
        + Unpin
        + 'static
{
}

/// Join `room` as `display_name` and pump `connection` until the client is gone
///
/// The join's history snapshot is written before any live message. Returns
/// once both loops have stopped; fails only if the room is already gone.
pub async fn attach<S: Connection>(
    room: RoomHandle,
    mut connection: S,
    display_name: &str,
) -> Result<(), RelayError> {
    let client_id = ClientId::new();
    let (client, queue) = ClientHandle::new(client_id, display_name, room.queue_capacity());

    let history = match room.join(client).await {
        Ok(history) => history,
        Err(e) => {
            debug!(room = %room.name(), client = %client_id, "Join refused: {}", e);
            let _ = connection.close().await;
            return Err(e);
        }
    };

    info!(room = %room.name(), client = %client_id, name = %display_name, "Client attached");

    let (sink, stream) = connection.split();

    let mut inbound = tokio::spawn(inbound_loop(
        stream,
        room.clone(),
        client_id,
        display_name.to_string(),
    ));
    let mut outbound = tokio::spawn(outbound_loop(sink, queue, history, room.clone(), client_id));

    tokio::select! {
        _ = &mut inbound => {
            // The leave closes our queue, which ends the outbound loop
            let _ = outbound.await;
        }
        _ = &mut outbound => {
            inbound.abort();
        }
    }

    info!(room = %room.name(), client = %client_id, "Client detached");

    Ok(())
}

/// Read frames and broadcast them as `name` until the connection ends
async fn inbound_loop<S: Connection>(
    mut stream: SplitStream<S>,
    room: RoomHandle,
    client_id: ClientId,
    name: String,
) {
    while let Some(frame) = stream.next().await {
        let payload = match frame {
            Ok(Message::Text(text)) => text.as_bytes().to_vec(),
            Ok(Message::Binary(data)) => data.to_vec(),
            Ok(Message::Close(_)) => {
                debug!(client = %client_id, "Client sent close frame");
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!(client = %client_id, "Connection fault on read: {}", e);
                break;
            }
        };

        match ChatMessage::decode(&payload) {
            Ok(message) => {
                if room.broadcast(message.with_sender(&name)).await.is_err() {
                    debug!(client = %client_id, "Room gone, ending read task");
                    break;
                }
            }
            Err(e) => {
                warn!(client = %client_id, "Invalid message: {}", e);
            }
        }
    }

    debug!(client = %client_id, "Read task ended");
    room.leave(client_id).await;
}

/// Write the history backlog, then queued frames, until the queue closes
async fn outbound_loop<S: Connection>(
    mut sink: SplitSink<S, Message>,
    mut queue: mpsc::Receiver<Frame>,
    history: Vec<ChatMessage>,
    room: RoomHandle,
    client_id: ClientId,
) {
    if let Err(e) = write_all(&mut sink, &mut queue, history).await {
        warn!(client = %client_id, "Connection fault on write: {}", e);
        room.leave(client_id).await;
        return;
    }

    debug!(client = %client_id, "Write task ended");

    // Queue closed by leave, eviction or room shutdown
    let _ = sink.close().await;
}

async fn write_all<S: Connection>(
    sink: &mut SplitSink<S, Message>,
    queue: &mut mpsc::Receiver<Frame>,
    history: Vec<ChatMessage>,
) -> Result<(), RelayError> {
    for message in history {
        let frame = message.encode()?;
        sink.send(Message::Text(frame.to_string().into())).await?;
    }
    while let Some(frame) = queue.recv().await {
        sink.send(Message::Text(frame.to_string().into())).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;

    use tokio::io::DuplexStream;
    use tokio::task::JoinHandle;
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::protocol::Role;
    use tokio_tungstenite::WebSocketStream;

    use super::*;
    use crate::config::RoomSettings;
    use crate::message::CLOSING_NOTICE;
    use crate::room::{self, Lifetime};

    type Socket = WebSocketStream<DuplexStream>;

    const WAIT: Duration = Duration::from_secs(2);

    /// Connection whose writes always fail and whose reads never complete
    struct WriteFailing;

    impl Stream for WriteFailing {
        type Item = Result<Message, WsError>;

        fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            Poll::Pending
        }
    }

    impl Sink<Message> for WriteFailing {
        type Error = WsError;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
            Poll::Ready(Err(WsError::ConnectionClosed))
        }

        fn start_send(self: Pin<&mut Self>, _item: Message) -> Result<(), WsError> {
            Err(WsError::ConnectionClosed)
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
            Poll::Ready(Ok(()))
        }
    }

    async fn socket_pair() -> (Socket, Socket) {
        let (server, client) = tokio::io::duplex(64 * 1024);
        let server = WebSocketStream::from_raw_socket(server, Role::Server, None).await;
        let client = WebSocketStream::from_raw_socket(client, Role::Client, None).await;
        (server, client)
    }

    fn spawn_room(name: &str) -> RoomHandle {
        room::spawn(name, RoomSettings::default(), Lifetime::Persistent, None)
    }

    fn connect(
        room: &RoomHandle,
        server: Socket,
        name: &str,
    ) -> JoinHandle<Result<(), RelayError>> {
        let room = room.clone();
        let name = name.to_string();
        tokio::spawn(async move { room.attach(server, &name).await })
    }

    async fn send(client: &mut Socket, json: &str) {
        client.send(Message::Text(json.to_string().into())).await.unwrap();
    }

    async fn next_message(client: &mut Socket) -> ChatMessage {
        loop {
            let frame = timeout(WAIT, client.next()).await.unwrap().unwrap().unwrap();
            if let Message::Text(text) = frame {
                return ChatMessage::decode(text.as_bytes()).unwrap();
            }
        }
    }

    /// True once the socket yields a close frame, an error or end of stream
    async fn is_closed(client: &mut Socket) -> bool {
        loop {
            match timeout(WAIT, client.next()).await {
                Ok(Some(Ok(Message::Close(_)))) | Ok(Some(Err(_))) | Ok(None) => return true,
                Ok(Some(Ok(_))) => continue,
                Err(_) => return false,
            }
        }
    }

    #[tokio::test]
    async fn test_messages_are_relayed_with_resolved_identity() {
        let room = spawn_room("alpha");
        let (server_x, mut x) = socket_pair().await;
        let (server_y, mut y) = socket_pair().await;
        let _px = connect(&room, server_x, "X");
        let _py = connect(&room, server_y, "Y");

        // Make sure Y is a member before X speaks
        send(&mut y, r#"{"username":"Y","message":"ready"}"#).await;
        assert_eq!(next_message(&mut y).await.message, "ready");

        send(&mut x, r#"{"username":"mallory","message":"hi"}"#).await;

        let expected = ChatMessage::new("X", "hi");
        loop {
            let msg = next_message(&mut x).await;
            if msg.message == "hi" {
                assert_eq!(msg, expected);
                break;
            }
        }
        assert_eq!(next_message(&mut y).await, expected);
    }

    #[tokio::test]
    async fn test_history_delivered_before_live_traffic() {
        let room = spawn_room("beta");
        for body in ["one", "two", "three"] {
            room.broadcast(ChatMessage::new("old", body)).await.unwrap();
        }

        let (server, mut z) = socket_pair().await;
        let _pump = connect(&room, server, "Z");
        send(&mut z, r#"{"message":"live"}"#).await;

        let bodies = [
            next_message(&mut z).await.message,
            next_message(&mut z).await.message,
            next_message(&mut z).await.message,
            next_message(&mut z).await.message,
        ];
        assert_eq!(bodies, ["one", "two", "three", "live"]);
    }

    #[tokio::test]
    async fn test_invalid_frames_are_skipped() {
        let room = spawn_room("lenient");
        let (server, mut client) = socket_pair().await;
        let _pump = connect(&room, server, "A");

        send(&mut client, "not json").await;
        client.send(Message::Binary(br#"{"message":"bin"}"#.to_vec().into())).await.unwrap();

        assert_eq!(next_message(&mut client).await, ChatMessage::new("A", "bin"));
    }

    #[tokio::test]
    async fn test_shutdown_sends_notice_then_closes() {
        let room = spawn_room("gamma");
        let (server, mut client) = socket_pair().await;
        let pump = connect(&room, server, "A");

        send(&mut client, r#"{"message":"hello"}"#).await;
        assert_eq!(next_message(&mut client).await.message, "hello");

        room.shutdown().await;

        assert_eq!(
            next_message(&mut client).await,
            ChatMessage::new("SERVER", CLOSING_NOTICE)
        );
        assert!(is_closed(&mut client).await);
        assert!(timeout(WAIT, pump).await.unwrap().unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_client_disconnect_leaves_room() {
        let room = spawn_room("delta");
        let (server_a, mut a) = socket_pair().await;
        let (server_b, b) = socket_pair().await;
        let _pa = connect(&room, server_a, "A");
        let pb = connect(&room, server_b, "B");

        drop(b);
        assert!(timeout(WAIT, pb).await.unwrap().unwrap().is_ok());

        // The room keeps serving the remaining member
        send(&mut a, r#"{"message":"still here"}"#).await;
        assert_eq!(next_message(&mut a).await.message, "still here");
    }

    #[tokio::test]
    async fn test_attach_to_closed_room_fails() {
        let room = spawn_room("closed");
        room.shutdown().await;
        timeout(WAIT, room.closed()).await.unwrap();

        let (server, _client) = socket_pair().await;
        let result = room.attach(server, "A").await;
        assert!(matches!(result, Err(RelayError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_write_fault_leaves_while_read_is_blocked() {
        let room = spawn_room("faulty");
        room.broadcast(ChatMessage::new("old", "backlog")).await.unwrap();

        // Writing the backlog fails; the read side never returns
        let pump = room.attach(WriteFailing, "W");
        assert!(timeout(WAIT, pump).await.unwrap().is_ok());

        // Events are processed in order, so this join sees the leave already applied
        let (observer, _queue) = ClientHandle::new(ClientId::new(), "O", 8);
        room.join(observer).await.unwrap();
        assert_eq!(room.member_count(), 1);
    }
}
