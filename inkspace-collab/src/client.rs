//! Relay session: one client's duplex connection to the relay.
//!
//! A session joins exactly one room (the document being edited). Outbound
//! edits and cursor moves are fire-and-forget; inbound frames surface as
//! [`RelayEvent`]s on a channel the application consumes.
//!
//! Losing the connection degrades the client to local-only editing:
//! sends become logged no-ops, a `Disconnected` event fires, and the
//! session object stays usable. Nothing here retries or queues — the
//! relay contract is at-most-once, best-effort.

use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

use futures_util::StreamExt;
use uuid::Uuid;

use inkspace_core::Delta;

use crate::protocol::{
    CursorRange, MessageType, PresenceRecord, ProtocolError, RelayMessage,
};

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Events surfaced to the application.
#[derive(Debug, Clone)]
pub enum RelayEvent {
    /// Connection established and room joined
    Connected,
    /// Connection lost; the client is local-only from here
    Disconnected,
    /// A peer's edit, to be applied directly in arrival order
    RemoteEdit { delta: Delta },
    /// A peer's cursor moved (`None` clears it)
    RemoteCursor {
        actor_id: String,
        range: Option<CursorRange>,
    },
    /// Full roster after a membership change
    Roster(Vec<PresenceRecord>),
    /// An actor appeared
    ActorJoined(PresenceRecord),
    /// An actor disconnected
    ActorLeft(PresenceRecord),
}

/// A client's connection to one document room.
pub struct RelaySession {
    session_id: Uuid,
    actor_id: String,
    room_id: Uuid,
    server_url: String,
    state: Arc<RwLock<ConnectionState>>,
    outgoing_tx: Option<mpsc::Sender<Vec<u8>>>,
    event_tx: mpsc::Sender<RelayEvent>,
    event_rx: Option<mpsc::Receiver<RelayEvent>>,
}

impl RelaySession {
    pub fn new(actor_id: impl Into<String>, room_id: Uuid, server_url: impl Into<String>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        Self {
            session_id: Uuid::new_v4(),
            actor_id: actor_id.into(),
            room_id,
            server_url: server_url.into(),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            outgoing_tx: None,
            event_tx,
            event_rx: Some(event_rx),
        }
    }

    /// Take the event receiver (once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<RelayEvent>> {
        self.event_rx.take()
    }

    /// Dial the relay, join the room, spawn reader/writer tasks.
    pub async fn connect(&mut self) -> Result<(), ProtocolError> {
        *self.state.write().await = ConnectionState::Connecting;

        let ws_result = tokio_tungstenite::connect_async(&self.server_url).await;
        let ws_stream = match ws_result {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                log::warn!("Relay connect to {} failed: {e}", self.server_url);
                *self.state.write().await = ConnectionState::Disconnected;
                return Err(ProtocolError::ConnectionClosed);
            }
        };

        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        // Writer task: drain the outgoing channel into the socket. When the
        // channel closes (disconnect or drop), send a Close frame so the
        // relay sees the departure promptly.
        let (out_tx, mut out_rx) = mpsc::channel::<Vec<u8>>(256);
        self.outgoing_tx = Some(out_tx);
        tokio::spawn(async move {
            use futures_util::SinkExt;
            while let Some(data) = out_rx.recv().await {
                if ws_writer
                    .send(tokio_tungstenite::tungstenite::Message::Binary(data.into()))
                    .await
                    .is_err()
                {
                    return;
                }
            }
            let _ = ws_writer
                .send(tokio_tungstenite::tungstenite::Message::Close(None))
                .await;
        });

        // First frame on the wire: join the document room.
        let join = RelayMessage::join_room(self.session_id, self.room_id, &self.actor_id);
        let encoded = join.encode()?;
        if let Some(ref tx) = self.outgoing_tx {
            let _ = tx.send(encoded).await;
        }

        *self.state.write().await = ConnectionState::Connected;
        let _ = self.event_tx.send(RelayEvent::Connected).await;

        // Reader task: decode inbound frames into events.
        let event_tx = self.event_tx.clone();
        let state = self.state.clone();
        let session_id = self.session_id;
        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(tokio_tungstenite::tungstenite::Message::Binary(data)) => {
                        let bytes: Vec<u8> = data.into();
                        let frame = match RelayMessage::decode(&bytes) {
                            Ok(frame) => frame,
                            Err(e) => {
                                log::warn!("Undecodable relay frame: {e}");
                                continue;
                            }
                        };

                        // The relay excludes senders, but keep the guard for
                        // relay-originated frames carrying our own id.
                        if frame.session_id == session_id {
                            continue;
                        }

                        let event = match frame.msg_type {
                            MessageType::Edit => match frame.edit_delta() {
                                Ok(delta) => Some(RelayEvent::RemoteEdit { delta }),
                                Err(e) => {
                                    log::warn!("Undecodable edit payload: {e}");
                                    None
                                }
                            },
                            MessageType::CursorMove => match frame.cursor_update() {
                                Ok(update) => Some(RelayEvent::RemoteCursor {
                                    actor_id: update.actor_id,
                                    range: update.range,
                                }),
                                Err(e) => {
                                    log::warn!("Undecodable cursor payload: {e}");
                                    None
                                }
                            },
                            MessageType::PresenceSync => {
                                frame.roster().ok().map(RelayEvent::Roster)
                            }
                            MessageType::PresenceJoin => {
                                frame.presence_record().ok().map(RelayEvent::ActorJoined)
                            }
                            MessageType::PresenceLeave => {
                                frame.presence_record().ok().map(RelayEvent::ActorLeft)
                            }
                            _ => None,
                        };

                        if let Some(event) = event {
                            if event_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                    }
                    Ok(tokio_tungstenite::tungstenite::Message::Close(_)) | Err(_) => {
                        break;
                    }
                    _ => {}
                }
            }

            // Socket gone: local-only from here.
            *state.write().await = ConnectionState::Disconnected;
            let _ = event_tx.send(RelayEvent::Disconnected).await;
        });

        Ok(())
    }

    /// Broadcast an edit: the literal operation list, JSON-serialized.
    ///
    /// A disconnected session drops the edit silently — the local copy has
    /// already applied it and the store still persists it.
    pub async fn send_edit(&self, delta: &Delta) -> Result<(), ProtocolError> {
        if *self.state.read().await != ConnectionState::Connected {
            log::debug!("Edit while disconnected, staying local-only");
            return Ok(());
        }

        let json = delta
            .to_json()
            .map_err(|e| ProtocolError::SerializationError(e.to_string()))?;
        let msg = RelayMessage::edit(self.session_id, self.room_id, json.into_bytes());
        self.send_frame(msg).await
    }

    /// Broadcast a cursor move (`None` clears the local cursor remotely).
    pub async fn send_cursor(&self, range: Option<CursorRange>) -> Result<(), ProtocolError> {
        if *self.state.read().await != ConnectionState::Connected {
            return Ok(());
        }
        let msg =
            RelayMessage::cursor_move(self.session_id, self.room_id, &self.actor_id, range);
        self.send_frame(msg).await
    }

    pub async fn send_ping(&self) -> Result<(), ProtocolError> {
        if *self.state.read().await != ConnectionState::Connected {
            return Ok(());
        }
        self.send_frame(RelayMessage::ping(self.session_id)).await
    }

    async fn send_frame(&self, msg: RelayMessage) -> Result<(), ProtocolError> {
        let encoded = msg.encode()?;
        if let Some(ref tx) = self.outgoing_tx {
            tx.send(encoded)
                .await
                .map_err(|_| ProtocolError::ConnectionClosed)?;
        }
        Ok(())
    }

    /// Drop the outbound channel; the writer task exits and the socket
    /// closes, which the relay treats as leaving the room.
    pub async fn disconnect(&mut self) {
        self.outgoing_tx = None;
        *self.state.write().await = ConnectionState::Disconnected;
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    pub fn room_id(&self) -> Uuid {
        self.room_id
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_creation() {
        let room = Uuid::new_v4();
        let session = RelaySession::new("alice@x", room, "ws://localhost:9090");
        assert_eq!(session.actor_id(), "alice@x");
        assert_eq!(session.room_id(), room);
        assert_eq!(session.server_url(), "ws://localhost:9090");
        assert!(!session.session_id().is_nil());
    }

    #[tokio::test]
    async fn test_initial_state_disconnected() {
        let session = RelaySession::new("alice@x", Uuid::new_v4(), "ws://localhost:9090");
        assert_eq!(session.connection_state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_send_while_disconnected_is_quiet() {
        let session = RelaySession::new("alice@x", Uuid::new_v4(), "ws://localhost:9090");

        // Local-only degradation: no error, no panic.
        session.send_edit(&Delta::new().insert("hi")).await.unwrap();
        session
            .send_cursor(Some(CursorRange::caret(0)))
            .await
            .unwrap();
        session.send_ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_to_dead_server_errors() {
        let mut session = RelaySession::new("alice@x", Uuid::new_v4(), "ws://127.0.0.1:1");
        let result = session.connect().await;
        assert!(result.is_err());
        assert_eq!(session.connection_state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_take_event_rx_once() {
        let mut session = RelaySession::new("alice@x", Uuid::new_v4(), "ws://localhost:9090");
        assert!(session.take_event_rx().is_some());
        assert!(session.take_event_rx().is_none());
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let mut session = RelaySession::new("alice@x", Uuid::new_v4(), "ws://localhost:9090");
        session.disconnect().await;
        session.disconnect().await;
        assert_eq!(session.connection_state().await, ConnectionState::Disconnected);
    }
}
