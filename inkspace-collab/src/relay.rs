//! Change relay: the WebSocket hub that routes edits and cursors between
//! sessions sharing a document room.
//!
//! ```text
//! Session A ──┐
//!             ├── Room (doc id) ── fan-out ──► every other session
//! Session B ──┘        │
//!                      └── roster ──► PresenceJoin / PresenceLeave /
//!                                     full-roster PresenceSync
//! ```
//!
//! The relay is deliberately dumb: it never parses, buffers, or rebases an
//! operation list. Delivery is at-most-once and best-effort, ordered only
//! within a single sender connection, unordered across senders, and a
//! frame published into an empty room is dropped silently. Lost frames are
//! neither detected nor reported — consistency is the clients'
//! last-applier-wins policy, not the relay's.
//!
//! The one piece of state beyond membership is presence: on join the
//! actor's profile is resolved once via the node store and attached to an
//! immutable presence record before it is broadcast.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::protocol::{MessageType, PresenceRecord, RelayMessage};
use crate::rooms::RoomDirectory;
use crate::storage::NodeStore;

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Frames buffered per member before a lagging receiver drops
    pub broadcast_capacity: usize,
    /// Join guard; sessions beyond this are refused
    pub max_sessions_per_room: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            broadcast_capacity: 256,
            max_sessions_per_room: 100,
        }
    }
}

/// Relay-wide counters.
#[derive(Debug, Clone, Default)]
pub struct RelayStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_frames: u64,
    pub total_bytes: u64,
    pub active_rooms: usize,
}

/// The relay server.
pub struct RelayServer {
    config: RelayConfig,
    directory: Arc<RoomDirectory>,
    stats: Arc<RwLock<RelayStats>>,
    store: Arc<dyn NodeStore>,
}

impl RelayServer {
    pub fn new(config: RelayConfig, store: Arc<dyn NodeStore>) -> Self {
        let directory = Arc::new(RoomDirectory::new(config.broadcast_capacity));
        Self {
            config,
            directory,
            stats: Arc::new(RwLock::new(RelayStats::default())),
            store,
        }
    }

    /// Accept connections until the listener fails. Call from a runtime.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!("Relay listening on {}", self.config.bind_addr);

        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            let directory = self.directory.clone();
            let stats = self.stats.clone();
            let config = self.config.clone();
            let store = self.store.clone();

            tokio::spawn(async move {
                if let Err(e) =
                    Self::handle_connection(stream, addr, directory, stats, config, store).await
                {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    /// One task per connected session.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        directory: Arc<RoomDirectory>,
        stats: Arc<RwLock<RelayStats>>,
        config: RelayConfig,
        store: Arc<dyn NodeStore>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        log::info!("WebSocket connection established from {addr}");

        {
            let mut s = stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        // Per-connection state, populated by the JoinRoom frame.
        let mut session_id: Option<Uuid> = None;
        let mut room_id: Option<Uuid> = None;
        let mut presence: Option<PresenceRecord> = None;
        let mut room_rx: Option<tokio::sync::broadcast::Receiver<Arc<Vec<u8>>>> = None;

        loop {
            tokio::select! {
                // Inbound frame from this session
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Binary(data))) => {
                            let bytes: Vec<u8> = data.into();
                            let frame = match RelayMessage::decode(&bytes) {
                                Ok(frame) => frame,
                                Err(e) => {
                                    log::warn!("Failed to decode frame from {addr}: {e}");
                                    continue;
                                }
                            };

                            {
                                let mut s = stats.write().await;
                                s.total_frames += 1;
                                s.total_bytes += bytes.len() as u64;
                            }

                            match frame.msg_type {
                                MessageType::JoinRoom => {
                                    let request = match frame.join_request() {
                                        Ok(request) => request,
                                        Err(e) => {
                                            log::warn!("Bad join from {addr}: {e}");
                                            continue;
                                        }
                                    };

                                    let room = directory.get_or_create(frame.room_id).await;
                                    if room.session_count().await >= config.max_sessions_per_room {
                                        log::warn!(
                                            "Room {} full, refusing {}",
                                            frame.room_id, request.actor_id
                                        );
                                        break;
                                    }

                                    // Resolve the display identity once, before
                                    // the record is broadcast.
                                    let record = match store.actor_profile(&request.actor_id) {
                                        Ok(profile) => PresenceRecord {
                                            actor_id: profile.actor_id,
                                            display_label: profile.display_label,
                                            avatar_ref: profile.avatar_ref,
                                            session_ref: frame.session_id,
                                        },
                                        Err(_) => PresenceRecord {
                                            actor_id: request.actor_id.clone(),
                                            display_label: request.actor_id.clone(),
                                            avatar_ref: None,
                                            session_ref: frame.session_id,
                                        },
                                    };

                                    session_id = Some(frame.session_id);
                                    room_id = Some(frame.room_id);
                                    presence = Some(record.clone());

                                    let rx = room.add_session(record.clone()).await;
                                    room_rx = Some(rx);

                                    // Arrival: incremental join for the others
                                    // (the joiner filters its own session id),
                                    // then a full roster for everyone.
                                    let join = RelayMessage::presence_join(frame.room_id, &record);
                                    let _ = room.publish(&join);
                                    let roster = room.roster().await;
                                    let sync = RelayMessage::presence_sync(frame.room_id, &roster);
                                    let _ = room.publish(&sync);

                                    {
                                        let mut s = stats.write().await;
                                        s.active_rooms = directory.room_count().await;
                                    }

                                    log::info!(
                                        "{} ({}) joined room {}",
                                        record.display_label, record.actor_id, frame.room_id
                                    );
                                }

                                MessageType::Edit | MessageType::CursorMove => {
                                    // Forward the literal frame, pre-encoded —
                                    // nothing is inspected or rewritten. A room
                                    // with no other members delivers nowhere.
                                    let Some(joined) = room_id else {
                                        log::debug!("Frame from {addr} before join, dropped");
                                        continue;
                                    };
                                    if let Some(room) = directory.get(&joined).await {
                                        room.publish_raw(Arc::new(bytes));
                                    }
                                }

                                MessageType::Ping => {
                                    let pong = RelayMessage::pong(frame.session_id);
                                    let encoded = pong.encode()?;
                                    ws_sender.send(Message::Binary(encoded.into())).await?;
                                }

                                _ => {
                                    log::debug!("Unhandled frame type {:?} from {addr}", frame.msg_type);
                                }
                            }
                        }

                        Some(Ok(Message::Close(_))) | None => {
                            log::info!("Connection closed from {addr}");
                            break;
                        }

                        Some(Ok(Message::Ping(data))) => {
                            ws_sender.send(Message::Pong(data)).await?;
                        }

                        Some(Err(e)) => {
                            log::error!("WebSocket error from {addr}: {e}");
                            break;
                        }

                        _ => {}
                    }
                }

                // Outbound frame fanned out by the room
                msg = async {
                    match room_rx {
                        Some(ref mut rx) => rx.recv().await,
                        // Not joined yet — park until the join arrives.
                        None => std::future::pending().await,
                    }
                } => {
                    match msg {
                        Ok(data) => {
                            // Sender exclusion: no echo-back of own frames.
                            if let Ok(frame) = RelayMessage::decode(&data) {
                                if Some(frame.session_id) == session_id {
                                    continue;
                                }
                            }
                            ws_sender.send(Message::Binary(data.to_vec().into())).await?;
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            // Best-effort delivery: lagging receivers lose
                            // frames without notice.
                            log::warn!("Session {session_id:?} lagged by {n} frames");
                        }
                        Err(_) => break,
                    }
                }
            }
        }

        // Departure: membership removed, remaining members notified, the
        // room dropped once empty.
        if let (Some(joined), Some(record)) = (room_id, presence) {
            if let Some(room) = directory.get(&joined).await {
                room.remove_session(&record.session_ref).await;

                let leave = RelayMessage::presence_leave(joined, &record);
                let _ = room.publish(&leave);
                let roster = room.roster().await;
                let sync = RelayMessage::presence_sync(joined, &roster);
                let _ = room.publish(&sync);

                if room.session_count().await == 0 {
                    directory.remove_if_empty(&joined).await;
                    log::info!("Room {joined} removed (empty)");
                }
            }

            log::info!("{} left room {}", record.actor_id, joined);
        }

        {
            let mut s = stats.write().await;
            s.active_connections = s.active_connections.saturating_sub(1);
            s.active_rooms = directory.room_count().await;
        }

        Ok(())
    }

    pub async fn stats(&self) -> RelayStats {
        self.stats.read().await.clone()
    }

    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    pub fn directory(&self) -> &Arc<RoomDirectory> {
        &self.directory
    }

    pub fn store(&self) -> &Arc<dyn NodeStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn test_server() -> RelayServer {
        RelayServer::new(RelayConfig::default(), Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_config_default() {
        let config = RelayConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:9090");
        assert_eq!(config.broadcast_capacity, 256);
        assert_eq!(config.max_sessions_per_room, 100);
    }

    #[test]
    fn test_server_creation() {
        let server = test_server();
        assert_eq!(server.bind_addr(), "127.0.0.1:9090");
    }

    #[tokio::test]
    async fn test_initial_stats() {
        let server = test_server();
        let stats = server.stats().await;
        assert_eq!(stats.total_connections, 0);
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.total_frames, 0);
        assert_eq!(stats.total_bytes, 0);
        assert_eq!(stats.active_rooms, 0);
    }

    #[tokio::test]
    async fn test_directory_starts_empty() {
        let server = test_server();
        assert_eq!(server.directory().room_count().await, 0);
    }
}
