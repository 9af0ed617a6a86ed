//! Room fan-out: one broadcast channel per open document.
//!
//! A room is runtime-only state keyed by document id. It is created
//! implicitly on first join and inert once every session has left — there
//! is no explicit teardown protocol. Publishing into an empty room delivers
//! to nobody and is not an error.
//!
//! Uses tokio broadcast channels so a publish is O(1) regardless of member
//! count; each member consumes from its own receiver. Send stats are
//! tracked with atomics so the publish path never takes a lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::protocol::{PresenceRecord, ProtocolError, RelayMessage};

/// Fan-out health counters.
#[derive(Debug, Clone, Default)]
pub struct RoomStats {
    pub frames_published: u64,
    pub active_sessions: usize,
}

struct AtomicRoomStats {
    frames_published: AtomicU64,
}

/// A single document room: fan-out channel plus the live roster.
///
/// The roster is the presence source of truth on the relay side; every
/// membership change produces a fresh full-roster sync for the members.
pub struct Room {
    sender: broadcast::Sender<Arc<Vec<u8>>>,
    /// session id → presence record (immutable once created)
    members: Arc<RwLock<HashMap<Uuid, PresenceRecord>>>,
    capacity: usize,
    stats: Arc<AtomicRoomStats>,
}

impl Room {
    /// `capacity` bounds frames buffered per member before a lagging
    /// receiver starts dropping (best-effort delivery by design).
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            members: Arc::new(RwLock::new(HashMap::new())),
            capacity,
            stats: Arc::new(AtomicRoomStats {
                frames_published: AtomicU64::new(0),
            }),
        }
    }

    /// Add a session; returns the receiver it consumes frames from.
    pub async fn add_session(&self, record: PresenceRecord) -> broadcast::Receiver<Arc<Vec<u8>>> {
        let mut members = self.members.write().await;
        members.insert(record.session_ref, record);
        self.sender.subscribe()
    }

    /// Remove a session, returning its presence record if it was present.
    pub async fn remove_session(&self, session_id: &Uuid) -> Option<PresenceRecord> {
        let mut members = self.members.write().await;
        members.remove(session_id)
    }

    /// Publish an encoded frame to every member's receiver.
    ///
    /// Sender exclusion happens on the receive side (session-id filter);
    /// an empty room returns 0 without error.
    pub fn publish(&self, msg: &RelayMessage) -> Result<usize, ProtocolError> {
        let encoded = Arc::new(msg.encode()?);
        Ok(self.publish_raw(encoded))
    }

    /// Publish pre-encoded bytes (no re-serialization on forward).
    pub fn publish_raw(&self, encoded: Arc<Vec<u8>>) -> usize {
        let receivers = self.sender.send(encoded).unwrap_or(0);
        self.stats.frames_published.fetch_add(1, Ordering::Relaxed);
        receivers
    }

    pub async fn session_count(&self) -> usize {
        self.members.read().await.len()
    }

    pub async fn contains(&self, session_id: &Uuid) -> bool {
        self.members.read().await.contains_key(session_id)
    }

    /// Current roster, ordered by display label then actor id so sync
    /// payloads are deterministic.
    pub async fn roster(&self) -> Vec<PresenceRecord> {
        let members = self.members.read().await;
        let mut roster: Vec<PresenceRecord> = members.values().cloned().collect();
        roster.sort_by(|a, b| {
            a.display_label
                .cmp(&b.display_label)
                .then_with(|| a.actor_id.cmp(&b.actor_id))
        });
        roster
    }

    pub async fn stats(&self) -> RoomStats {
        let members = self.members.read().await;
        RoomStats {
            frames_published: self.stats.frames_published.load(Ordering::Relaxed),
            active_sessions: members.len(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Raw subscription without joining the roster (relay internals).
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Vec<u8>>> {
        self.sender.subscribe()
    }
}

/// Maps document ids to rooms, creating them on first join.
pub struct RoomDirectory {
    rooms: Arc<RwLock<HashMap<Uuid, Arc<Room>>>>,
    default_capacity: usize,
}

impl RoomDirectory {
    pub fn new(default_capacity: usize) -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            default_capacity,
        }
    }

    /// Get the room for a document, creating it implicitly.
    pub async fn get_or_create(&self, doc_id: Uuid) -> Arc<Room> {
        // Fast path: read lock
        {
            let rooms = self.rooms.read().await;
            if let Some(room) = rooms.get(&doc_id) {
                return room.clone();
            }
        }

        // Slow path: write lock, re-check after acquiring
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get(&doc_id) {
            return room.clone();
        }

        let room = Arc::new(Room::new(self.default_capacity));
        rooms.insert(doc_id, room.clone());
        room
    }

    /// Lookup without creating.
    pub async fn get(&self, doc_id: &Uuid) -> Option<Arc<Room>> {
        self.rooms.read().await.get(doc_id).cloned()
    }

    /// Drop a room once its member set is empty.
    pub async fn remove_if_empty(&self, doc_id: &Uuid) -> bool {
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get(doc_id) {
            if room.session_count().await == 0 {
                rooms.remove(doc_id);
                return true;
            }
        }
        false
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn active_documents(&self) -> Vec<Uuid> {
        self.rooms.read().await.keys().cloned().collect()
    }
}
