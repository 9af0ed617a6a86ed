//! Binary relay protocol.
//!
//! Every frame is one bincode-encoded [`RelayMessage`]:
//! ```text
//! ┌──────────┬────────────┬──────────┬──────────┐
//! │ msg_type │ session_id │ room_id  │ payload  │
//! │ 1 byte   │ 16 bytes   │ 16 bytes │ variable │
//! └──────────┴────────────┴──────────┴──────────┘
//! ```
//!
//! Rooms are keyed by document id. Edit payloads carry the JSON-serialized
//! operation list exactly as produced by the sending editor — the relay
//! never parses, reorders, or rebases it. Presence payloads (join/leave
//! records, full-roster syncs) and cursor updates are bincode-encoded.

use inkspace_core::Delta;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Relay frame types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    /// Session joins a document room (first frame on every connection)
    JoinRoom = 1,
    /// A rich-text edit, fanned out to every other room member
    Edit = 2,
    /// Cursor position update, same fan-out rule as edits
    CursorMove = 3,
    /// Full roster, sent to every member whenever membership changes
    PresenceSync = 4,
    /// A new actor appeared
    PresenceJoin = 5,
    /// An actor disconnected
    PresenceLeave = 6,
    /// Heartbeat ping
    Ping = 7,
    /// Heartbeat pong
    Pong = 8,
}

/// A collaborator visible in a room.
///
/// Created when a join is acknowledged (profile resolved once via the
/// document store), immutable thereafter, destroyed on leave/disconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub actor_id: String,
    pub display_label: String,
    pub avatar_ref: Option<String>,
    /// The connection this record belongs to.
    pub session_ref: Uuid,
}

/// A cursor selection: start index plus selected length (0 = caret).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorRange {
    pub index: u32,
    pub length: u32,
}

impl CursorRange {
    pub fn caret(index: u32) -> Self {
        Self { index, length: 0 }
    }
}

/// Cursor payload. `range: None` clears the sender's cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorUpdate {
    pub actor_id: String,
    pub range: Option<CursorRange>,
}

/// JoinRoom payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRequest {
    pub actor_id: String,
}

/// Top-level relay frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayMessage {
    pub msg_type: MessageType,
    /// Originating session; `Uuid::nil()` for relay-originated frames.
    pub session_id: Uuid,
    /// Document id this frame routes to.
    pub room_id: Uuid,
    pub payload: Vec<u8>,
}

impl RelayMessage {
    /// First frame of a connection: join the room for `room_id`.
    pub fn join_room(session_id: Uuid, room_id: Uuid, actor_id: &str) -> Self {
        let payload = bincode::serde::encode_to_vec(
            JoinRequest {
                actor_id: actor_id.to_string(),
            },
            bincode::config::standard(),
        )
        .unwrap_or_default();
        Self {
            msg_type: MessageType::JoinRoom,
            session_id,
            room_id,
            payload,
        }
    }

    /// An edit carrying the literal JSON operation list.
    pub fn edit(session_id: Uuid, room_id: Uuid, delta_json: Vec<u8>) -> Self {
        Self {
            msg_type: MessageType::Edit,
            session_id,
            room_id,
            payload: delta_json,
        }
    }

    /// A cursor move (or clear, when `range` is `None`).
    pub fn cursor_move(
        session_id: Uuid,
        room_id: Uuid,
        actor_id: &str,
        range: Option<CursorRange>,
    ) -> Self {
        let payload = bincode::serde::encode_to_vec(
            CursorUpdate {
                actor_id: actor_id.to_string(),
                range,
            },
            bincode::config::standard(),
        )
        .unwrap_or_default();
        Self {
            msg_type: MessageType::CursorMove,
            session_id,
            room_id,
            payload,
        }
    }

    /// Full-roster sync, relay-originated.
    pub fn presence_sync(room_id: Uuid, roster: &[PresenceRecord]) -> Self {
        let payload = bincode::serde::encode_to_vec(roster, bincode::config::standard())
            .unwrap_or_default();
        Self {
            msg_type: MessageType::PresenceSync,
            session_id: Uuid::nil(),
            room_id,
            payload,
        }
    }

    /// An actor joined; `session_id` is the joiner's so it can filter the echo.
    pub fn presence_join(room_id: Uuid, record: &PresenceRecord) -> Self {
        let payload = bincode::serde::encode_to_vec(record, bincode::config::standard())
            .unwrap_or_default();
        Self {
            msg_type: MessageType::PresenceJoin,
            session_id: record.session_ref,
            room_id,
            payload,
        }
    }

    /// An actor left; `session_id` is the departer's.
    pub fn presence_leave(room_id: Uuid, record: &PresenceRecord) -> Self {
        let payload = bincode::serde::encode_to_vec(record, bincode::config::standard())
            .unwrap_or_default();
        Self {
            msg_type: MessageType::PresenceLeave,
            session_id: record.session_ref,
            room_id,
            payload,
        }
    }

    pub fn ping(session_id: Uuid) -> Self {
        Self {
            msg_type: MessageType::Ping,
            session_id,
            room_id: Uuid::nil(),
            payload: Vec::new(),
        }
    }

    pub fn pong(session_id: Uuid) -> Self {
        Self {
            msg_type: MessageType::Pong,
            session_id,
            room_id: Uuid::nil(),
            payload: Vec::new(),
        }
    }

    /// Serialize to the binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::SerializationError(e.to_string()))
    }

    /// Deserialize from the binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (msg, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
        Ok(msg)
    }

    // ── Typed payload accessors ─────────────────────────────────────

    pub fn join_request(&self) -> Result<JoinRequest, ProtocolError> {
        if self.msg_type != MessageType::JoinRoom {
            return Err(ProtocolError::InvalidMessageType);
        }
        decode_payload(&self.payload)
    }

    /// Parse the operation list out of an Edit frame.
    pub fn edit_delta(&self) -> Result<Delta, ProtocolError> {
        if self.msg_type != MessageType::Edit {
            return Err(ProtocolError::InvalidMessageType);
        }
        let json = std::str::from_utf8(&self.payload)
            .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
        Delta::from_json(json).map_err(|e| ProtocolError::DeserializationError(e.to_string()))
    }

    pub fn cursor_update(&self) -> Result<CursorUpdate, ProtocolError> {
        if self.msg_type != MessageType::CursorMove {
            return Err(ProtocolError::InvalidMessageType);
        }
        decode_payload(&self.payload)
    }

    pub fn roster(&self) -> Result<Vec<PresenceRecord>, ProtocolError> {
        if self.msg_type != MessageType::PresenceSync {
            return Err(ProtocolError::InvalidMessageType);
        }
        decode_payload(&self.payload)
    }

    pub fn presence_record(&self) -> Result<PresenceRecord, ProtocolError> {
        if self.msg_type != MessageType::PresenceJoin
            && self.msg_type != MessageType::PresenceLeave
        {
            return Err(ProtocolError::InvalidMessageType);
        }
        decode_payload(&self.payload)
    }
}

fn decode_payload<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, ProtocolError> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
    Ok(value)
}

/// Protocol errors.
#[derive(Debug, Clone)]
pub enum ProtocolError {
    SerializationError(String),
    DeserializationError(String),
    InvalidMessageType,
    ConnectionClosed,
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SerializationError(e) => write!(f, "Serialization error: {e}"),
            Self::DeserializationError(e) => write!(f, "Deserialization error: {e}"),
            Self::InvalidMessageType => write!(f, "Invalid message type"),
            Self::ConnectionClosed => write!(f, "Connection closed"),
        }
    }
}

impl std::error::Error for ProtocolError {}

#[cfg(test)]
mod tests {
    use super::*;
    use inkspace_core::Delta;

    fn record(actor: &str) -> PresenceRecord {
        PresenceRecord {
            actor_id: actor.to_string(),
            display_label: actor.split('@').next().unwrap_or(actor).to_string(),
            avatar_ref: None,
            session_ref: Uuid::new_v4(),
        }
    }

    #[test]
    fn test_join_room_roundtrip() {
        let session = Uuid::new_v4();
        let room = Uuid::new_v4();

        let msg = RelayMessage::join_room(session, room, "alice@x");
        let decoded = RelayMessage::decode(&msg.encode().unwrap()).unwrap();

        assert_eq!(decoded.msg_type, MessageType::JoinRoom);
        assert_eq!(decoded.session_id, session);
        assert_eq!(decoded.room_id, room);
        assert_eq!(decoded.join_request().unwrap().actor_id, "alice@x");
    }

    #[test]
    fn test_edit_roundtrip() {
        let delta = Delta::new().insert("hi");
        let json = delta.to_json().unwrap().into_bytes();

        let msg = RelayMessage::edit(Uuid::new_v4(), Uuid::new_v4(), json);
        let decoded = RelayMessage::decode(&msg.encode().unwrap()).unwrap();

        assert_eq!(decoded.msg_type, MessageType::Edit);
        assert_eq!(decoded.edit_delta().unwrap(), delta);
    }

    #[test]
    fn test_edit_payload_forwarded_verbatim() {
        // The payload bytes must survive encode/decode untouched — the relay
        // forwards the literal operation list.
        let json = Delta::new().retain(3).insert("x").to_json().unwrap();
        let msg = RelayMessage::edit(Uuid::new_v4(), Uuid::new_v4(), json.clone().into_bytes());
        let decoded = RelayMessage::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded.payload, json.into_bytes());
    }

    #[test]
    fn test_cursor_move_roundtrip() {
        let msg = RelayMessage::cursor_move(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "bob@x",
            Some(CursorRange {
                index: 12,
                length: 4,
            }),
        );
        let decoded = RelayMessage::decode(&msg.encode().unwrap()).unwrap();

        let update = decoded.cursor_update().unwrap();
        assert_eq!(update.actor_id, "bob@x");
        assert_eq!(
            update.range,
            Some(CursorRange {
                index: 12,
                length: 4
            })
        );
    }

    #[test]
    fn test_cursor_clear_roundtrip() {
        let msg = RelayMessage::cursor_move(Uuid::new_v4(), Uuid::new_v4(), "bob@x", None);
        let decoded = RelayMessage::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded.cursor_update().unwrap().range, None);
    }

    #[test]
    fn test_presence_sync_roundtrip() {
        let roster = vec![record("alice@x"), record("bob@x")];
        let msg = RelayMessage::presence_sync(Uuid::new_v4(), &roster);
        let decoded = RelayMessage::decode(&msg.encode().unwrap()).unwrap();

        assert_eq!(decoded.msg_type, MessageType::PresenceSync);
        assert_eq!(decoded.session_id, Uuid::nil());
        assert_eq!(decoded.roster().unwrap(), roster);
    }

    #[test]
    fn test_presence_join_carries_joiner_session() {
        let rec = record("alice@x");
        let msg = RelayMessage::presence_join(Uuid::new_v4(), &rec);
        assert_eq!(msg.session_id, rec.session_ref);

        let decoded = RelayMessage::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded.presence_record().unwrap(), rec);
    }

    #[test]
    fn test_presence_leave_roundtrip() {
        let rec = record("bob@x");
        let msg = RelayMessage::presence_leave(Uuid::new_v4(), &rec);
        let decoded = RelayMessage::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded.msg_type, MessageType::PresenceLeave);
        assert_eq!(decoded.presence_record().unwrap(), rec);
    }

    #[test]
    fn test_ping_pong() {
        let session = Uuid::new_v4();
        let ping = RelayMessage::decode(&RelayMessage::ping(session).encode().unwrap()).unwrap();
        let pong = RelayMessage::decode(&RelayMessage::pong(session).encode().unwrap()).unwrap();
        assert_eq!(ping.msg_type, MessageType::Ping);
        assert_eq!(pong.msg_type, MessageType::Pong);
        assert!(ping.payload.is_empty());
    }

    #[test]
    fn test_wrong_accessor_errors() {
        let msg = RelayMessage::ping(Uuid::new_v4());
        assert!(msg.edit_delta().is_err());
        assert!(msg.roster().is_err());
        assert!(msg.cursor_update().is_err());
        assert!(msg.presence_record().is_err());
        assert!(msg.join_request().is_err());
    }

    #[test]
    fn test_decode_garbage_errors() {
        assert!(RelayMessage::decode(&[0xFF, 0xFE, 0xFD]).is_err());
    }

    #[test]
    fn test_malformed_edit_payload_errors() {
        let msg = RelayMessage::edit(Uuid::new_v4(), Uuid::new_v4(), b"not json".to_vec());
        assert!(msg.edit_delta().is_err());
    }

    #[test]
    fn test_frame_size_small() {
        // Envelope overhead should stay well under 64 bytes.
        let msg = RelayMessage::edit(Uuid::new_v4(), Uuid::new_v4(), Vec::new());
        let encoded = msg.encode().unwrap();
        assert!(encoded.len() < 64, "empty edit frame is {} bytes", encoded.len());
    }
}
