//! Client-side presence: who else is in the room, and where their cursors
//! are.
//!
//! The relay broadcasts a full roster whenever membership changes, plus
//! incremental join/leave records. Each client diffs the incoming roster
//! against its previous local copy to create and tear down cursor overlays
//! for its peers — never for itself, and a client never sees a
//! self-directed join notification.
//!
//! Cursor overlays are transient and last-write-wins per actor. Leaving a
//! document clears the whole mirror; nothing survives a room change.

use std::collections::HashMap;

use crate::protocol::{CursorRange, PresenceRecord};

/// A peer's cursor overlay. `range: None` is a cleared cursor whose owner
/// is still present.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorOverlay {
    pub actor_id: String,
    pub range: Option<CursorRange>,
}

/// Roster changes produced by a full sync, for UI overlay management.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncDiff {
    pub joined: Vec<PresenceRecord>,
    pub left: Vec<PresenceRecord>,
}

impl SyncDiff {
    pub fn is_empty(&self) -> bool {
        self.joined.is_empty() && self.left.is_empty()
    }
}

/// Per-room presence mirror for one client.
pub struct RoomPresence {
    local_actor_id: String,
    /// actor id → record, peers only (the local actor is never tracked).
    peers: HashMap<String, PresenceRecord>,
    /// actor id → overlay, last-write-wins.
    overlays: HashMap<String, CursorOverlay>,
}

impl RoomPresence {
    pub fn new(local_actor_id: impl Into<String>) -> Self {
        Self {
            local_actor_id: local_actor_id.into(),
            peers: HashMap::new(),
            overlays: HashMap::new(),
        }
    }

    pub fn local_actor_id(&self) -> &str {
        &self.local_actor_id
    }

    /// Apply a full roster sync.
    ///
    /// Diffs against the previous local copy: new peers get an (empty)
    /// overlay created, departed peers have theirs torn down. The local
    /// actor never appears in the diff.
    pub fn apply_sync(&mut self, roster: Vec<PresenceRecord>) -> SyncDiff {
        let mut diff = SyncDiff::default();

        let mut incoming: HashMap<String, PresenceRecord> = HashMap::new();
        for record in roster {
            if record.actor_id == self.local_actor_id {
                continue;
            }
            incoming.insert(record.actor_id.clone(), record);
        }

        for (actor_id, record) in &incoming {
            if !self.peers.contains_key(actor_id) {
                diff.joined.push(record.clone());
                self.overlays.insert(
                    actor_id.clone(),
                    CursorOverlay {
                        actor_id: actor_id.clone(),
                        range: None,
                    },
                );
            }
        }

        let departed: Vec<String> = self
            .peers
            .keys()
            .filter(|id| !incoming.contains_key(*id))
            .cloned()
            .collect();
        for actor_id in departed {
            if let Some(record) = self.peers.remove(&actor_id) {
                diff.left.push(record);
            }
            self.overlays.remove(&actor_id);
        }

        self.peers = incoming;
        diff
    }

    /// Apply an incremental join.
    ///
    /// Returns the record for UI notification, or `None` when it is the
    /// local actor's own join echo.
    pub fn apply_join(&mut self, record: PresenceRecord) -> Option<PresenceRecord> {
        if record.actor_id == self.local_actor_id {
            return None;
        }
        self.overlays
            .entry(record.actor_id.clone())
            .or_insert_with(|| CursorOverlay {
                actor_id: record.actor_id.clone(),
                range: None,
            });
        self.peers.insert(record.actor_id.clone(), record.clone());
        Some(record)
    }

    /// Apply an incremental leave: membership removed, overlay torn down.
    ///
    /// Returns the departed record for UI notification, or `None` for the
    /// local actor or an unknown peer.
    pub fn apply_leave(&mut self, record: &PresenceRecord) -> Option<PresenceRecord> {
        if record.actor_id == self.local_actor_id {
            return None;
        }
        self.overlays.remove(&record.actor_id);
        self.peers.remove(&record.actor_id)
    }

    /// Apply a cursor update, last-write-wins.
    ///
    /// Local echoes and cursors from actors not in the roster are ignored.
    pub fn apply_cursor(&mut self, actor_id: &str, range: Option<CursorRange>) {
        if actor_id == self.local_actor_id || !self.peers.contains_key(actor_id) {
            return;
        }
        self.overlays.insert(
            actor_id.to_string(),
            CursorOverlay {
                actor_id: actor_id.to_string(),
                range,
            },
        );
    }

    /// Leaving the document: discard the roster and every overlay.
    pub fn clear(&mut self) {
        self.peers.clear();
        self.overlays.clear();
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn peer(&self, actor_id: &str) -> Option<&PresenceRecord> {
        self.peers.get(actor_id)
    }

    /// Roster ordered by display label for stable UI rendering.
    pub fn roster(&self) -> Vec<&PresenceRecord> {
        let mut roster: Vec<&PresenceRecord> = self.peers.values().collect();
        roster.sort_by(|a, b| {
            a.display_label
                .cmp(&b.display_label)
                .then_with(|| a.actor_id.cmp(&b.actor_id))
        });
        roster
    }

    pub fn overlay(&self, actor_id: &str) -> Option<&CursorOverlay> {
        self.overlays.get(actor_id)
    }

    pub fn overlays(&self) -> &HashMap<String, CursorOverlay> {
        &self.overlays
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn record(actor: &str) -> PresenceRecord {
        PresenceRecord {
            actor_id: actor.to_string(),
            display_label: actor.split('@').next().unwrap_or(actor).to_string(),
            avatar_ref: None,
            session_ref: Uuid::new_v4(),
        }
    }

    #[test]
    fn test_sync_creates_overlays_for_peers_only() {
        let mut presence = RoomPresence::new("alice@x");
        let diff = presence.apply_sync(vec![record("alice@x"), record("bob@x")]);

        assert_eq!(diff.joined.len(), 1);
        assert_eq!(diff.joined[0].actor_id, "bob@x");
        assert!(diff.left.is_empty());

        assert_eq!(presence.peer_count(), 1);
        assert!(presence.overlay("bob@x").is_some());
        // Never an overlay for the local actor.
        assert!(presence.overlay("alice@x").is_none());
    }

    #[test]
    fn test_sync_diff_detects_departure() {
        let mut presence = RoomPresence::new("alice@x");
        presence.apply_sync(vec![record("bob@x"), record("carol@x")]);

        let diff = presence.apply_sync(vec![record("bob@x")]);
        assert!(diff.joined.is_empty());
        assert_eq!(diff.left.len(), 1);
        assert_eq!(diff.left[0].actor_id, "carol@x");
        assert!(presence.overlay("carol@x").is_none());
    }

    #[test]
    fn test_repeat_sync_is_quiet() {
        let mut presence = RoomPresence::new("alice@x");
        presence.apply_sync(vec![record("bob@x")]);
        let diff = presence.apply_sync(vec![record("bob@x")]);
        assert!(diff.is_empty());
    }

    #[test]
    fn test_join_self_is_filtered() {
        let mut presence = RoomPresence::new("alice@x");
        assert!(presence.apply_join(record("alice@x")).is_none());
        assert_eq!(presence.peer_count(), 0);
    }

    #[test]
    fn test_join_peer_notifies() {
        let mut presence = RoomPresence::new("bob@x");
        let notice = presence.apply_join(record("alice@x"));
        assert_eq!(notice.unwrap().actor_id, "alice@x");
        assert_eq!(presence.peer_count(), 1);
        assert!(presence.overlay("alice@x").is_some());
    }

    #[test]
    fn test_leave_tears_down_overlay() {
        let mut presence = RoomPresence::new("alice@x");
        let bob = record("bob@x");
        presence.apply_join(bob.clone());
        presence.apply_cursor("bob@x", Some(CursorRange::caret(3)));
        assert!(presence.overlay("bob@x").unwrap().range.is_some());

        let notice = presence.apply_leave(&bob);
        assert_eq!(notice.unwrap().actor_id, "bob@x");
        assert!(presence.overlay("bob@x").is_none());
        assert_eq!(presence.peer_count(), 0);
    }

    #[test]
    fn test_leave_unknown_is_quiet() {
        let mut presence = RoomPresence::new("alice@x");
        assert!(presence.apply_leave(&record("ghost@x")).is_none());
    }

    #[test]
    fn test_cursor_last_write_wins() {
        let mut presence = RoomPresence::new("alice@x");
        presence.apply_join(record("bob@x"));

        presence.apply_cursor("bob@x", Some(CursorRange { index: 1, length: 0 }));
        presence.apply_cursor("bob@x", Some(CursorRange { index: 9, length: 4 }));

        let overlay = presence.overlay("bob@x").unwrap();
        assert_eq!(overlay.range, Some(CursorRange { index: 9, length: 4 }));
    }

    #[test]
    fn test_cursor_clear_keeps_member() {
        let mut presence = RoomPresence::new("alice@x");
        presence.apply_join(record("bob@x"));
        presence.apply_cursor("bob@x", Some(CursorRange::caret(5)));
        presence.apply_cursor("bob@x", None);

        assert_eq!(presence.overlay("bob@x").unwrap().range, None);
        assert_eq!(presence.peer_count(), 1);
    }

    #[test]
    fn test_cursor_from_self_or_stranger_ignored() {
        let mut presence = RoomPresence::new("alice@x");
        presence.apply_cursor("alice@x", Some(CursorRange::caret(1)));
        presence.apply_cursor("stranger@x", Some(CursorRange::caret(2)));
        assert!(presence.overlays().is_empty());
    }

    #[test]
    fn test_clear_discards_everything() {
        let mut presence = RoomPresence::new("alice@x");
        presence.apply_sync(vec![record("bob@x"), record("carol@x")]);
        presence.apply_cursor("bob@x", Some(CursorRange::caret(7)));

        presence.clear();
        assert_eq!(presence.peer_count(), 0);
        assert!(presence.overlays().is_empty());
    }

    #[test]
    fn test_roster_ordering() {
        let mut presence = RoomPresence::new("me@x");
        presence.apply_sync(vec![record("zoe@x"), record("alice@x"), record("bob@x")]);
        let labels: Vec<&str> = presence
            .roster()
            .iter()
            .map(|r| r.display_label.as_str())
            .collect();
        assert_eq!(labels, vec!["alice", "bob", "zoe"]);
    }
}
