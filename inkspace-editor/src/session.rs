//! Editor session: one open document on one client.
//!
//! Data flow for a local edit:
//!
//! ```text
//! keystroke → Delta
//!     │
//!     ├─ 1. apply synchronously to local content (UI-authoritative)
//!     ├─ 2. re-arm the autosave timer with the new snapshot
//!     └─ 3. broadcast the literal operation list to room peers
//! ```
//!
//! Received operation lists are applied directly to local content in
//! arrival order. This is last-applier-wins: no rebase is attempted, and
//! two sessions editing overlapping ranges inside one round-trip window
//! can diverge. A malformed remote delta is logged and skipped rather
//! than corrupting the local copy.
//!
//! Closing the session flushes the pending autosave window, disconnects
//! the relay, and discards every presence overlay.

use std::sync::Arc;
use uuid::Uuid;

use inkspace_collab::{
    CursorRange, NodeStore, PresenceRecord, RelayEvent, RelaySession, RoomPresence, StoreError,
    SyncDiff,
};
use inkspace_core::{Delta, DeltaError, NodeKind, RichText};

use crate::autosave::AutosaveScheduler;

/// What a handled relay event means for the UI layer.
#[derive(Debug, Clone)]
pub enum SessionNotice {
    /// Show a "X joined" toast.
    PeerJoined(PresenceRecord),
    /// Show a "X left" toast; their cursor overlay is already gone.
    PeerLeft(PresenceRecord),
    /// Roster changed via full sync; overlays were created/removed.
    RosterChanged(SyncDiff),
    /// The relay connection is gone; editing continues locally.
    ConnectionLost,
}

/// One open document: local content, debounced persistence, presence, and
/// an optional live relay connection.
pub struct EditorSession {
    node_id: Uuid,
    kind: NodeKind,
    content: RichText,
    autosave: AutosaveScheduler,
    presence: RoomPresence,
    relay: Option<RelaySession>,
    connected: bool,
}

impl EditorSession {
    /// Load a node from the store and open it for editing.
    pub fn open(
        store: Arc<dyn NodeStore>,
        kind: NodeKind,
        node_id: Uuid,
        actor_id: impl Into<String>,
    ) -> Result<Self, SessionError> {
        let node = store.get_node(kind, node_id)?;
        let content = decode_content(&node.content)?;

        Ok(Self {
            node_id,
            kind,
            content,
            autosave: AutosaveScheduler::new(store, node_id),
            presence: RoomPresence::new(actor_id),
            relay: None,
            connected: false,
        })
    }

    /// Open with a custom scheduler (tests shrink its quiet period).
    pub fn open_with_scheduler(
        store: Arc<dyn NodeStore>,
        kind: NodeKind,
        node_id: Uuid,
        actor_id: impl Into<String>,
        autosave: AutosaveScheduler,
    ) -> Result<Self, SessionError> {
        let node = store.get_node(kind, node_id)?;
        let content = decode_content(&node.content)?;

        Ok(Self {
            node_id,
            kind,
            content,
            autosave,
            presence: RoomPresence::new(actor_id),
            relay: None,
            connected: false,
        })
    }

    /// Attach an already-constructed relay session (typically connected by
    /// the caller just before).
    pub fn attach_relay(&mut self, relay: RelaySession) {
        self.relay = Some(relay);
    }

    /// Apply a local edit.
    ///
    /// The edit lands synchronously in local content first, then arms the
    /// debounced persist, then goes out to peers unmodified. The store
    /// round-trip is never awaited — the tree and this session stay
    /// optimistically authoritative.
    pub async fn edit(&mut self, delta: &Delta) -> Result<(), DeltaError> {
        self.content = self.content.apply(delta)?;

        let snapshot = self.snapshot_delta().to_json()?;
        self.autosave.schedule(snapshot);

        if self.connected {
            if let Some(relay) = &self.relay {
                if let Err(e) = relay.send_edit(delta).await {
                    log::warn!("Edit broadcast failed: {e}");
                }
            }
        }

        Ok(())
    }

    /// Forward the local cursor (or clear it with `None`).
    pub async fn move_cursor(&self, range: Option<CursorRange>) {
        if !self.connected {
            return;
        }
        if let Some(relay) = &self.relay {
            if let Err(e) = relay.send_cursor(range).await {
                log::warn!("Cursor broadcast failed: {e}");
            }
        }
    }

    /// Route a relay event into content/presence state.
    pub fn handle_event(&mut self, event: RelayEvent) -> Option<SessionNotice> {
        match event {
            RelayEvent::Connected => {
                self.connected = true;
                None
            }
            RelayEvent::Disconnected => {
                self.connected = false;
                Some(SessionNotice::ConnectionLost)
            }
            RelayEvent::RemoteEdit { delta } => {
                // Last-applier-wins: apply in arrival order, skip on error.
                match self.content.apply(&delta) {
                    Ok(next) => self.content = next,
                    Err(e) => {
                        log::warn!("Skipping malformed remote delta: {e}");
                    }
                }
                None
            }
            RelayEvent::RemoteCursor { actor_id, range } => {
                self.presence.apply_cursor(&actor_id, range);
                None
            }
            RelayEvent::Roster(roster) => {
                let diff = self.presence.apply_sync(roster);
                if diff.is_empty() {
                    None
                } else {
                    Some(SessionNotice::RosterChanged(diff))
                }
            }
            RelayEvent::ActorJoined(record) => self
                .presence
                .apply_join(record)
                .map(SessionNotice::PeerJoined),
            RelayEvent::ActorLeft(record) => self
                .presence
                .apply_leave(&record)
                .map(SessionNotice::PeerLeft),
        }
    }

    /// Close the document: flush the pending autosave window, leave the
    /// room, discard overlays.
    pub async fn close(&mut self) {
        self.autosave.flush().await;
        if let Some(relay) = &mut self.relay {
            relay.disconnect().await;
        }
        self.connected = false;
        self.presence.clear();
    }

    /// Full document as an operation list (what the store receives).
    pub fn snapshot_delta(&self) -> Delta {
        let mut delta = Delta::new();
        for span in self.content.spans() {
            delta = if span.attributes.is_empty() {
                delta.insert(span.text.clone())
            } else {
                delta.insert_with(span.text.clone(), span.attributes.clone())
            };
        }
        delta
    }

    pub fn content(&self) -> &RichText {
        &self.content
    }

    pub fn plain_text(&self) -> String {
        self.content.plain()
    }

    pub fn presence(&self) -> &RoomPresence {
        &self.presence
    }

    pub fn node_id(&self) -> Uuid {
        self.node_id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// True while relay-connected (false means local-only editing).
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// False when a persist failed or a snapshot is still pending.
    pub fn is_synced(&self) -> bool {
        !self.autosave.unsaved() && !self.autosave.has_pending()
    }

    pub fn autosave(&self) -> &AutosaveScheduler {
        &self.autosave
    }
}

/// Stored content → in-memory document. Empty content is an empty doc.
fn decode_content(content: &str) -> Result<RichText, SessionError> {
    if content.is_empty() {
        return Ok(RichText::new());
    }
    let delta = Delta::from_json(content)?;
    Ok(RichText::new().apply(&delta)?)
}

/// Session errors.
#[derive(Debug)]
pub enum SessionError {
    Store(StoreError),
    Delta(DeltaError),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Store(e) => write!(f, "Store error: {e}"),
            SessionError::Delta(e) => write!(f, "Delta error: {e}"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<StoreError> for SessionError {
    fn from(e: StoreError) -> Self {
        SessionError::Store(e)
    }
}

impl From<DeltaError> for SessionError {
    fn from(e: DeltaError) -> Self {
        SessionError::Delta(e)
    }
}
