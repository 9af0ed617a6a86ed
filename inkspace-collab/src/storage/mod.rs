//! Document store: the persistence contract behind the editor.
//!
//! Every operation returns a typed result (the `{data, error}` contract of
//! the upstream persistence API). Two backends:
//!
//! - [`MemoryStore`] — HashMap-backed, for tests and local-only operation
//! - [`RocksNodeStore`] — RocksDB column families with LZ4-compressed
//!   records, for the durable relay deployment
//!
//! Children are listed in ascending creation-time order; deleting a node
//! cascades to every descendant.

pub mod memory;
pub mod rocks;

pub use memory::MemoryStore;
pub use rocks::{RocksNodeStore, StoreConfig};

use inkspace_core::{ActorProfile, DocumentNode, NodeKind, NodePatch};
use uuid::Uuid;

/// Store errors.
#[derive(Debug, Clone)]
pub enum StoreError {
    /// Malformed or nil identifier.
    InvalidId(String),
    /// Referenced node (or profile) absent.
    NotFound(String),
    /// Duplicate id or invalid/missing parent.
    Constraint(String),
    /// Backend read/write failure.
    Persistence(String),
    /// Encode/decode failure.
    Serialization(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::InvalidId(id) => write!(f, "Invalid id: {id}"),
            StoreError::NotFound(what) => write!(f, "Not found: {what}"),
            StoreError::Constraint(why) => write!(f, "Constraint violation: {why}"),
            StoreError::Persistence(e) => write!(f, "Persistence error: {e}"),
            StoreError::Serialization(e) => write!(f, "Serialization error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// The document store contract.
///
/// Implementations are synchronous; callers on async paths invoke them
/// directly (writes are small) exactly as the relay does.
pub trait NodeStore: Send + Sync {
    /// Fetch a node by kind and id. A kind mismatch is `NotFound` — the
    /// caller asked for something that does not exist at that kind.
    fn get_node(&self, kind: NodeKind, id: Uuid) -> Result<DocumentNode, StoreError>;

    /// Persist a new node. `Constraint` on duplicate id or a parent that is
    /// absent or of the wrong kind.
    fn create_node(&self, node: &DocumentNode) -> Result<(), StoreError>;

    /// Merge-update fields on an existing node; returns the updated node.
    fn update_node(&self, patch: &NodePatch, id: Uuid) -> Result<DocumentNode, StoreError>;

    /// Hard delete; cascades to all descendants.
    fn delete_node(&self, id: Uuid) -> Result<(), StoreError>;

    /// Children of a node, ascending by creation time (id as tiebreak).
    fn list_children(&self, parent_id: Uuid) -> Result<Vec<DocumentNode>, StoreError>;

    /// Resolve a collaborator's display identity.
    fn actor_profile(&self, actor_id: &str) -> Result<ActorProfile, StoreError>;

    /// Store or replace a collaborator profile.
    fn put_actor_profile(&self, profile: &ActorProfile) -> Result<(), StoreError>;
}

/// Shared id guard: nil uuids never reach a backend.
pub(crate) fn check_id(id: Uuid) -> Result<(), StoreError> {
    if id.is_nil() {
        return Err(StoreError::InvalidId(id.to_string()));
    }
    Ok(())
}
