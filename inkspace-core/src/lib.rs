//! # inkspace-core — data model for the Inkspace workspace editor
//!
//! Dependency-free leaves of the system:
//!
//! - [`delta`] — rich-text edit operations (insert/retain/delete) and the
//!   in-memory [`RichText`] document they apply to
//! - [`node`] — the workspace → folder → file hierarchy with explicit
//!   trash/favorite markers
//! - [`tree`] — the optimistic client state tree and its closed reducer
//!   action set
//!
//! Everything here is synchronous and pure; async wiring, the relay, and
//! storage live in `inkspace-collab` and `inkspace-editor`.

pub mod delta;
pub mod node;
pub mod tree;

pub use delta::{AttrValue, Attributes, Delta, DeltaError, DeltaOp, RichText, Span};
pub use node::{ActorProfile, DocumentNode, Marker, NodeKind, NodePatch, ValidationError};
pub use tree::{FolderEntry, StateStore, TreeAction, WorkspaceEntry, WorkspaceTree};
