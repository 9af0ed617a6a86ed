//! # inkspace-collab — realtime collaboration layer for Inkspace
//!
//! WebSocket-based multi-user editing for workspace documents.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     WebSocket      ┌──────────────┐
//! │ RelaySession │ ◄─────────────────► │ RelayServer  │
//! │ (per client) │    binary frames    │ (hub)        │
//! └──────┬───────┘                     └──────┬───────┘
//!        │                                    │
//!        ▼                                    ▼
//! ┌──────────────┐                     ┌──────────────┐
//! │ RoomPresence │                     │ Room / fan-out│
//! │ (roster +    │                     │ (per doc id) │
//! │  overlays)   │                     └──────┬───────┘
//! └──────────────┘                            │
//!                                      ┌──────┴───────┐
//!                                      │  NodeStore   │
//!                                      │ (profiles +  │
//!                                      │  documents)  │
//!                                      └──────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — binary wire envelope (bincode) carrying JSON operation
//!   lists, cursor updates, and presence records
//! - [`rooms`] — per-document fan-out groups with implicit lifecycle
//! - [`relay`] — the WebSocket relay server
//! - [`presence`] — client-side roster mirror and cursor overlays
//! - [`client`] — the per-client relay session
//! - [`storage`] — document store contract with in-memory and RocksDB
//!   backends
//!
//! Delivery is at-most-once and best-effort by design; consistency of
//! concurrent edits is the clients' last-applier-wins policy.

pub mod client;
pub mod presence;
pub mod protocol;
pub mod relay;
pub mod rooms;
pub mod storage;

pub use client::{ConnectionState, RelayEvent, RelaySession};
pub use presence::{CursorOverlay, RoomPresence, SyncDiff};
pub use protocol::{
    CursorRange, CursorUpdate, JoinRequest, MessageType, PresenceRecord, ProtocolError,
    RelayMessage,
};
pub use relay::{RelayConfig, RelayServer, RelayStats};
pub use rooms::{Room, RoomDirectory, RoomStats};
pub use storage::{MemoryStore, NodeStore, RocksNodeStore, StoreConfig, StoreError};
