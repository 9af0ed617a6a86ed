//! # inkspace-editor — client-side editing core
//!
//! Wires the pieces a client needs to edit one document:
//!
//! - [`session`] — the editor session: local-first delta application,
//!   broadcast to room peers, presence routing, flush-on-close
//! - [`autosave`] — the debounced persistence scheduler (one store write
//!   per 850 ms quiet window, bounded retry, unsaved indicator)
//!
//! The optimistic workspace tree lives in `inkspace-core`; a UI holds a
//! `StateStore` beside an `EditorSession` per open document.

pub mod autosave;
pub mod session;

pub use autosave::{AutosaveScheduler, AutosaveStats, DEFAULT_QUIET_PERIOD};
pub use session::{EditorSession, SessionError, SessionNotice};
