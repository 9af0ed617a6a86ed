//! Debounced persistence: batch a burst of keystrokes into one store write.
//!
//! Every local edit re-arms the flush timer and replaces the captured
//! snapshot. When a quiet period (850 ms) elapses with no further edit,
//! exactly one persist call goes out carrying the latest snapshot. The
//! local content is already authoritative for the UI, so the write is
//! never awaited by the editing path.
//!
//! A failed persist is retried with bounded backoff; after the final
//! attempt the document is flagged unsaved until a later write succeeds.
//! Closing a document must call [`AutosaveScheduler::flush`] — otherwise
//! edits inside the final quiet window would be lost.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use inkspace_collab::{NodeStore, StoreError};
use inkspace_core::NodePatch;

/// Production quiet period between the last edit and the persist call.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(850);

const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(200);
const MAX_PERSIST_ATTEMPTS: u32 = 3;

/// Scheduler counters (snapshot).
#[derive(Debug, Clone, Default)]
pub struct AutosaveStats {
    /// Edits that armed (or re-armed) the timer
    pub scheduled: u64,
    /// Persist calls that succeeded
    pub persisted: u64,
    /// Persist calls that exhausted their retries
    pub failed: u64,
}

struct AtomicAutosaveStats {
    scheduled: AtomicU64,
    persisted: AtomicU64,
    failed: AtomicU64,
}

/// Armed-timer state. The generation counter is the cancellation token:
/// re-arming bumps it, and a fired timer persists only if its generation
/// is still current.
struct Pending {
    generation: u64,
    snapshot: Option<String>,
}

/// Debounced writer for one document's serialized content.
pub struct AutosaveScheduler {
    store: Arc<dyn NodeStore>,
    node_id: Uuid,
    quiet_period: Duration,
    retry_base_delay: Duration,
    pending: Arc<Mutex<Pending>>,
    unsaved: Arc<AtomicBool>,
    stats: Arc<AtomicAutosaveStats>,
}

impl AutosaveScheduler {
    pub fn new(store: Arc<dyn NodeStore>, node_id: Uuid) -> Self {
        Self::with_timing(store, node_id, DEFAULT_QUIET_PERIOD, DEFAULT_RETRY_BASE_DELAY)
    }

    /// Custom timings (tests shrink both).
    pub fn with_timing(
        store: Arc<dyn NodeStore>,
        node_id: Uuid,
        quiet_period: Duration,
        retry_base_delay: Duration,
    ) -> Self {
        Self {
            store,
            node_id,
            quiet_period,
            retry_base_delay,
            pending: Arc::new(Mutex::new(Pending {
                generation: 0,
                snapshot: None,
            })),
            unsaved: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(AtomicAutosaveStats {
                scheduled: AtomicU64::new(0),
                persisted: AtomicU64::new(0),
                failed: AtomicU64::new(0),
            }),
        }
    }

    /// Record an edit: capture the snapshot and re-arm the flush timer.
    ///
    /// Must run inside a tokio runtime (the timer is a spawned task).
    pub fn schedule(&self, content: String) {
        let generation = {
            let mut pending = self.pending.lock().expect("autosave state poisoned");
            pending.generation += 1;
            pending.snapshot = Some(content);
            pending.generation
        };
        self.stats.scheduled.fetch_add(1, Ordering::Relaxed);

        let store = self.store.clone();
        let node_id = self.node_id;
        let quiet_period = self.quiet_period;
        let retry_base_delay = self.retry_base_delay;
        let pending = self.pending.clone();
        let unsaved = self.unsaved.clone();
        let stats = self.stats.clone();

        tokio::spawn(async move {
            tokio::time::sleep(quiet_period).await;

            let snapshot = {
                let mut state = pending.lock().expect("autosave state poisoned");
                if state.generation != generation {
                    // A later edit re-armed the timer; this one is stale.
                    return;
                }
                state.snapshot.take()
            };

            if let Some(snapshot) = snapshot {
                persist_with_retry(
                    &*store,
                    node_id,
                    snapshot,
                    retry_base_delay,
                    &unsaved,
                    &stats,
                )
                .await;
            }
        });
    }

    /// Persist any pending snapshot immediately, cancelling the armed timer.
    ///
    /// Called on document close / navigation so the final quiet window is
    /// never dropped.
    pub async fn flush(&self) {
        let snapshot = {
            let mut state = self.pending.lock().expect("autosave state poisoned");
            state.generation += 1;
            state.snapshot.take()
        };

        if let Some(snapshot) = snapshot {
            persist_with_retry(
                &*self.store,
                self.node_id,
                snapshot,
                self.retry_base_delay,
                &self.unsaved,
                &self.stats,
            )
            .await;
        }
    }

    /// True while a snapshot is captured but not yet persisted.
    pub fn has_pending(&self) -> bool {
        self.pending
            .lock()
            .map(|p| p.snapshot.is_some())
            .unwrap_or(false)
    }

    /// Visible "unsaved changes" indicator: the last persist exhausted its
    /// retries. Cleared by the next success.
    pub fn unsaved(&self) -> bool {
        self.unsaved.load(Ordering::Relaxed)
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet_period
    }

    pub fn stats(&self) -> AutosaveStats {
        AutosaveStats {
            scheduled: self.stats.scheduled.load(Ordering::Relaxed),
            persisted: self.stats.persisted.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
        }
    }
}

/// One persist call with bounded backoff. Marks/clears the unsaved flag.
async fn persist_with_retry(
    store: &dyn NodeStore,
    node_id: Uuid,
    content: String,
    base_delay: Duration,
    unsaved: &AtomicBool,
    stats: &AtomicAutosaveStats,
) {
    let mut last_error: Option<StoreError> = None;

    for attempt in 1..=MAX_PERSIST_ATTEMPTS {
        match store.update_node(&NodePatch::content(content.clone()), node_id) {
            Ok(_) => {
                unsaved.store(false, Ordering::Relaxed);
                stats.persisted.fetch_add(1, Ordering::Relaxed);
                log::debug!("Persisted content for node {node_id} (attempt {attempt})");
                return;
            }
            Err(e) => {
                log::warn!(
                    "Persist attempt {attempt}/{MAX_PERSIST_ATTEMPTS} for node {node_id} failed: {e}"
                );
                last_error = Some(e);
                if attempt < MAX_PERSIST_ATTEMPTS {
                    tokio::time::sleep(base_delay * 2u32.pow(attempt - 1)).await;
                }
            }
        }
    }

    unsaved.store(true, Ordering::Relaxed);
    stats.failed.fetch_add(1, Ordering::Relaxed);
    if let Some(e) = last_error {
        log::error!("Autosave for node {node_id} gave up: {e}");
    }
}
