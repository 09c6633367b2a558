//! Session-scoped handle for appending journal events

use crate::storage::{JournalKind, NewJournalEvent, Storage};
use std::sync::Arc;

/// Appends events for one crawl session
///
/// Journal writes are best effort: a failed append is logged and the crawl
/// goes on, since the frontier and page tables hold the authoritative state.
#[derive(Clone)]
pub struct Journal {
    storage: Arc<dyn Storage>,
    session_id: i64,
}

impl Journal {
    pub fn new(storage: Arc<dyn Storage>, session_id: i64) -> Self {
        Self {
            storage,
            session_id,
        }
    }

    /// Appends one event; `url` is `None` for session-level events
    pub fn record(&self, kind: JournalKind, url: Option<&str>, detail: Option<String>) {
        let event = NewJournalEvent {
            session_id: Some(self.session_id),
            url: url.map(str::to_string),
            kind,
            detail,
        };

        if let Err(e) = self.storage.append_event(&event) {
            tracing::warn!("Failed to append {} event for {:?}: {}", kind, url, e);
        }
    }
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("session_id", &self.session_id)
            .finish()
    }
}
