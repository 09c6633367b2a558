//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::state::{FrontierStatus, SessionStatus};
use crate::storage::{
    FrontierEntry, JournalEvent, JournalKind, NewJournalEvent, PageInsert, PageRecord,
    SessionRecord,
};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Session not found: {0}")]
    SessionNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Every method is atomic with respect to the URL it touches, so workers
/// share one store without any locking of their own. Transitions requested
/// from an unexpected source state are no-ops that return `false` (or an
/// empty list), never errors.
pub trait Storage: Send + Sync {
    // ===== Session Management =====

    /// Creates a new crawl session in the `running` state
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created session
    fn create_session(&self, config_hash: &str) -> StorageResult<i64>;

    /// Gets a session by ID
    fn get_session(&self, session_id: i64) -> StorageResult<SessionRecord>;

    /// Gets the most recent session
    fn get_latest_session(&self) -> StorageResult<Option<SessionRecord>>;

    /// Records the final status of a session with a finish timestamp
    fn finish_session(&self, session_id: i64, status: SessionStatus) -> StorageResult<()>;

    /// Puts a previous session back into the `running` state and clears its finish time
    fn resume_session(&self, session_id: i64) -> StorageResult<()>;

    /// Deletes frontier entries, page records and journal events
    ///
    /// Sessions are kept as history.
    fn clear_crawl_state(&self) -> StorageResult<()>;

    // ===== Frontier =====

    /// Creates a `Pending` entry for the URL
    ///
    /// Returns false if the URL was already known; the caller must not
    /// process it again.
    fn insert_if_absent(&self, url: &str, session_id: i64) -> StorageResult<bool>;

    /// Claims the oldest `Pending` entry and moves it to `InProgress`
    ///
    /// Entries are handed out in discovery order, which makes the crawl
    /// breadth-first. Returns None if nothing is pending.
    fn claim_next(&self) -> StorageResult<Option<String>>;

    /// Moves an `InProgress` entry to `Done`
    fn mark_done(&self, url: &str) -> StorageResult<bool>;

    /// Moves an `InProgress` entry to `Failed`, recording the error
    fn mark_failed(&self, url: &str, error: &str) -> StorageResult<bool>;

    /// Moves an `InProgress` entry back to `Pending` without side effects
    fn release_claim(&self, url: &str) -> StorageResult<bool>;

    /// Resets entries claimed longer than `threshold` ago back to `Pending`
    ///
    /// # Returns
    ///
    /// The URLs that were reclaimed
    fn reclaim_stale(&self, threshold: Duration) -> StorageResult<Vec<String>>;

    /// Puts `Failed` entries back to `Pending` if they were requeued fewer
    /// than `max_requeues` times
    fn requeue_failed(&self, max_requeues: u32) -> StorageResult<Vec<String>>;

    /// Gets a frontier entry by URL
    fn get_frontier_entry(&self, url: &str) -> StorageResult<Option<FrontierEntry>>;

    /// Counts frontier entries in a status
    fn count_frontier(&self, status: FrontierStatus) -> StorageResult<u64>;

    /// Counts all frontier entries
    fn count_frontier_total(&self) -> StorageResult<u64>;

    /// Returns true if any entry is `Pending` or `InProgress`
    fn has_open_work(&self) -> StorageResult<bool>;

    // ===== Page Metadata =====

    /// Inserts a page record, ignoring duplicates
    ///
    /// Returns false if a record for this URL already existed.
    fn insert_page(&self, record: &PageRecord) -> StorageResult<bool>;

    /// Inserts a page record only while the record's session holds fewer
    /// than `budget` records
    fn insert_page_within_budget(&self, record: &PageRecord, budget: u64)
        -> StorageResult<PageInsert>;

    /// Gets a page record by URL
    fn get_page(&self, url: &str) -> StorageResult<Option<PageRecord>>;

    /// Counts all page records
    fn count_pages(&self) -> StorageResult<u64>;

    /// Counts page records stored by one session
    fn count_session_pages(&self, session_id: i64) -> StorageResult<u64>;

    // ===== Journal =====

    /// Appends an event to the journal
    fn append_event(&self, event: &NewJournalEvent) -> StorageResult<()>;

    /// Gets all events for a URL, oldest first
    fn events_for_url(&self, url: &str) -> StorageResult<Vec<JournalEvent>>;

    /// Counts events of a kind
    fn count_events(&self, kind: JournalKind) -> StorageResult<u64>;
}
