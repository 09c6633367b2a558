//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - The durable frontier and its atomic status transitions
//! - Page metadata records
//! - The append-only crawl journal
//! - Session tracking and resumption support

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::state::{FrontierStatus, SessionStatus};
use crate::CrawlError;
use chrono::{SecondsFormat, Utc};
use std::fmt;
use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(CrawlError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, CrawlError> {
    SqliteStorage::new(path)
}

/// Opens a storage database that must already exist
///
/// Used by read-only commands, which should report a wrong path instead of
/// creating an empty database there.
pub fn open_existing_storage(path: &Path) -> Result<SqliteStorage, CrawlError> {
    if !path.is_file() {
        return Err(CrawlError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("database {} does not exist", path.display()),
        )));
    }
    SqliteStorage::new(path)
}

/// Current time in the fixed-width format used by every timestamp column
///
/// A fixed width keeps the text columns comparable with `<=` in SQL.
pub(crate) fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Represents one URL in the durable frontier
#[derive(Debug, Clone)]
pub struct FrontierEntry {
    pub url: String,
    pub status: FrontierStatus,
    pub discovered_at: String,
    pub claimed_at: Option<String>,
    pub discovered_session: i64,
    pub claim_count: u32,
    pub requeue_count: u32,
    pub last_error: Option<String>,
}

/// Metadata stored for one fetched page
#[derive(Debug, Clone, PartialEq)]
pub struct PageRecord {
    pub url: String,
    pub session_id: i64,
    pub fetched_at: String,
    pub final_url: String,
    pub status_code: u16,
    pub titles: Vec<String>,
    pub emphasis: Vec<String>,
    pub links: Vec<String>,
    pub raw_content_ref: Option<String>,
}

/// Outcome of a budget-gated page insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageInsert {
    /// The record was stored
    Inserted,
    /// A record for this URL already existed; nothing changed
    Duplicate,
    /// The session already holds `budget` records; nothing changed
    OverBudget,
}

/// Kinds of journal events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JournalKind {
    Discovered,
    FetchAttempt,
    FetchSucceeded,
    FetchFailed,
    SessionStart,
    SessionEnd,
}

impl JournalKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::FetchAttempt => "fetch_attempt",
            Self::FetchSucceeded => "fetch_succeeded",
            Self::FetchFailed => "fetch_failed",
            Self::SessionStart => "session_start",
            Self::SessionEnd => "session_end",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "discovered" => Some(Self::Discovered),
            "fetch_attempt" => Some(Self::FetchAttempt),
            "fetch_succeeded" => Some(Self::FetchSucceeded),
            "fetch_failed" => Some(Self::FetchFailed),
            "session_start" => Some(Self::SessionStart),
            "session_end" => Some(Self::SessionEnd),
            _ => None,
        }
    }

    pub fn all() -> [Self; 6] {
        [
            Self::Discovered,
            Self::FetchAttempt,
            Self::FetchSucceeded,
            Self::FetchFailed,
            Self::SessionStart,
            Self::SessionEnd,
        ]
    }
}

impl fmt::Display for JournalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// A journal event as read back from the database
#[derive(Debug, Clone)]
pub struct JournalEvent {
    pub id: i64,
    pub session_id: Option<i64>,
    pub url: Option<String>,
    pub kind: JournalKind,
    pub timestamp: String,
    pub detail: Option<String>,
}

/// A journal event about to be appended
///
/// The timestamp is assigned by the store.
#[derive(Debug, Clone)]
pub struct NewJournalEvent {
    pub session_id: Option<i64>,
    pub url: Option<String>,
    pub kind: JournalKind,
    pub detail: Option<String>,
}

/// Represents a crawl session
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: SessionStatus,
}
