//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.
//! Each frontier transition is a single `UPDATE ... WHERE status = ?`
//! statement, so a transition from the wrong source state changes no rows.

use crate::state::{FrontierStatus, SessionStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    timestamp_now, FrontierEntry, JournalEvent, JournalKind, NewJournalEvent, PageInsert,
    PageRecord, SessionRecord,
};
use crate::CrawlError;
use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const FRONTIER_COLUMNS: &str = "url, status, discovered_at, claimed_at, discovered_session, \
     claim_count, requeue_count, last_error";

const PAGE_COLUMNS: &str = "url, session_id, fetched_at, final_url, status_code, titles, \
     emphasis, links, raw_content_ref";

const JOURNAL_COLUMNS: &str = "id, session_id, url, kind, timestamp, detail";

/// SQLite storage backend
///
/// The connection sits behind a mutex owned by the store, which serializes
/// statements issued by concurrent workers of this process.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(CrawlError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, CrawlError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        conn.busy_timeout(Duration::from_secs(5))?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, CrawlError> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Database("connection lock poisoned".to_string()))
    }

    /// Moves one entry between statuses if it is currently in `from`
    fn transition(
        &self,
        url: &str,
        from: FrontierStatus,
        to: FrontierStatus,
    ) -> StorageResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE frontier SET status = ?1, claimed_at = CASE WHEN ?1 = ?4 THEN NULL ELSE claimed_at END
             WHERE url = ?2 AND status = ?3",
            params![
                to.to_db_string(),
                url,
                from.to_db_string(),
                FrontierStatus::Pending.to_db_string()
            ],
        )?;
        Ok(changed == 1)
    }
}

fn frontier_from_row(row: &Row<'_>) -> rusqlite::Result<FrontierEntry> {
    Ok(FrontierEntry {
        url: row.get(0)?,
        status: FrontierStatus::from_db_string(&row.get::<_, String>(1)?)
            .unwrap_or(FrontierStatus::Failed),
        discovered_at: row.get(2)?,
        claimed_at: row.get(3)?,
        discovered_session: row.get(4)?,
        claim_count: row.get(5)?,
        requeue_count: row.get(6)?,
        last_error: row.get(7)?,
    })
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: SessionStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(SessionStatus::Failed),
    })
}

fn journal_from_row(row: &Row<'_>) -> rusqlite::Result<JournalEvent> {
    Ok(JournalEvent {
        id: row.get(0)?,
        session_id: row.get(1)?,
        url: row.get(2)?,
        kind: JournalKind::from_db_string(&row.get::<_, String>(3)?)
            .unwrap_or(JournalKind::FetchFailed),
        timestamp: row.get(4)?,
        detail: row.get(5)?,
    })
}

/// Page row with its list columns still JSON-encoded
struct PageRow {
    url: String,
    session_id: i64,
    fetched_at: String,
    final_url: String,
    status_code: u16,
    titles: String,
    emphasis: String,
    links: String,
    raw_content_ref: Option<String>,
}

impl PageRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            url: row.get(0)?,
            session_id: row.get(1)?,
            fetched_at: row.get(2)?,
            final_url: row.get(3)?,
            status_code: row.get(4)?,
            titles: row.get(5)?,
            emphasis: row.get(6)?,
            links: row.get(7)?,
            raw_content_ref: row.get(8)?,
        })
    }

    fn into_record(self) -> StorageResult<PageRecord> {
        Ok(PageRecord {
            url: self.url,
            session_id: self.session_id,
            fetched_at: self.fetched_at,
            final_url: self.final_url,
            status_code: self.status_code,
            titles: from_json(&self.titles)?,
            emphasis: from_json(&self.emphasis)?,
            links: from_json(&self.links)?,
            raw_content_ref: self.raw_content_ref,
        })
    }
}

fn to_json(values: &[String]) -> StorageResult<String> {
    serde_json::to_string(values).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn from_json(text: &str) -> StorageResult<Vec<String>> {
    serde_json::from_str(text).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn count(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> StorageResult<u64> {
    let count: i64 = conn.query_row(sql, params, |row| row.get(0))?;
    Ok(count as u64)
}

impl Storage for SqliteStorage {
    // ===== Session Management =====

    fn create_session(&self, config_hash: &str) -> StorageResult<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sessions (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![
                timestamp_now(),
                config_hash,
                SessionStatus::Running.to_db_string()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn get_session(&self, session_id: i64) -> StorageResult<SessionRecord> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, started_at, finished_at, config_hash, status FROM sessions WHERE id = ?1",
            params![session_id],
            session_from_row,
        )
        .optional()?
        .ok_or(StorageError::SessionNotFound(session_id))
    }

    fn get_latest_session(&self) -> StorageResult<Option<SessionRecord>> {
        let conn = self.conn()?;
        let session = conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM sessions
                 ORDER BY id DESC LIMIT 1",
                [],
                session_from_row,
            )
            .optional()?;
        Ok(session)
    }

    fn finish_session(&self, session_id: i64, status: SessionStatus) -> StorageResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE sessions SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), timestamp_now(), session_id],
        )?;
        if changed == 0 {
            return Err(StorageError::SessionNotFound(session_id));
        }
        Ok(())
    }

    fn resume_session(&self, session_id: i64) -> StorageResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE sessions SET status = ?1, finished_at = NULL WHERE id = ?2",
            params![SessionStatus::Running.to_db_string(), session_id],
        )?;
        if changed == 0 {
            return Err(StorageError::SessionNotFound(session_id));
        }
        Ok(())
    }

    fn clear_crawl_state(&self) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "
            DELETE FROM frontier;
            DELETE FROM pages;
            DELETE FROM journal;
        ",
        )?;
        Ok(())
    }

    // ===== Frontier =====

    fn insert_if_absent(&self, url: &str, session_id: i64) -> StorageResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "INSERT OR IGNORE INTO frontier (url, status, discovered_at, discovered_session)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                url,
                FrontierStatus::Pending.to_db_string(),
                timestamp_now(),
                session_id
            ],
        )?;
        Ok(changed == 1)
    }

    fn claim_next(&self) -> StorageResult<Option<String>> {
        let conn = self.conn()?;
        let url = conn
            .query_row(
                "UPDATE frontier
                 SET status = ?1, claimed_at = ?2, claim_count = claim_count + 1
                 WHERE id = (SELECT id FROM frontier WHERE status = ?3 ORDER BY id ASC LIMIT 1)
                 RETURNING url",
                params![
                    FrontierStatus::InProgress.to_db_string(),
                    timestamp_now(),
                    FrontierStatus::Pending.to_db_string()
                ],
                |row| row.get(0),
            )
            .optional()?;
        Ok(url)
    }

    fn mark_done(&self, url: &str) -> StorageResult<bool> {
        self.transition(url, FrontierStatus::InProgress, FrontierStatus::Done)
    }

    fn mark_failed(&self, url: &str, error: &str) -> StorageResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE frontier SET status = ?1, last_error = ?2 WHERE url = ?3 AND status = ?4",
            params![
                FrontierStatus::Failed.to_db_string(),
                error,
                url,
                FrontierStatus::InProgress.to_db_string()
            ],
        )?;
        Ok(changed == 1)
    }

    fn release_claim(&self, url: &str) -> StorageResult<bool> {
        self.transition(url, FrontierStatus::InProgress, FrontierStatus::Pending)
    }

    fn reclaim_stale(&self, threshold: Duration) -> StorageResult<Vec<String>> {
        let threshold = chrono::Duration::from_std(threshold)
            .map_err(|e| StorageError::InvalidArgument(format!("stale threshold: {}", e)))?;
        let cutoff = (Utc::now() - threshold).to_rfc3339_opts(SecondsFormat::Millis, true);

        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "UPDATE frontier SET status = ?1, claimed_at = NULL
             WHERE status = ?2 AND claimed_at <= ?3
             RETURNING url",
        )?;
        let urls = stmt
            .query_map(
                params![
                    FrontierStatus::Pending.to_db_string(),
                    FrontierStatus::InProgress.to_db_string(),
                    cutoff
                ],
                |row| row.get(0),
            )?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(urls)
    }

    fn requeue_failed(&self, max_requeues: u32) -> StorageResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "UPDATE frontier SET status = ?1, claimed_at = NULL, requeue_count = requeue_count + 1
             WHERE status = ?2 AND requeue_count < ?3
             RETURNING url",
        )?;
        let urls = stmt
            .query_map(
                params![
                    FrontierStatus::Pending.to_db_string(),
                    FrontierStatus::Failed.to_db_string(),
                    max_requeues
                ],
                |row| row.get(0),
            )?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(urls)
    }

    fn get_frontier_entry(&self, url: &str) -> StorageResult<Option<FrontierEntry>> {
        let conn = self.conn()?;
        let entry = conn
            .query_row(
                &format!("SELECT {} FROM frontier WHERE url = ?1", FRONTIER_COLUMNS),
                params![url],
                frontier_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    fn count_frontier(&self, status: FrontierStatus) -> StorageResult<u64> {
        let conn = self.conn()?;
        count(
            &conn,
            "SELECT COUNT(*) FROM frontier WHERE status = ?1",
            params![status.to_db_string()],
        )
    }

    fn count_frontier_total(&self) -> StorageResult<u64> {
        let conn = self.conn()?;
        count(&conn, "SELECT COUNT(*) FROM frontier", [])
    }

    fn has_open_work(&self) -> StorageResult<bool> {
        let conn = self.conn()?;
        let open = count(
            &conn,
            "SELECT EXISTS(SELECT 1 FROM frontier WHERE status IN (?1, ?2))",
            params![
                FrontierStatus::Pending.to_db_string(),
                FrontierStatus::InProgress.to_db_string()
            ],
        )?;
        Ok(open != 0)
    }

    // ===== Page Metadata =====

    fn insert_page(&self, record: &PageRecord) -> StorageResult<bool> {
        let titles = to_json(&record.titles)?;
        let emphasis = to_json(&record.emphasis)?;
        let links = to_json(&record.links)?;

        let conn = self.conn()?;
        let changed = conn.execute(
            &format!(
                "INSERT OR IGNORE INTO pages ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                PAGE_COLUMNS
            ),
            params![
                record.url,
                record.session_id,
                record.fetched_at,
                record.final_url,
                record.status_code,
                titles,
                emphasis,
                links,
                record.raw_content_ref
            ],
        )?;
        Ok(changed == 1)
    }

    fn insert_page_within_budget(
        &self,
        record: &PageRecord,
        budget: u64,
    ) -> StorageResult<PageInsert> {
        let titles = to_json(&record.titles)?;
        let emphasis = to_json(&record.emphasis)?;
        let links = to_json(&record.links)?;
        let budget = i64::try_from(budget).unwrap_or(i64::MAX);

        let conn = self.conn()?;
        let changed = conn.execute(
            &format!(
                "INSERT OR IGNORE INTO pages ({})
                 SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9
                 WHERE (SELECT COUNT(*) FROM pages WHERE session_id = ?2) < ?10",
                PAGE_COLUMNS
            ),
            params![
                record.url,
                record.session_id,
                record.fetched_at,
                record.final_url,
                record.status_code,
                titles,
                emphasis,
                links,
                record.raw_content_ref,
                budget
            ],
        )?;

        if changed == 1 {
            return Ok(PageInsert::Inserted);
        }

        let exists = count(
            &conn,
            "SELECT EXISTS(SELECT 1 FROM pages WHERE url = ?1)",
            params![record.url],
        )?;
        if exists != 0 {
            Ok(PageInsert::Duplicate)
        } else {
            Ok(PageInsert::OverBudget)
        }
    }

    fn get_page(&self, url: &str) -> StorageResult<Option<PageRecord>> {
        let row = {
            let conn = self.conn()?;
            conn.query_row(
                &format!("SELECT {} FROM pages WHERE url = ?1", PAGE_COLUMNS),
                params![url],
                PageRow::from_row,
            )
            .optional()?
        };

        row.map(PageRow::into_record).transpose()
    }

    fn count_pages(&self) -> StorageResult<u64> {
        let conn = self.conn()?;
        count(&conn, "SELECT COUNT(*) FROM pages", [])
    }

    fn count_session_pages(&self, session_id: i64) -> StorageResult<u64> {
        let conn = self.conn()?;
        count(
            &conn,
            "SELECT COUNT(*) FROM pages WHERE session_id = ?1",
            params![session_id],
        )
    }

    // ===== Journal =====

    fn append_event(&self, event: &NewJournalEvent) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO journal (session_id, url, kind, timestamp, detail)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.session_id,
                event.url,
                event.kind.to_db_string(),
                timestamp_now(),
                event.detail
            ],
        )?;
        Ok(())
    }

    fn events_for_url(&self, url: &str) -> StorageResult<Vec<JournalEvent>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM journal WHERE url = ?1 ORDER BY id ASC",
            JOURNAL_COLUMNS
        ))?;
        let events = stmt
            .query_map(params![url], journal_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(events)
    }

    fn count_events(&self, kind: JournalKind) -> StorageResult<u64> {
        let conn = self.conn()?;
        count(
            &conn,
            "SELECT COUNT(*) FROM journal WHERE kind = ?1",
            params![kind.to_db_string()],
        )
    }
}
