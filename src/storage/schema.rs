//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the metacrawl database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl sessions
CREATE TABLE IF NOT EXISTS sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- Durable crawl frontier, one row per canonical URL
-- The id column fixes discovery order for breadth-first claiming
CREATE TABLE IF NOT EXISTS frontier (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    status TEXT NOT NULL,
    discovered_at TEXT NOT NULL,
    claimed_at TEXT,
    discovered_session INTEGER NOT NULL,
    claim_count INTEGER NOT NULL DEFAULT 0,
    requeue_count INTEGER NOT NULL DEFAULT 0,
    last_error TEXT
);

CREATE INDEX IF NOT EXISTS idx_frontier_status ON frontier(status, id);

-- Page metadata, at most one record per URL
CREATE TABLE IF NOT EXISTS pages (
    url TEXT PRIMARY KEY,
    session_id INTEGER NOT NULL,
    fetched_at TEXT NOT NULL,
    final_url TEXT NOT NULL,
    status_code INTEGER NOT NULL,
    titles TEXT NOT NULL,
    emphasis TEXT NOT NULL,
    links TEXT NOT NULL,
    raw_content_ref TEXT
);

CREATE INDEX IF NOT EXISTS idx_pages_session ON pages(session_id);

-- Append-only crawl journal
CREATE TABLE IF NOT EXISTS journal (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id INTEGER,
    url TEXT,
    kind TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    detail TEXT
);

CREATE INDEX IF NOT EXISTS idx_journal_url ON journal(url);
CREATE INDEX IF NOT EXISTS idx_journal_kind ON journal(kind);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
