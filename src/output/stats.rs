//! Statistics generation from crawl database
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics from the storage layer.

use crate::state::FrontierStatus;
use crate::storage::{JournalKind, SessionRecord, Storage};
use crate::CrawlError;

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// Total number of URLs in the frontier
    pub frontier_total: u64,

    /// Count of frontier entries by status, in lifecycle order
    pub frontier_by_status: Vec<(FrontierStatus, u64)>,

    /// Number of stored page records
    pub total_pages: u64,

    /// Count of journal events by kind
    pub events_by_kind: Vec<(JournalKind, u64)>,

    /// Most recent session, if any
    pub latest_session: Option<SessionRecord>,
}

impl CrawlStatistics {
    /// Returns the number of frontier entries with the given status
    pub fn frontier_count(&self, status: FrontierStatus) -> u64 {
        self.frontier_by_status
            .iter()
            .find(|(s, _)| *s == status)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(CrawlError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<CrawlStatistics, CrawlError> {
    let frontier_total = storage.count_frontier_total()?;

    let mut frontier_by_status = Vec::new();
    for status in FrontierStatus::all() {
        frontier_by_status.push((status, storage.count_frontier(status)?));
    }

    let total_pages = storage.count_pages()?;

    let mut events_by_kind = Vec::new();
    for kind in JournalKind::all() {
        let count = storage.count_events(kind)?;
        if count > 0 {
            events_by_kind.push((kind, count));
        }
    }

    let latest_session = storage.get_latest_session()?;

    Ok(CrawlStatistics {
        frontier_total,
        frontier_by_status,
        total_pages,
        events_by_kind,
        latest_session,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    if let Some(session) = &stats.latest_session {
        println!("Latest Session:");
        println!("  ID: {}", session.id);
        println!("  Status: {}", session.status.to_db_string());
        println!("  Started: {}", session.started_at);
        if let Some(finished) = &session.finished_at {
            println!("  Finished: {}", finished);
        }
        println!();
    }

    println!("Frontier ({} URLs):", stats.frontier_total);
    for (status, count) in &stats.frontier_by_status {
        let percentage = if stats.frontier_total > 0 {
            (*count as f64 / stats.frontier_total as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", status, count, percentage);
    }
    println!();

    println!("Page records: {}", stats.total_pages);
    println!();

    if !stats.events_by_kind.is_empty() {
        println!("Journal Events:");
        for (kind, count) in &stats.events_by_kind {
            println!("  {}: {}", kind, count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{NewJournalEvent, SqliteStorage};

    #[test]
    fn test_load_statistics_empty() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let stats = load_statistics(&storage).unwrap();

        assert_eq!(stats.frontier_total, 0);
        assert_eq!(stats.frontier_by_status.len(), 4);
        assert_eq!(stats.total_pages, 0);
        assert!(stats.events_by_kind.is_empty());
        assert!(stats.latest_session.is_none());
    }

    #[test]
    fn test_load_statistics_counts() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let session = storage.create_session("hash").unwrap();
        storage.insert_if_absent("https://example.test/a", session).unwrap();
        storage.insert_if_absent("https://example.test/b", session).unwrap();
        storage.claim_next().unwrap();
        storage
            .append_event(&NewJournalEvent {
                session_id: Some(session),
                url: Some("https://example.test/a".to_string()),
                kind: JournalKind::Discovered,
                detail: None,
            })
            .unwrap();

        let stats = load_statistics(&storage).unwrap();
        assert_eq!(stats.frontier_total, 2);
        assert_eq!(stats.frontier_count(FrontierStatus::Pending), 1);
        assert_eq!(stats.frontier_count(FrontierStatus::InProgress), 1);
        assert_eq!(stats.frontier_count(FrontierStatus::Done), 0);
        assert_eq!(stats.events_by_kind, vec![(JournalKind::Discovered, 1)]);
        assert_eq!(stats.latest_session.map(|s| s.id), Some(session));
    }
}
