//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full crawl cycle end-to-end against a database on disk.

use metacrawl::config::Config;
use metacrawl::crawler::Coordinator;
use metacrawl::state::{CompletionReason, FrontierStatus, SessionStatus};
use metacrawl::storage::{JournalKind, SqliteStorage, Storage};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Opens a fresh database in a temporary directory
fn test_storage() -> (TempDir, Arc<dyn Storage>) {
    let dir = tempfile::tempdir().unwrap();
    let storage = SqliteStorage::new(&dir.path().join("crawl.db")).unwrap();
    (dir, Arc::new(storage))
}

/// Creates a test configuration scoped to the mock server's host
fn create_test_config(server: &MockServer, seed_path: &str, budget: u64, workers: u32) -> Config {
    let mut config = Config::default();
    config.crawler.document_budget = budget;
    config.crawler.workers = workers;
    config.crawler.max_attempts = 2;
    config.crawler.retry_backoff_ms = 10;
    config.crawler.attempt_timeout_ms = 5_000;
    config.crawler.idle_backoff_ms = 10;
    config.crawler.max_failed_requeues = 0;
    config.scope.domain = Some("127.0.0.1".to_string());
    config.scope.seeds = vec![format!("{}{}", server.uri(), seed_path)];
    config
}

/// An HTML page with a title and the given anchors
fn html_page(title: &str, hrefs: &[String]) -> ResponseTemplate {
    let anchors: String = hrefs
        .iter()
        .map(|href| format!(r#"<a href="{}">link</a>"#, href))
        .collect();
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html")
        .set_body_string(format!(
            "<html><head><title>{}</title></head><body><h1>{}</h1><p><strong>key</strong> text</p>{}</body></html>",
            title, title, anchors
        ))
}

fn status_of(storage: &Arc<dyn Storage>, url: &str) -> Option<FrontierStatus> {
    storage
        .get_frontier_entry(url)
        .unwrap()
        .map(|entry| entry.status)
}

#[tokio::test]
async fn test_single_step_discovers_in_scope_links() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(html_page(
            "Page A",
            &[
                format!("{}/b#section", base),
                "https://other.test/x".to_string(),
                "/a".to_string(),
            ],
        ))
        .expect(1)
        .mount(&server)
        .await;

    let (_dir, storage) = test_storage();
    let config = create_test_config(&server, "/a", 1, 1);
    let coordinator =
        Coordinator::with_storage(&config, Arc::clone(&storage), false, "hash").unwrap();
    let summary = coordinator.run().await.unwrap();

    let a = format!("{}/a", base);
    let b = format!("{}/b", base);

    assert_eq!(summary.reason, CompletionReason::BudgetReached);
    assert_eq!(summary.documents_collected, 1);
    assert_eq!(summary.pending, 1);

    assert_eq!(status_of(&storage, &a), Some(FrontierStatus::Done));
    assert_eq!(status_of(&storage, &b), Some(FrontierStatus::Pending));
    assert_eq!(status_of(&storage, "https://other.test/x"), None);
    assert_eq!(storage.count_frontier_total().unwrap(), 2);

    let record = storage.get_page(&a).unwrap().unwrap();
    assert_eq!(record.titles, vec!["Page A", "Page A"]);
    assert_eq!(record.emphasis, vec!["key"]);
    assert_eq!(record.status_code, 200);
    assert_eq!(record.links, vec![a.clone(), b.clone()]);
    assert!(record.raw_content_ref.is_none());
    assert_eq!(storage.count_pages().unwrap(), 1);

    // Seed plus `b`; the self-link was already known
    assert_eq!(storage.count_events(JournalKind::Discovered).unwrap(), 2);
    let b_events = storage.events_for_url(&b).unwrap();
    assert_eq!(b_events.len(), 1);
    assert_eq!(b_events[0].kind, JournalKind::Discovered);
}

#[tokio::test]
async fn test_budget_halts_dense_site() {
    let server = MockServer::start().await;
    let base = server.uri();

    let hrefs: Vec<String> = (0..10).map(|i| format!("{}/p{}", base, i)).collect();
    Mock::given(method("GET"))
        .and(path_regex(r"^/p\d+$"))
        .respond_with(html_page("Dense", &hrefs))
        .mount(&server)
        .await;

    let (_dir, storage) = test_storage();
    let config = create_test_config(&server, "/p0", 3, 2);
    let coordinator =
        Coordinator::with_storage(&config, Arc::clone(&storage), false, "hash").unwrap();
    let session_id = coordinator.session().session_id;
    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.reason, CompletionReason::BudgetReached);
    assert_eq!(summary.documents_collected, 3);
    assert_eq!(storage.count_pages().unwrap(), 3);
    assert!(summary.pending > 0);
    assert_eq!(storage.count_frontier(FrontierStatus::InProgress).unwrap(), 0);
    assert_eq!(storage.count_frontier(FrontierStatus::Done).unwrap(), 3);
    assert_eq!(
        storage.get_session(session_id).unwrap().status,
        SessionStatus::Completed
    );
}

#[tokio::test]
async fn test_server_error_ends_failed() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(html_page("Start", &["/broken".to_string()]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let (_dir, storage) = test_storage();
    let config = create_test_config(&server, "/a", 10, 1);
    let coordinator =
        Coordinator::with_storage(&config, Arc::clone(&storage), false, "hash").unwrap();
    let summary = coordinator.run().await.unwrap();

    let broken = format!("{}/broken", base);
    assert_eq!(summary.reason, CompletionReason::FrontierExhausted);
    assert_eq!(summary.documents_collected, 1);
    assert_eq!(summary.failed, 1);

    let entry = storage.get_frontier_entry(&broken).unwrap().unwrap();
    assert_eq!(entry.status, FrontierStatus::Failed);
    assert!(entry.last_error.unwrap().contains("HTTP 500"));
    assert!(storage.get_page(&broken).unwrap().is_none());

    let kinds: Vec<JournalKind> = storage
        .events_for_url(&broken)
        .unwrap()
        .into_iter()
        .map(|event| event.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            JournalKind::Discovered,
            JournalKind::FetchAttempt,
            JournalKind::FetchFailed,
            JournalKind::FetchAttempt,
            JournalKind::FetchFailed,
            JournalKind::FetchFailed,
        ]
    );

    // Terminal entries are never reclaimed
    assert!(storage
        .reclaim_stale(Duration::ZERO)
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_resume_reclaims_abandoned_claim() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(html_page("Recovered", &[]))
        .expect(1)
        .mount(&server)
        .await;

    let (_dir, storage) = test_storage();
    let a = format!("{}/a", base);

    // A previous process claimed the seed and died
    let crashed = storage.create_session("hash").unwrap();
    storage.insert_if_absent(&a, crashed).unwrap();
    assert_eq!(storage.claim_next().unwrap().as_deref(), Some(a.as_str()));

    let config = create_test_config(&server, "/a", 5, 2);
    let coordinator =
        Coordinator::with_storage(&config, Arc::clone(&storage), false, "hash").unwrap();
    assert_eq!(coordinator.session().session_id, crashed);
    let summary = coordinator.run().await.unwrap();

    assert!(summary.resumed);
    assert_eq!(summary.reason, CompletionReason::FrontierExhausted);
    assert_eq!(summary.documents_collected, 1);

    let entry = storage.get_frontier_entry(&a).unwrap().unwrap();
    assert_eq!(entry.status, FrontierStatus::Done);
    assert_eq!(entry.claim_count, 2);
    assert_eq!(
        storage.get_session(crashed).unwrap().status,
        SessionStatus::Completed
    );
}

#[tokio::test]
async fn test_completed_crawl_is_not_repeated() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(html_page("Once", &["/a".to_string()]))
        .expect(1)
        .mount(&server)
        .await;

    let (_dir, storage) = test_storage();
    let config = create_test_config(&server, "/a", 5, 1);

    let first = Coordinator::with_storage(&config, Arc::clone(&storage), false, "hash")
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(first.reason, CompletionReason::FrontierExhausted);
    assert_eq!(first.documents_collected, 1);

    // The previous session completed, so a new one starts on the same frontier
    let second = Coordinator::with_storage(&config, Arc::clone(&storage), false, "hash")
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_ne!(second.session_id, first.session_id);
    assert!(!second.resumed);
    assert_eq!(second.reason, CompletionReason::FrontierExhausted);
    assert_eq!(second.documents_collected, 0);
    assert_eq!(storage.count_pages().unwrap(), 1);
}

#[tokio::test]
async fn test_fresh_crawl_starts_over() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(html_page("Twice", &[]))
        .expect(2)
        .mount(&server)
        .await;

    let (_dir, storage) = test_storage();
    let config = create_test_config(&server, "/a", 5, 1);

    Coordinator::with_storage(&config, Arc::clone(&storage), false, "hash")
        .unwrap()
        .run()
        .await
        .unwrap();
    let summary = Coordinator::with_storage(&config, Arc::clone(&storage), true, "hash")
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(summary.documents_collected, 1);
    assert_eq!(storage.count_pages().unwrap(), 1);
}

#[tokio::test]
async fn test_raw_content_is_written() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<title>Raw</title>"))
        .mount(&server)
        .await;

    let (dir, storage) = test_storage();
    let mut config = create_test_config(&server, "/a", 5, 1);
    let raw_dir = dir.path().join("pages");
    config.output.raw_content_dir = Some(raw_dir.to_string_lossy().into_owned());

    Coordinator::with_storage(&config, Arc::clone(&storage), false, "hash")
        .unwrap()
        .run()
        .await
        .unwrap();

    let record = storage
        .get_page(&format!("{}/a", server.uri()))
        .unwrap()
        .unwrap();
    let raw_path = record.raw_content_ref.unwrap();
    assert!(raw_path.starts_with(&*raw_dir.to_string_lossy()));
    assert_eq!(std::fs::read_to_string(raw_path).unwrap(), "<title>Raw</title>");
}

#[tokio::test]
async fn test_seed_outside_scope_is_still_crawled() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(html_page(
            "Outside",
            &["/b".to_string(), format!("{}/c", base)],
        ))
        .expect(1)
        .mount(&server)
        .await;

    let (_dir, storage) = test_storage();
    let mut config = create_test_config(&server, "/a", 5, 1);
    config.scope.domain = Some("example.test".to_string());

    let summary = Coordinator::with_storage(&config, Arc::clone(&storage), false, "hash")
        .unwrap()
        .run()
        .await
        .unwrap();

    let a = format!("{}/a", base);
    assert_eq!(summary.reason, CompletionReason::FrontierExhausted);
    assert_eq!(summary.documents_collected, 1);

    let record = storage.get_page(&a).unwrap().unwrap();
    assert_eq!(record.titles, vec!["Outside", "Outside"]);
    assert!(record.links.is_empty());

    // Links on the seed's own host are not in the configured scope
    assert_eq!(status_of(&storage, &format!("{}/b", base)), None);
    assert_eq!(status_of(&storage, &format!("{}/c", base)), None);
    assert_eq!(storage.count_frontier_total().unwrap(), 1);
}

#[tokio::test]
async fn test_stop_during_fetch_interrupts_and_resumes() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(
            html_page("Slow", &["/b".to_string()]).set_delay(Duration::from_millis(1_000)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(html_page("Later", &[]))
        .expect(1)
        .mount(&server)
        .await;

    let (_dir, storage) = test_storage();
    let config = create_test_config(&server, "/a", 10, 1);
    let coordinator =
        Coordinator::with_storage(&config, Arc::clone(&storage), false, "hash").unwrap();
    let session_id = coordinator.session().session_id;

    let stop = coordinator.stop_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        stop.stop();
    });
    let summary = coordinator.run().await.unwrap();

    let a = format!("{}/a", base);
    let b = format!("{}/b", base);

    // The page in flight is finished, nothing new is claimed
    assert_eq!(summary.reason, CompletionReason::Stopped);
    assert_eq!(summary.documents_collected, 1);
    assert_eq!(status_of(&storage, &a), Some(FrontierStatus::Done));
    assert_eq!(status_of(&storage, &b), Some(FrontierStatus::Pending));
    assert_eq!(storage.count_frontier(FrontierStatus::InProgress).unwrap(), 0);
    assert_eq!(
        storage.get_session(session_id).unwrap().status,
        SessionStatus::Interrupted
    );

    let resumed = Coordinator::with_storage(&config, Arc::clone(&storage), false, "hash")
        .unwrap()
        .run()
        .await
        .unwrap();
    assert!(resumed.resumed);
    assert_eq!(resumed.session_id, session_id);
    assert_eq!(resumed.reason, CompletionReason::FrontierExhausted);
    assert_eq!(resumed.documents_collected, 2);
    assert_eq!(status_of(&storage, &b), Some(FrontierStatus::Done));
}

#[tokio::test]
async fn test_over_budget_page_leaves_no_raw_file() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path_regex(r"^/(a|b)$"))
        .respond_with(html_page("Race", &[]).set_delay(Duration::from_millis(300)))
        .expect(2)
        .mount(&server)
        .await;

    let (dir, storage) = test_storage();
    let mut config = create_test_config(&server, "/a", 1, 2);
    config.scope.seeds.push(format!("{}/b", base));
    let raw_dir = dir.path().join("pages");
    config.output.raw_content_dir = Some(raw_dir.to_string_lossy().into_owned());

    // Both workers claim a seed before either page is stored
    let summary = Coordinator::with_storage(&config, Arc::clone(&storage), false, "hash")
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(summary.reason, CompletionReason::BudgetReached);
    assert_eq!(storage.count_pages().unwrap(), 1);
    assert_eq!(summary.pending, 1);

    let files: Vec<_> = std::fs::read_dir(&raw_dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(files.len(), 1);

    let stored = [format!("{}/a", base), format!("{}/b", base)]
        .into_iter()
        .find_map(|url| storage.get_page(&url).unwrap())
        .unwrap();
    assert_eq!(
        stored.raw_content_ref.as_deref(),
        Some(&*files[0].to_string_lossy())
    );
}
