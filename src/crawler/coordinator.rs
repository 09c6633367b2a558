//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the crawl session state machine and the worker loop:
//! - Opening, resuming or starting a fresh session
//! - Recovering claims abandoned by a previous process
//! - Seeding the durable frontier
//! - Running a fixed pool of workers that claim, fetch, extract and persist
//! - Deciding why the session ended and recording it
//!
//! Workers never talk to each other. The store is the only shared state, and
//! every frontier transition is atomic there, so a URL is processed by at
//! most one worker at a time.

use crate::config::Config;
use crate::crawler::fetcher::{build_http_client, FetchError, Fetcher};
use crate::crawler::journal::Journal;
use crate::crawler::parser::extract;
use crate::crawler::session::CrawlSession;
use crate::output::CrawlSummary;
use crate::state::{CompletionReason, FrontierStatus, SessionState, SessionStatus};
use crate::storage::{
    open_storage, timestamp_now, JournalKind, PageInsert, PageRecord, Storage, StorageResult,
};
use crate::url::normalize_links;
use crate::CrawlError;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use url::Url;

/// Store operations a worker retries before the session is declared failed
const MAX_STORE_ATTEMPTS: u32 = 5;

/// Progress is logged every this many stored pages
const PROGRESS_INTERVAL: u64 = 10;

/// Cloneable handle that asks a running crawl to stop
///
/// Workers finish the page they are working on and then exit. Claims that
/// are left behind are recovered by the next session.
#[derive(Debug, Clone)]
pub struct StopHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Signals every worker to stop after its current page
    pub fn stop(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.sender.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

/// Main crawler coordinator structure
pub struct Coordinator {
    storage: Arc<dyn Storage>,
    session: Arc<CrawlSession>,
    fetcher: Arc<Fetcher>,
    journal: Journal,
    state: SessionState,
    stop: StopHandle,
    resumed: bool,
}

impl Coordinator {
    /// Creates a coordinator backed by the database named in the configuration
    ///
    /// # Arguments
    ///
    /// * `config` - The validated crawler configuration
    /// * `fresh` - Whether to discard previous crawl state and start over
    /// * `config_hash` - Fingerprint of the configuration, stored with the session
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(CrawlError)` - The store could not be opened or the session set up
    pub fn new(config: &Config, fresh: bool, config_hash: &str) -> Result<Self, CrawlError> {
        let storage = open_storage(Path::new(&config.output.database_path))?;
        Self::with_storage(config, Arc::new(storage), fresh, config_hash)
    }

    /// Creates a coordinator on an already opened store
    ///
    /// The latest session is resumed if it never finished or was interrupted,
    /// unless `fresh` is set, in which case frontier, pages and journal are
    /// cleared and a new session is created.
    pub fn with_storage(
        config: &Config,
        storage: Arc<dyn Storage>,
        fresh: bool,
        config_hash: &str,
    ) -> Result<Self, CrawlError> {
        let (session_id, resumed) = if fresh {
            tracing::info!("Starting fresh crawl, clearing previous crawl state");
            storage.clear_crawl_state()?;
            (storage.create_session(config_hash)?, false)
        } else {
            match storage.get_latest_session()? {
                Some(latest) if latest.status.is_resumable() => {
                    tracing::info!(
                        "Resuming session {} (status: {})",
                        latest.id,
                        latest.status.to_db_string()
                    );
                    if latest.config_hash != config_hash {
                        tracing::warn!("Configuration changed since session {} started", latest.id);
                    }
                    storage.resume_session(latest.id)?;
                    (latest.id, true)
                }
                _ => {
                    tracing::info!("Starting new session");
                    (storage.create_session(config_hash)?, false)
                }
            }
        };

        let session = Arc::new(CrawlSession::from_config(config, session_id)?);
        let client = build_http_client(&config.user_agent)?;
        let fetcher = Arc::new(Fetcher::for_session(client, &session));
        let journal = Journal::new(Arc::clone(&storage), session_id);

        Ok(Self {
            storage,
            session,
            fetcher,
            journal,
            state: SessionState::NotStarted,
            stop: StopHandle::new(),
            resumed,
        })
    }

    pub fn session(&self) -> &CrawlSession {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns a handle that stops the crawl once signalled
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Runs the session to completion
    ///
    /// Seeds the frontier, runs the worker pool until every worker has
    /// exited, records the session outcome and returns its summary. An error
    /// is returned only when the store stays unavailable; the session is then
    /// recorded as failed.
    pub async fn run(mut self) -> Result<CrawlSummary, CrawlError> {
        let started = Instant::now();

        self.seed_frontier()?;
        tracing::info!(
            "Session {} running: scope {}, budget {}, {} worker(s)",
            self.session.session_id,
            self.session.domain_scope,
            self.session.document_budget,
            self.session.workers
        );

        let outcome = self.run_workers().await;
        self.state = self.state.complete();

        let session_id = self.session.session_id;
        let reason = match outcome {
            Ok(reason) => reason,
            Err(e) => {
                tracing::error!("Session {} failed: {}", session_id, e);
                self.journal.record(
                    JournalKind::SessionEnd,
                    None,
                    Some(format!("failed: {}", e)),
                );
                if let Err(finish_err) = self.storage.finish_session(session_id, SessionStatus::Failed)
                {
                    tracing::error!("Could not record session failure: {}", finish_err);
                }
                return Err(e);
            }
        };

        let status = match reason {
            CompletionReason::Stopped => SessionStatus::Interrupted,
            _ => SessionStatus::Completed,
        };
        self.storage.finish_session(session_id, status)?;
        self.journal
            .record(JournalKind::SessionEnd, None, Some(reason.to_string()));

        let summary = CrawlSummary {
            session_id,
            resumed: self.resumed,
            reason,
            documents_collected: self.storage.count_session_pages(session_id)?,
            failed: self.storage.count_frontier(FrontierStatus::Failed)?,
            pending: self.storage.count_frontier(FrontierStatus::Pending)?,
            elapsed: started.elapsed(),
        };

        tracing::info!(
            "Session {} finished ({}): {} page(s) stored in {:?}",
            session_id,
            reason,
            summary.documents_collected,
            summary.elapsed
        );

        Ok(summary)
    }

    /// Moves the session from `NotStarted` to `Running`
    fn seed_frontier(&mut self) -> Result<(), CrawlError> {
        // Every claim still open belongs to a process that no longer runs
        let recovered = self.storage.reclaim_stale(Duration::ZERO)?;
        if !recovered.is_empty() {
            tracing::info!("Recovered {} abandoned claim(s)", recovered.len());
        }

        let requeued = self
            .storage
            .requeue_failed(self.session.max_failed_requeues)?;
        if !requeued.is_empty() {
            tracing::info!("Requeued {} failed URL(s)", requeued.len());
        }

        for seed in &self.session.seeds {
            if self
                .storage
                .insert_if_absent(seed.as_str(), self.session.session_id)?
            {
                tracing::debug!("Seeded {}", seed);
                self.journal.record(
                    JournalKind::Discovered,
                    Some(seed.as_str()),
                    Some("seed".to_string()),
                );
            }
        }

        let detail = if self.resumed { "resumed" } else { "new" };
        self.journal
            .record(JournalKind::SessionStart, None, Some(detail.to_string()));
        self.state = self.state.start();
        Ok(())
    }

    /// Spawns the worker pool and waits for every worker to exit
    async fn run_workers(&self) -> Result<CompletionReason, CrawlError> {
        let context = WorkerContext {
            storage: Arc::clone(&self.storage),
            session: Arc::clone(&self.session),
            fetcher: Arc::clone(&self.fetcher),
            journal: self.journal.clone(),
            stop: self.stop.clone(),
            stored: Arc::new(AtomicU64::new(0)),
        };

        let handles: Vec<_> = (0..self.session.workers)
            .map(|worker_id| tokio::spawn(run_worker(context.clone(), worker_id)))
            .collect();

        let mut reasons = Vec::with_capacity(handles.len());
        let mut fatal = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(reason)) => reasons.push(reason),
                Ok(Err(e)) => {
                    fatal.get_or_insert(e);
                }
                Err(e) => {
                    self.stop.stop();
                    fatal.get_or_insert(CrawlError::Worker(e.to_string()));
                }
            }
        }

        if let Some(e) = fatal {
            return Err(e);
        }

        Ok(completion_reason(&reasons))
    }
}

/// Combines the exit reasons of all workers
///
/// The budget wins over an operator stop, which wins over exhaustion.
fn completion_reason(reasons: &[CompletionReason]) -> CompletionReason {
    if reasons.contains(&CompletionReason::BudgetReached) {
        CompletionReason::BudgetReached
    } else if reasons.contains(&CompletionReason::Stopped) {
        CompletionReason::Stopped
    } else {
        CompletionReason::FrontierExhausted
    }
}

/// Shared, read-only view each worker task owns a clone of
#[derive(Clone)]
struct WorkerContext {
    storage: Arc<dyn Storage>,
    session: Arc<CrawlSession>,
    fetcher: Arc<Fetcher>,
    journal: Journal,
    stop: StopHandle,
    stored: Arc<AtomicU64>,
}

/// Claims and processes URLs until there is nothing left to do
async fn run_worker(ctx: WorkerContext, worker_id: u32) -> Result<CompletionReason, CrawlError> {
    let result = worker_loop(&ctx, worker_id).await;
    match &result {
        Ok(reason) => tracing::debug!("Worker {} exiting: {}", worker_id, reason),
        Err(e) => {
            tracing::error!("Worker {} failed: {}", worker_id, e);
            ctx.stop.stop();
        }
    }
    result
}

async fn worker_loop(ctx: &WorkerContext, worker_id: u32) -> Result<CompletionReason, CrawlError> {
    let session_id = ctx.session.session_id;
    let mut shutdown = ctx.stop.subscribe();

    loop {
        if ctx.stop.is_stopped() {
            return Ok(CompletionReason::Stopped);
        }

        let stored = with_store_retry(ctx, "count session pages", || {
            ctx.storage.count_session_pages(session_id)
        })
        .await?;
        if stored >= ctx.session.document_budget {
            return Ok(CompletionReason::BudgetReached);
        }

        let claimed = with_store_retry(ctx, "claim next URL", || ctx.storage.claim_next()).await?;
        let Some(url) = claimed else {
            let open = with_store_retry(ctx, "check open work", || ctx.storage.has_open_work())
                .await?;
            if !open {
                return Ok(CompletionReason::FrontierExhausted);
            }

            let reclaimed = with_store_retry(ctx, "reclaim stale claims", || {
                ctx.storage.reclaim_stale(ctx.session.stale_threshold)
            })
            .await?;
            if !reclaimed.is_empty() {
                tracing::warn!("Reclaimed {} stale claim(s)", reclaimed.len());
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(ctx.session.idle_backoff) => {}
                _ = shutdown.changed() => {}
            }
            continue;
        };

        tracing::debug!("Worker {} claimed {}", worker_id, url);
        process_url(ctx, &url).await?;
    }
}

/// Fetches, extracts and persists one claimed URL
async fn process_url(ctx: &WorkerContext, url: &str) -> Result<(), CrawlError> {
    let session_id = ctx.session.session_id;

    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(e) => {
            let reason = format!("invalid URL: {}", e);
            with_store_retry(ctx, "mark failed", || ctx.storage.mark_failed(url, &reason)).await?;
            ctx.journal
                .record(JournalKind::FetchFailed, Some(url), Some(reason));
            return Ok(());
        }
    };

    let page = match ctx.fetcher.fetch(&parsed, &ctx.journal).await {
        Ok(page) => page,
        Err(e) => {
            let FetchError::Exhausted { last, .. } = &e;
            tracing::warn!("Giving up on {}", e);
            let reason = e.to_string();
            with_store_retry(ctx, "mark failed", || ctx.storage.mark_failed(url, &reason)).await?;
            ctx.journal.record(
                JournalKind::FetchFailed,
                Some(url),
                Some(format!("gave up: {}", last)),
            );
            return Ok(());
        }
    };

    let extraction = extract(&page.body);
    let links = normalize_links(
        &page.final_url,
        &extraction.anchor_hrefs,
        &ctx.session.domain_scope,
    );

    for link in &links {
        let inserted = with_store_retry(ctx, "insert discovered URL", || {
            ctx.storage.insert_if_absent(link.as_str(), session_id)
        })
        .await?;
        if inserted {
            ctx.journal.record(
                JournalKind::Discovered,
                Some(link.as_str()),
                Some(format!("linked from {}", url)),
            );
        }
    }

    let raw_content_ref = match &ctx.session.raw_content_dir {
        Some(dir) => save_raw_content(dir, url, &page.body).await,
        None => None,
    };

    let record = PageRecord {
        url: url.to_string(),
        session_id,
        fetched_at: timestamp_now(),
        final_url: page.final_url.to_string(),
        status_code: page.status_code,
        titles: extraction.titles,
        emphasis: extraction.emphasis,
        links: links.iter().map(Url::to_string).collect(),
        raw_content_ref,
    };

    let outcome = if ctx.session.persist_over_budget {
        let inserted =
            with_store_retry(ctx, "store page", || ctx.storage.insert_page(&record)).await?;
        if inserted {
            PageInsert::Inserted
        } else {
            PageInsert::Duplicate
        }
    } else {
        with_store_retry(ctx, "store page", || {
            ctx.storage
                .insert_page_within_budget(&record, ctx.session.document_budget)
        })
        .await?
    };

    match outcome {
        PageInsert::Inserted | PageInsert::Duplicate => {
            let done = with_store_retry(ctx, "mark done", || ctx.storage.mark_done(url)).await?;
            if !done {
                tracing::debug!("{} was no longer claimed when it finished", url);
            }

            let detail = if outcome == PageInsert::Inserted {
                "stored"
            } else {
                "already stored"
            };
            ctx.journal
                .record(JournalKind::FetchSucceeded, Some(url), Some(detail.to_string()));

            if outcome == PageInsert::Inserted {
                let stored = ctx.stored.fetch_add(1, Ordering::Relaxed) + 1;
                if stored % PROGRESS_INTERVAL == 0 {
                    tracing::info!(
                        "Progress: {} page(s) stored this run, {} link(s) on {}",
                        stored,
                        links.len(),
                        url
                    );
                }
            }
        }
        PageInsert::OverBudget => {
            tracing::debug!("Budget reached, discarding {}", url);
            if let Some(path) = &record.raw_content_ref {
                discard_raw_content(Path::new(path)).await;
            }
            with_store_retry(ctx, "release claim", || ctx.storage.release_claim(url)).await?;
        }
    }

    Ok(())
}

/// Writes a page body to `<dir>/<sha256(url)>.html` and returns the path
///
/// Failures are logged; the page record is then stored without a reference.
async fn save_raw_content(dir: &Path, url: &str, body: &[u8]) -> Option<String> {
    let path = raw_content_path(dir, url);

    let result = async {
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(&path, body).await
    }
    .await;

    match result {
        Ok(()) => Some(path.to_string_lossy().into_owned()),
        Err(e) => {
            tracing::warn!("Failed to write raw content for {}: {}", url, e);
            None
        }
    }
}

/// Removes a body file whose page record was not stored
async fn discard_raw_content(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::warn!("Failed to remove raw content {}: {}", path.display(), e);
    }
}

fn raw_content_path(dir: &Path, url: &str) -> PathBuf {
    let digest = Sha256::digest(url.as_bytes());
    dir.join(format!("{}.html", hex::encode(digest)))
}

/// Runs a store operation, retrying it while the store is unavailable
async fn with_store_retry<T, F>(ctx: &WorkerContext, what: &str, mut op: F) -> Result<T, CrawlError>
where
    F: FnMut() -> StorageResult<T>,
{
    let mut attempt = 1;
    loop {
        let error = match op() {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if attempt >= MAX_STORE_ATTEMPTS {
            return Err(CrawlError::Storage(error));
        }

        tracing::warn!(
            "Store error during {} (attempt {}/{}): {}",
            what,
            attempt,
            MAX_STORE_ATTEMPTS,
            error
        );
        attempt += 1;
        tokio::time::sleep(ctx.session.idle_backoff).await;
    }
}

/// Runs a complete crawl operation
///
/// Opens the store, resumes or starts a session, and runs it to completion.
/// Ctrl+C stops the crawl gracefully; the session is then recorded as
/// interrupted and resumed by the next run.
///
/// # Arguments
///
/// * `config` - The validated crawler configuration
/// * `fresh` - Whether to discard previous crawl state
/// * `config_hash` - Fingerprint of the configuration
///
/// # Example
///
/// ```no_run
/// use metacrawl::config::load_config_with_hash;
/// use metacrawl::crawler::run_crawl;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("metacrawl.toml"))?;
/// let summary = run_crawl(&config, false, &hash).await?;
/// println!("{} pages stored", summary.documents_collected);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(
    config: &Config,
    fresh: bool,
    config_hash: &str,
) -> Result<CrawlSummary, CrawlError> {
    let coordinator = Coordinator::new(config, fresh, config_hash)?;

    let stop = coordinator.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, finishing in-flight pages");
            stop.stop();
        }
    });

    coordinator.run().await
}
