//! Immutable settings of one crawl session

use crate::config::Config;
use crate::url::{extract_domain, parse_seed};
use crate::{CrawlError, UrlError};
use std::path::PathBuf;
use std::time::Duration;
use url::{Host, Url};

/// Everything a worker needs to know about the session it works for
///
/// Built once at startup from the validated configuration and shared
/// read-only between workers.
#[derive(Debug, Clone)]
pub struct CrawlSession {
    pub session_id: i64,
    /// Canonical seed URLs, duplicates removed, in configuration order
    pub seeds: Vec<Url>,
    /// Host that discovered links must match exactly
    pub domain_scope: String,
    pub document_budget: u64,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
    pub attempt_timeout: Duration,
    pub stale_threshold: Duration,
    pub idle_backoff: Duration,
    pub workers: u32,
    pub max_failed_requeues: u32,
    pub persist_over_budget: bool,
    pub raw_content_dir: Option<PathBuf>,
}

impl CrawlSession {
    /// Builds the session snapshot for `session_id`
    ///
    /// The domain scope is the configured domain, or the host of the first
    /// seed when none is configured. A configured domain is stored in the
    /// ASCII form that `Url::host_str` reports, so internationalized names
    /// match their punycode hosts.
    pub fn from_config(config: &Config, session_id: i64) -> Result<Self, CrawlError> {
        let mut seeds: Vec<Url> = Vec::with_capacity(config.scope.seeds.len());
        for seed in &config.scope.seeds {
            let url = parse_seed(seed)?;
            if !seeds.contains(&url) {
                seeds.push(url);
            }
        }

        let domain_scope = match &config.scope.domain {
            Some(domain) => Host::parse(domain.trim())?.to_string(),
            None => seeds
                .first()
                .and_then(extract_domain)
                .ok_or(UrlError::MissingDomain)?,
        };

        let crawler = &config.crawler;
        Ok(Self {
            session_id,
            seeds,
            domain_scope,
            document_budget: crawler.document_budget,
            max_attempts: crawler.max_attempts,
            retry_backoff: Duration::from_millis(crawler.retry_backoff_ms),
            attempt_timeout: Duration::from_millis(crawler.attempt_timeout_ms),
            stale_threshold: Duration::from_secs(crawler.stale_threshold_secs),
            idle_backoff: Duration::from_millis(crawler.idle_backoff_ms),
            workers: crawler.workers,
            max_failed_requeues: crawler.max_failed_requeues,
            persist_over_budget: crawler.persist_over_budget,
            raw_content_dir: config.output.raw_content_dir.as_ref().map(PathBuf::from),
        })
    }
}
