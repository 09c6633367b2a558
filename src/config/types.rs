use serde::Deserialize;

/// Main configuration structure for metacrawl
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub scope: ScopeConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Maximum number of page records a session stores
    #[serde(rename = "document-budget")]
    pub document_budget: u64,

    /// Number of concurrent workers
    pub workers: u32,

    /// Fetch attempts per URL before it is marked failed
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Fixed delay between fetch attempts (milliseconds)
    #[serde(rename = "retry-backoff-ms")]
    pub retry_backoff_ms: u64,

    /// Wall-clock limit for a single fetch attempt (milliseconds)
    #[serde(rename = "attempt-timeout-ms")]
    pub attempt_timeout_ms: u64,

    /// Age after which an in-progress claim is considered abandoned (seconds)
    #[serde(rename = "stale-threshold-secs")]
    pub stale_threshold_secs: u64,

    /// Wait when nothing is pending but other workers are busy (milliseconds)
    #[serde(rename = "idle-backoff-ms")]
    pub idle_backoff_ms: u64,

    /// How many times a failed URL is put back in the frontier by later sessions
    #[serde(rename = "max-failed-requeues")]
    pub max_failed_requeues: u32,

    /// Store pages that finish after the budget was reached instead of discarding them
    #[serde(rename = "persist-over-budget")]
    pub persist_over_budget: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            document_budget: 100,
            workers: 4,
            max_attempts: 3,
            retry_backoff_ms: 2_000,
            attempt_timeout_ms: 30_000,
            stale_threshold_secs: 300,
            idle_backoff_ms: 250,
            max_failed_requeues: 1,
            persist_over_budget: false,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "metacrawl".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "crawler@example.com".to_string(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Directory receiving the raw body of every stored page
    #[serde(rename = "raw-content-dir", default)]
    pub raw_content_dir: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database_path: "./metacrawl.db".to_string(),
            raw_content_dir: None,
        }
    }
}

/// Where the crawl starts and which host it may follow links on
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScopeConfig {
    /// Host that discovered links must match; defaults to the first seed's host
    #[serde(default)]
    pub domain: Option<String>,

    /// Seed URLs to start crawling from
    #[serde(default)]
    pub seeds: Vec<String>,
}

/// Values given on the command line, applied on top of the file
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub seeds: Vec<String>,
    pub document_budget: Option<u64>,
    pub domain: Option<String>,
    pub workers: Option<u32>,
    pub database_path: Option<String>,
}

impl Config {
    /// Applies command-line overrides
    ///
    /// Seeds given on the command line replace the configured seeds.
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if !overrides.seeds.is_empty() {
            self.scope.seeds = overrides.seeds;
        }
        if let Some(budget) = overrides.document_budget {
            self.crawler.document_budget = budget;
        }
        if let Some(domain) = overrides.domain {
            self.scope.domain = Some(domain);
        }
        if let Some(workers) = overrides.workers {
            self.crawler.workers = workers;
        }
        if let Some(path) = overrides.database_path {
            self.output.database_path = path;
        }
    }
}
