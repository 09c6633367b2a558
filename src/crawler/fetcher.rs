//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings
//! - GET requests with redirects followed by the client
//! - A bounded retry loop with a fixed backoff between attempts
//! - A per-attempt stall guard
//! - Journaling of every attempt and its outcome

use crate::config::UserAgentConfig;
use crate::crawler::journal::Journal;
use crate::crawler::session::CrawlSession;
use crate::storage::JournalKind;
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Maximum number of redirects followed for a single request
const MAX_REDIRECTS: usize = 10;

/// Why a single fetch attempt failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchFailure {
    /// Connection, TLS or redirect error before a response arrived
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a non-2xx status
    #[error("HTTP {0}")]
    Status(u16),

    /// The response body could not be read
    #[error("body read error: {0}")]
    Body(String),

    /// The attempt did not finish within the attempt timeout
    #[error("stalled after {0:?}")]
    Stalled(Duration),
}

/// Terminal outcome of a fetch whose attempts were all used up
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{url}: gave up after {attempts} attempt(s), last failure: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: FetchFailure,
    },
}

/// A successfully fetched page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub final_url: Url,
    /// HTTP status code
    pub status_code: u16,
    /// Raw response body
    pub body: Vec<u8>,
    /// Number of attempts used, including the successful one
    pub attempts: u32,
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use metacrawl::config::UserAgentConfig;
/// use metacrawl::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "metacrawl".to_string(),
///     crawler_version: "0.1".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent_string(config))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Format: CrawlerName/Version (+ContactURL; ContactEmail)
fn user_agent_string(config: &UserAgentConfig) -> String {
    format!(
        "{}/{} (+{}; {})",
        config.crawler_name, config.crawler_version, config.contact_url, config.contact_email
    )
}

/// Fetches pages with a bounded number of attempts
///
/// Transient and permanent failures are treated alike: every failure is
/// retried until `max_attempts` is used up, with a fixed `retry_backoff`
/// sleep between attempts.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    max_attempts: u32,
    retry_backoff: Duration,
    attempt_timeout: Duration,
}

impl Fetcher {
    /// Creates a fetcher; `max_attempts` is raised to 1 if given as 0
    pub fn new(
        client: Client,
        max_attempts: u32,
        retry_backoff: Duration,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            client,
            max_attempts: max_attempts.max(1),
            retry_backoff,
            attempt_timeout,
        }
    }

    /// Creates a fetcher using the retry settings of a crawl session
    pub fn for_session(client: Client, session: &CrawlSession) -> Self {
        Self::new(
            client,
            session.max_attempts,
            session.retry_backoff,
            session.attempt_timeout,
        )
    }

    /// Fetches `url`, retrying failed attempts
    ///
    /// # Journal
    ///
    /// | When | Event | Detail |
    /// |------|-------|--------|
    /// | Before each attempt | FetchAttempt | `attempt i/n` |
    /// | Attempt failed | FetchFailed | failure cause |
    /// | Attempt succeeded | FetchSucceeded | `HTTP <status>` |
    ///
    /// # Returns
    ///
    /// * `Ok(FetchedPage)` - A 2xx response and its body
    /// * `Err(FetchError::Exhausted)` - Every attempt failed
    pub async fn fetch(&self, url: &Url, journal: &Journal) -> Result<FetchedPage, FetchError> {
        let mut attempt = 0;

        loop {
            attempt += 1;
            journal.record(
                JournalKind::FetchAttempt,
                Some(url.as_str()),
                Some(format!("attempt {}/{}", attempt, self.max_attempts)),
            );
            tracing::debug!("Fetching {} (attempt {}/{})", url, attempt, self.max_attempts);

            let failure = match tokio::time::timeout(self.attempt_timeout, self.attempt(url)).await
            {
                Ok(Ok(mut page)) => {
                    page.attempts = attempt;
                    journal.record(
                        JournalKind::FetchSucceeded,
                        Some(url.as_str()),
                        Some(format!("HTTP {}", page.status_code)),
                    );
                    return Ok(page);
                }
                Ok(Err(failure)) => failure,
                Err(_) => FetchFailure::Stalled(self.attempt_timeout),
            };

            journal.record(
                JournalKind::FetchFailed,
                Some(url.as_str()),
                Some(failure.to_string()),
            );

            if attempt >= self.max_attempts {
                return Err(FetchError::Exhausted {
                    url: url.to_string(),
                    attempts: attempt,
                    last: failure,
                });
            }

            tracing::warn!(
                "Attempt {}/{} for {} failed: {}; retrying in {:?}",
                attempt,
                self.max_attempts,
                url,
                failure,
                self.retry_backoff
            );
            tokio::time::sleep(self.retry_backoff).await;
        }
    }

    /// Performs a single GET request and reads the body
    async fn attempt(&self, url: &Url) -> Result<FetchedPage, FetchFailure> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchFailure::Transport(classify_transport_error(&e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchFailure::Status(status.as_u16()));
        }

        let final_url = response.url().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchFailure::Body(e.to_string()))?;

        Ok(FetchedPage {
            final_url,
            status_code: status.as_u16(),
            body: body.to_vec(),
            attempts: 0,
        })
    }
}

fn classify_transport_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        format!("request timeout: {}", error)
    } else if error.is_connect() {
        format!("connection failed: {}", error)
    } else if error.is_redirect() {
        format!("redirect error: {}", error)
    } else {
        error.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{SqliteStorage, Storage};
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_config() -> UserAgentConfig {
        UserAgentConfig {
            crawler_name: "TestCrawler".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "admin@example.com".to_string(),
        }
    }

    fn fetcher(max_attempts: u32, attempt_timeout: Duration) -> Fetcher {
        let client = build_http_client(&create_test_config()).unwrap();
        Fetcher::new(
            client,
            max_attempts,
            Duration::from_millis(10),
            attempt_timeout,
        )
    }

    fn journal() -> (Arc<dyn Storage>, Journal) {
        let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::new_in_memory().unwrap());
        let session_id = storage.create_session("test").unwrap();
        let journal = Journal::new(Arc::clone(&storage), session_id);
        (storage, journal)
    }

    fn kinds(storage: &Arc<dyn Storage>, url: &Url) -> Vec<JournalKind> {
        storage
            .events_for_url(url.as_str())
            .unwrap()
            .into_iter()
            .map(|event| event.kind)
            .collect()
    }

    #[test]
    fn test_build_http_client() {
        let config = create_test_config();
        assert!(build_http_client(&config).is_ok());
    }

    #[test]
    fn test_user_agent_format() {
        assert_eq!(
            user_agent_string(&create_test_config()),
            "TestCrawler/1.0 (+https://example.com/about; admin@example.com)"
        );
    }

    #[test]
    fn test_zero_attempts_is_raised_to_one() {
        assert_eq!(fetcher(0, Duration::from_secs(5)).max_attempts, 1);
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<h1>Hi</h1>"))
            .expect(1)
            .mount(&server)
            .await;

        let (storage, journal) = journal();
        let url = Url::parse(&format!("{}/page", server.uri())).unwrap();
        let page = fetcher(3, Duration::from_secs(5))
            .fetch(&url, &journal)
            .await
            .unwrap();

        assert_eq!(page.status_code, 200);
        assert_eq!(page.body, b"<h1>Hi</h1>");
        assert_eq!(page.attempts, 1);
        assert_eq!(page.final_url, url);
        assert_eq!(
            kinds(&storage, &url),
            vec![JournalKind::FetchAttempt, JournalKind::FetchSucceeded]
        );
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let (storage, journal) = journal();
        let url = Url::parse(&format!("{}/flaky", server.uri())).unwrap();
        let page = fetcher(3, Duration::from_secs(5))
            .fetch(&url, &journal)
            .await
            .unwrap();

        assert_eq!(page.attempts, 2);
        assert_eq!(
            kinds(&storage, &url),
            vec![
                JournalKind::FetchAttempt,
                JournalKind::FetchFailed,
                JournalKind::FetchAttempt,
                JournalKind::FetchSucceeded,
            ]
        );
    }

    #[tokio::test]
    async fn test_persistent_error_exhausts_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let (storage, journal) = journal();
        let url = Url::parse(&format!("{}/broken", server.uri())).unwrap();
        let result = fetcher(3, Duration::from_secs(5)).fetch(&url, &journal).await;

        match result {
            Err(FetchError::Exhausted { attempts, last, .. }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last, FetchFailure::Status(500));
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }

        let events = storage.events_for_url(url.as_str()).unwrap();
        assert_eq!(events.len(), 6);
        assert_eq!(events[1].detail.as_deref(), Some("HTTP 500"));
    }

    #[tokio::test]
    async fn test_not_found_is_retried_like_any_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .expect(2)
            .mount(&server)
            .await;

        let (_storage, journal) = journal();
        let url = Url::parse(&format!("{}/missing", server.uri())).unwrap();
        let result = fetcher(2, Duration::from_secs(5)).fetch(&url, &journal).await;
        assert!(matches!(
            result,
            Err(FetchError::Exhausted {
                last: FetchFailure::Status(404),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_stalled_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let (_storage, journal) = journal();
        let url = Url::parse(&format!("{}/slow", server.uri())).unwrap();
        let timeout = Duration::from_millis(100);
        let result = fetcher(2, timeout).fetch(&url, &journal).await;

        match result {
            Err(FetchError::Exhausted { attempts, last, .. }) => {
                assert_eq!(attempts, 2);
                assert_eq!(last, FetchFailure::Stalled(timeout));
            }
            other => panic!("expected stall, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_redirect_is_followed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(
                ResponseTemplate::new(301).insert_header("Location", "/new"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .respond_with(ResponseTemplate::new(200).set_body_string("moved"))
            .mount(&server)
            .await;

        let (_storage, journal) = journal();
        let url = Url::parse(&format!("{}/old", server.uri())).unwrap();
        let page = fetcher(1, Duration::from_secs(5))
            .fetch(&url, &journal)
            .await
            .unwrap();

        assert_eq!(page.final_url.path(), "/new");
        assert_eq!(page.body, b"moved");
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_failure() {
        let (_storage, journal) = journal();
        // Port 1 is reserved and nothing listens there in test environments
        let url = Url::parse("http://127.0.0.1:1/").unwrap();
        let result = fetcher(1, Duration::from_secs(5)).fetch(&url, &journal).await;
        assert!(matches!(
            result,
            Err(FetchError::Exhausted {
                last: FetchFailure::Transport(_),
                ..
            })
        ));
    }
}
