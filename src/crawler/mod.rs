//! Crawler module for web page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with bounded retry
//! - HTML extraction of titles, emphasis and links
//! - The session snapshot shared by workers
//! - The crawl journal
//! - Overall crawl coordination

mod coordinator;
mod fetcher;
mod journal;
mod parser;
mod session;

pub use coordinator::{run_crawl, Coordinator, StopHandle};
pub use fetcher::{build_http_client, FetchError, FetchFailure, FetchedPage, Fetcher};
pub use journal::Journal;
pub use parser::{extract, Extraction};
pub use session::CrawlSession;
