//! Output module for reporting crawl results
//!
//! This module handles:
//! - The end-of-session summary
//! - Database statistics for `--stats`

pub mod stats;
mod summary;

pub use stats::{load_statistics, print_statistics, CrawlStatistics};
pub use summary::{print_summary, CrawlSummary};
