//! End-of-session summary

use crate::state::CompletionReason;
use std::time::Duration;

/// Outcome of one crawl session as reported to the operator
#[derive(Debug, Clone)]
pub struct CrawlSummary {
    pub session_id: i64,

    /// True if this run continued an earlier, unfinished session
    pub resumed: bool,

    pub reason: CompletionReason,

    /// Page records stored by this session, across resumptions
    pub documents_collected: u64,

    /// Frontier entries that ended `Failed`
    pub failed: u64,

    /// Frontier entries still `Pending`, left for a later session
    pub pending: u64,

    /// Wall-clock time of this run
    pub elapsed: Duration,
}

/// Prints the summary to stdout
pub fn print_summary(summary: &CrawlSummary) {
    println!("=== Crawl Summary ===\n");
    println!(
        "Session:             {}{}",
        summary.session_id,
        if summary.resumed { " (resumed)" } else { "" }
    );
    println!("Completion reason:   {}", summary.reason);
    println!("Documents collected: {}", summary.documents_collected);
    println!("URLs failed:         {}", summary.failed);
    println!("URLs still pending:  {}", summary.pending);
    println!("Elapsed:             {:.1}s", summary.elapsed.as_secs_f64());
}
