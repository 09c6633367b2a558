//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `FrontierStatus`: lifecycle of a single URL (pending, in progress, done, failed)
//! - `SessionState`: lifecycle of a crawl session
//! - `SessionStatus`: how a session row is recorded in the database
//! - `CompletionReason`: why the workers stopped

mod frontier_status;
mod session_state;

// Re-export main types
pub use frontier_status::FrontierStatus;
pub use session_state::{CompletionReason, SessionState, SessionStatus};
