//! Session-level state machine
//!
//! A crawl session moves `NotStarted -> Running -> Completed`. The reason a
//! session stopped is tracked separately so the summary can report it.

use std::fmt;

/// State of a crawl session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Seeds not yet inserted into the frontier
    NotStarted,

    /// Seeds inserted, workers claiming work
    Running,

    /// Workers have stopped claiming work
    Completed,
}

impl SessionState {
    /// Returns the state reached after seeding the frontier
    ///
    /// Only `NotStarted` moves forward; any other state is returned as is.
    pub fn start(self) -> Self {
        match self {
            Self::NotStarted => Self::Running,
            other => other,
        }
    }

    /// Returns the state reached once every worker has exited
    pub fn complete(self) -> Self {
        match self {
            Self::Running => Self::Completed,
            other => other,
        }
    }
}

/// Why the workers stopped claiming new work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompletionReason {
    /// The session stored `document_budget` page records
    BudgetReached,

    /// No pending and no in-progress entries remain
    FrontierExhausted,

    /// The operator asked the crawl to stop
    Stopped,
}

impl fmt::Display for CompletionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::BudgetReached => "document budget reached",
            Self::FrontierExhausted => "frontier exhausted",
            Self::Stopped => "stopped by operator",
        };
        f.write_str(text)
    }
}

/// Status of a session row in the database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl SessionStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns true if a new process should continue this session
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::Running | Self::Interrupted)
    }
}
