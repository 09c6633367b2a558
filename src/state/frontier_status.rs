/// Frontier status definitions for tracking crawl progress
///
/// Every URL in the frontier is in exactly one of these states.
use std::fmt;

/// Lifecycle state of a frontier entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrontierStatus {
    /// Discovered and waiting to be claimed
    Pending,

    /// Claimed by a worker that is fetching and processing it
    InProgress,

    /// Fetched and its page record stored
    Done,

    /// Every fetch attempt failed
    Failed,
}

impl FrontierStatus {
    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all statuses
    pub fn all() -> [Self; 4] {
        [Self::Pending, Self::InProgress, Self::Done, Self::Failed]
    }
}

impl fmt::Display for FrontierStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
