use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a query, in the order a healthy query moves through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryState {
    Queued,
    Planning,
    Starting,
    Running,
    Finishing,
    Finished,
    Failed,
}

impl QueryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryState::Queued => "QUEUED",
            QueryState::Planning => "PLANNING",
            QueryState::Starting => "STARTING",
            QueryState::Running => "RUNNING",
            QueryState::Finishing => "FINISHING",
            QueryState::Finished => "FINISHED",
            QueryState::Failed => "FAILED",
        }
    }

    /// Terminal states: no further progress happens.
    pub fn is_done(&self) -> bool {
        matches!(self, QueryState::Finished | QueryState::Failed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, QueryState::Failed)
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, QueryState::Queued)
    }

    pub fn is_scheduled(&self) -> bool {
        *self >= QueryState::Running
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
