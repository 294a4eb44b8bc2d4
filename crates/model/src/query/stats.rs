use crate::query::state::QueryState;
use serde::{Deserialize, Serialize};

/// Execution statistics snapshot returned with every batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementStats {
    pub state: QueryState,
    pub queued: bool,
    pub scheduled: bool,
    pub nodes: u32,
    pub total_splits: u64,
    pub completed_splits: u64,
    pub processed_rows: u64,
    pub processed_bytes: u64,
    pub elapsed_time_millis: u64,
    pub progress_percentage: Option<f64>,
}

impl StatementStats {
    pub fn for_state(state: QueryState) -> Self {
        Self {
            state,
            queued: state.is_queued(),
            scheduled: state.is_scheduled(),
            nodes: 0,
            total_splits: 0,
            completed_splits: 0,
            processed_rows: 0,
            processed_bytes: 0,
            elapsed_time_millis: 0,
            progress_percentage: None,
        }
    }
}

impl Default for StatementStats {
    fn default() -> Self {
        Self::for_state(QueryState::Queued)
    }
}
