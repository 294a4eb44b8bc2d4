use crate::{
    core::{
        data_type::DataType,
        identifiers::{Location, QueryId},
    },
    query::{error::QueryError, state::QueryState, stats::StatementStats},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub code: i32,
    pub message: String,
}

/// Session-level side effects of a statement that the client must apply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdates {
    pub set_session_properties: BTreeMap<String, String>,
    pub reset_session_properties: BTreeSet<String>,
    pub added_prepared_statements: BTreeMap<String, String>,
    pub deallocated_prepared_statements: BTreeSet<String>,
    pub started_transaction_id: Option<String>,
    pub clear_transaction_id: bool,
}

impl SessionUpdates {
    pub fn is_empty(&self) -> bool {
        self == &SessionUpdates::default()
    }
}

/// Point-in-time view of a query, pulled from the lifecycle facade.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySnapshot {
    pub query_id: QueryId,
    pub state: QueryState,
    /// False for statements that never produce rows (DDL, session commands).
    pub has_output_stage: bool,
    pub update_type: Option<String>,
    pub failure: Option<QueryError>,
    pub stats: StatementStats,
    pub warnings: Vec<Warning>,
    pub session: SessionUpdates,
    pub last_heartbeat: DateTime<Utc>,
}

/// Accumulated output description of a query: schema plus every buffer
/// location announced so far.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutputInfo {
    pub columns: Vec<String>,
    pub types: Vec<DataType>,
    pub locations: Vec<Location>,
    pub no_more_locations: bool,
}
