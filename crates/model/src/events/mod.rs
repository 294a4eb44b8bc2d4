use crate::{
    core::{
        data_type::DataType,
        identifiers::{Location, QueryId},
    },
    query::state::QueryState,
};
use std::fmt::Debug;

/// A trait for events that can be published on the EventBus.
pub trait Event: Send + Sync + Debug + 'static {
    /// Returns a unique identifier for this event type.
    fn event_type(&self) -> &'static str;
}

/// Emitted whenever the query announces new output buffer locations.
///
/// The first occurrence fixes the output schema; later ones only add
/// locations.
#[derive(Debug, Clone)]
pub struct OutputLocationsChanged {
    pub query_id: QueryId,
    pub columns: Vec<String>,
    pub types: Vec<DataType>,
    pub new_locations: Vec<Location>,
    pub no_more_locations: bool,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Event for OutputLocationsChanged {
    fn event_type(&self) -> &'static str {
        "query.output_locations_changed"
    }
}

/// Emitted exactly once, when the query reaches a terminal state.
#[derive(Debug, Clone)]
pub struct QueryStateDone {
    pub query_id: QueryId,
    pub final_state: QueryState,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Event for QueryStateDone {
    fn event_type(&self) -> &'static str {
        "query.state_done"
    }
}

/// The closed set of lifecycle notifications a result cursor listens to.
#[derive(Debug, Clone)]
pub enum QueryEvent {
    OutputLocationsChanged(OutputLocationsChanged),
    StateDone(QueryStateDone),
}

impl QueryEvent {
    pub fn query_id(&self) -> &QueryId {
        match self {
            QueryEvent::OutputLocationsChanged(e) => &e.query_id,
            QueryEvent::StateDone(e) => &e.query_id,
        }
    }
}

impl Event for QueryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            QueryEvent::OutputLocationsChanged(e) => e.event_type(),
            QueryEvent::StateDone(e) => e.event_type(),
        }
    }
}

impl From<OutputLocationsChanged> for QueryEvent {
    fn from(event: OutputLocationsChanged) -> Self {
        QueryEvent::OutputLocationsChanged(event)
    }
}

impl From<QueryStateDone> for QueryEvent {
    fn from(event: QueryStateDone) -> Self {
        QueryEvent::StateDone(event)
    }
}
