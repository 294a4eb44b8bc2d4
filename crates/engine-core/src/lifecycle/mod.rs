use crate::event_bus::bus::EventBus;
use model::{
    core::identifiers::{QueryId, StageId},
    query::{
        error::QueryError,
        snapshot::{QueryOutputInfo, QuerySnapshot},
        state::QueryState,
    },
};
use tokio::sync::watch;

pub mod state_machine;

/// The result cursor's view of a running query.
///
/// Commands are idempotent: failing or cancelling a query that is already
/// done is a no-op, and heartbeats may be recorded any number of times.
pub trait QueryLifecycle: Send + Sync {
    fn query_id(&self) -> &QueryId;

    fn snapshot(&self) -> QuerySnapshot;

    /// Schema and every output location announced so far, or `None` before
    /// the output stage has been scheduled.
    fn output_info(&self) -> Option<QueryOutputInfo>;

    fn events(&self) -> EventBus;

    /// Receiver that observes every state transition; the current value is
    /// the latest state.
    fn state_changes(&self) -> watch::Receiver<QueryState>;

    fn record_heartbeat(&self);

    fn fail(&self, error: QueryError);

    fn cancel(&self);

    fn cancel_stage(&self, stage: StageId);
}
