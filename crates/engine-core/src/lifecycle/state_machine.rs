use crate::{event_bus::bus::EventBus, lifecycle::QueryLifecycle};
use chrono::{DateTime, Utc};
use model::{
    core::{
        data_type::DataType,
        identifiers::{Location, QueryId, StageId},
    },
    events::{OutputLocationsChanged, QueryStateDone},
    query::{
        error::QueryError,
        snapshot::{QueryOutputInfo, QuerySnapshot, SessionUpdates, Warning},
        state::QueryState,
        stats::StatementStats,
    },
};
use std::{
    collections::BTreeSet,
    sync::{Mutex, MutexGuard, PoisonError},
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Clone, Copy)]
struct Progress {
    nodes: u32,
    total_splits: u64,
    completed_splits: u64,
    processed_rows: u64,
    processed_bytes: u64,
}

#[derive(Debug)]
struct Inner {
    state: QueryState,
    has_output_stage: bool,
    update_type: Option<String>,
    failure: Option<QueryError>,
    progress: Progress,
    warnings: Vec<Warning>,
    session: SessionUpdates,
    output: Option<QueryOutputInfo>,
    canceled_stages: BTreeSet<StageId>,
    created: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    last_heartbeat: DateTime<Utc>,
}

/// In-memory query lifecycle. States only move forward; the transition
/// into a terminal state happens once and is announced once.
pub struct QueryStateMachine {
    query_id: QueryId,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<QueryState>,
    events: EventBus,
}

impl QueryStateMachine {
    pub fn new(query_id: QueryId, has_output_stage: bool) -> Self {
        let now = Utc::now();
        let (state_tx, _) = watch::channel(QueryState::Queued);
        Self {
            query_id,
            inner: Mutex::new(Inner {
                state: QueryState::Queued,
                has_output_stage,
                update_type: None,
                failure: None,
                progress: Progress::default(),
                warnings: Vec::new(),
                session: SessionUpdates::default(),
                output: None,
                canceled_stages: BTreeSet::new(),
                created: now,
                end_time: None,
                last_heartbeat: now,
            }),
            state_tx,
            events: EventBus::new(),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> QueryState {
        self.inner().state
    }

    pub fn set_update_type(&self, update_type: impl Into<String>) {
        self.inner().update_type = Some(update_type.into());
    }

    /// Moves to a later non-terminal state. Returns false when the move
    /// would go backwards or the query is already done.
    pub fn advance(&self, next: QueryState) -> bool {
        if next.is_done() {
            return match next {
                QueryState::Failed => {
                    self.fail(QueryError::unknown_failure(next));
                    true
                }
                _ => self.finish(),
            };
        }

        let mut inner = self.inner();
        if inner.state.is_done() || next <= inner.state {
            return false;
        }

        debug!(query_id = %self.query_id, from = %inner.state, to = %next, "Query state changed");
        inner.state = next;
        self.state_tx.send_replace(next);
        true
    }

    /// Transitions to FINISHED. Returns false if the query was already done.
    pub fn finish(&self) -> bool {
        self.transition_to_done(QueryState::Finished, None)
    }

    /// Announces output schema and locations. The first call fixes the
    /// schema; later calls only contribute locations.
    pub fn set_output_info(
        &self,
        columns: Vec<String>,
        types: Vec<DataType>,
        new_locations: Vec<Location>,
        no_more_locations: bool,
    ) {
        let mut inner = self.inner();
        let output = inner.output.get_or_insert_with(|| QueryOutputInfo {
            columns,
            types,
            locations: Vec::new(),
            no_more_locations: false,
        });

        if output.no_more_locations && !new_locations.is_empty() {
            warn!(query_id = %self.query_id, "Ignoring locations announced after no-more-locations");
            return;
        }

        let fresh: Vec<Location> = new_locations
            .into_iter()
            .filter(|location| !output.locations.contains(location))
            .collect();
        output.locations.extend(fresh.iter().cloned());
        output.no_more_locations |= no_more_locations;

        let event = OutputLocationsChanged {
            query_id: self.query_id.clone(),
            columns: output.columns.clone(),
            types: output.types.clone(),
            new_locations: fresh,
            no_more_locations: output.no_more_locations,
            timestamp: Utc::now(),
        };
        self.events.publish(event);
    }

    pub fn add_warning(&self, warning: Warning) {
        self.inner().warnings.push(warning);
    }

    pub fn update_session(&self, update: impl FnOnce(&mut SessionUpdates)) {
        update(&mut self.inner().session);
    }

    pub fn record_progress(
        &self,
        nodes: u32,
        total_splits: u64,
        completed_splits: u64,
        rows: u64,
        bytes: u64,
    ) {
        let mut inner = self.inner();
        let progress = &mut inner.progress;
        progress.nodes = nodes;
        progress.total_splits = total_splits;
        progress.completed_splits = completed_splits;
        progress.processed_rows += rows;
        progress.processed_bytes += bytes;
    }

    pub fn is_stage_canceled(&self, stage: StageId) -> bool {
        self.inner().canceled_stages.contains(&stage)
    }

    pub fn last_heartbeat(&self) -> DateTime<Utc> {
        self.inner().last_heartbeat
    }

    fn transition_to_done(&self, target: QueryState, failure: Option<QueryError>) -> bool {
        let final_state = {
            let mut inner = self.inner();
            if inner.state.is_done() {
                debug!(
                    query_id = %self.query_id,
                    state = %inner.state,
                    "Ignoring transition of finished query"
                );
                return false;
            }

            inner.state = target;
            inner.failure = failure;
            inner.end_time = Some(Utc::now());
            self.state_tx.send_replace(target);
            target
        };

        match final_state {
            QueryState::Failed => warn!(query_id = %self.query_id, "Query failed"),
            _ => info!(query_id = %self.query_id, state = %final_state, "Query reached terminal state"),
        }

        self.events.publish(QueryStateDone {
            query_id: self.query_id.clone(),
            final_state,
            timestamp: Utc::now(),
        });
        true
    }
}

fn build_stats(inner: &Inner) -> StatementStats {
    let end = inner.end_time.unwrap_or_else(Utc::now);
    let elapsed = (end - inner.created).num_milliseconds().max(0) as u64;
    let progress = inner.progress;

    let progress_percentage = (inner.state.is_scheduled() && progress.total_splits > 0)
        .then(|| progress.completed_splits as f64 * 100.0 / progress.total_splits as f64);

    StatementStats {
        nodes: progress.nodes,
        total_splits: progress.total_splits,
        completed_splits: progress.completed_splits,
        processed_rows: progress.processed_rows,
        processed_bytes: progress.processed_bytes,
        elapsed_time_millis: elapsed,
        progress_percentage,
        ..StatementStats::for_state(inner.state)
    }
}

impl QueryLifecycle for QueryStateMachine {
    fn query_id(&self) -> &QueryId {
        &self.query_id
    }

    fn snapshot(&self) -> QuerySnapshot {
        let inner = self.inner();
        QuerySnapshot {
            query_id: self.query_id.clone(),
            state: inner.state,
            has_output_stage: inner.has_output_stage,
            update_type: inner.update_type.clone(),
            failure: inner.failure.clone(),
            stats: build_stats(&inner),
            warnings: inner.warnings.clone(),
            session: inner.session.clone(),
            last_heartbeat: inner.last_heartbeat,
        }
    }

    fn output_info(&self) -> Option<QueryOutputInfo> {
        self.inner().output.clone()
    }

    fn events(&self) -> EventBus {
        self.events.clone()
    }

    fn state_changes(&self) -> watch::Receiver<QueryState> {
        self.state_tx.subscribe()
    }

    fn record_heartbeat(&self) {
        self.inner().last_heartbeat = Utc::now();
    }

    fn fail(&self, error: QueryError) {
        debug!(query_id = %self.query_id, error = %error, "Fail requested");
        self.transition_to_done(QueryState::Failed, Some(error));
    }

    fn cancel(&self) {
        self.fail(QueryError::user_canceled());
    }

    fn cancel_stage(&self, stage: StageId) {
        let mut inner = self.inner();
        if inner.state.is_done() {
            return;
        }
        if inner.canceled_stages.insert(stage) {
            info!(query_id = %self.query_id, stage = %stage, "Stage canceled");
        }
    }
}
