use crate::cursor::state::CursorState;
use engine_core::{
    event_bus::bus::{EventBus, Subscription},
    exchange::PageSource,
    lifecycle::QueryLifecycle,
};
use model::{
    core::{data_type::DataType, identifiers::Location},
    events::QueryEvent,
    query::{
        error::{QueryError, StandardErrorCode},
        snapshot::QuerySnapshot,
    },
    records::column::columns_from,
};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// True when the page source can never receive another page.
pub(crate) fn source_is_finished(snapshot: &QuerySnapshot) -> bool {
    snapshot.state.is_failed() || (snapshot.state.is_done() && !snapshot.has_output_stage)
}

/// Shared handles the cursor hands to its event listener.
pub(crate) struct ListenerContext {
    pub lifecycle: Arc<dyn QueryLifecycle>,
    pub source: Arc<dyn PageSource>,
    pub state: Arc<Mutex<CursorState>>,
}

impl ListenerContext {
    /// Fixes the schema on first sight, then exposes the new locations.
    /// Locations are never added while the schema is unknown, so no page
    /// can be drained before it.
    pub(crate) fn apply_output(
        state: &mut CursorState,
        lifecycle: &dyn QueryLifecycle,
        source: &dyn PageSource,
        columns: &[String],
        types: &[DataType],
        new_locations: &[Location],
        no_more_locations: bool,
    ) {
        if state.columns.is_none() {
            match columns_from(columns, types) {
                Some(schema) => {
                    debug!(query_id = %lifecycle.query_id(), columns = schema.len(), "Output schema fixed");
                    state.set_columns(schema);
                }
                None => {
                    error!(
                        query_id = %lifecycle.query_id(),
                        names = columns.len(),
                        types = types.len(),
                        "Output column names and types disagree"
                    );
                    lifecycle.fail(QueryError::new(
                        StandardErrorCode::GenericInternalError,
                        format!(
                            "Output schema has {} column names but {} types",
                            columns.len(),
                            types.len()
                        ),
                    ));
                    return;
                }
            }
        }

        for location in new_locations {
            source.add_location(location.clone());
        }
        if no_more_locations {
            source.no_more_locations();
        }
    }

    pub(crate) fn apply_state_done(lifecycle: &dyn QueryLifecycle, source: &dyn PageSource) {
        let snapshot = lifecycle.snapshot();
        if source_is_finished(&snapshot) {
            debug!(query_id = %snapshot.query_id, state = %snapshot.state, "Closing page source");
            source.close();
        }
    }

    /// Brings a freshly created cursor up to date with notifications that
    /// were published before it subscribed.
    pub(crate) fn replay(
        state: &mut CursorState,
        lifecycle: &dyn QueryLifecycle,
        source: &dyn PageSource,
    ) {
        if let Some(info) = lifecycle.output_info() {
            Self::apply_output(
                state,
                lifecycle,
                source,
                &info.columns,
                &info.types,
                &info.locations,
                info.no_more_locations,
            );
        }
        if lifecycle.snapshot().state.is_done() {
            Self::apply_state_done(lifecycle, source);
        }
    }

    async fn handle(&self, event: &QueryEvent) -> bool {
        let mut state = self.state.lock().await;
        match event {
            QueryEvent::OutputLocationsChanged(changed) => {
                Self::apply_output(
                    &mut state,
                    &*self.lifecycle,
                    &*self.source,
                    &changed.columns,
                    &changed.types,
                    &changed.new_locations,
                    changed.no_more_locations,
                );
                false
            }
            QueryEvent::StateDone(done) => {
                info!(query_id = %done.query_id, state = %done.final_state, "Query done");
                Self::apply_state_done(&*self.lifecycle, &*self.source);
                true
            }
        }
    }
}

/// Applies lifecycle events to the cursor until the query is done or the
/// cursor is disposed.
pub(crate) fn spawn_listener(
    ctx: ListenerContext,
    events: EventBus,
    subscription: Subscription,
    mut rx: mpsc::UnboundedReceiver<Arc<QueryEvent>>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = rx.recv() => match event {
                    Some(event) => {
                        if ctx.handle(&event).await {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        events.unsubscribe(subscription);
        debug!(query_id = %ctx.lifecycle.query_id(), "Event listener stopped");
    })
}
