use crate::{
    error::RuntimeError,
    execution::{settings::SimulationSettings, workers::SimulatedQuery},
    manager::QueryManager,
};
use model::{
    core::identifiers::QueryId,
    query::{error::QueryError, state::QueryState},
    records::batch::ResultBatch,
};
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Totals observed by a client that polled a query to its terminal batch.
#[derive(Debug, Clone, Default)]
pub struct StreamSummary {
    pub batches: usize,
    pub rows: usize,
    pub final_state: Option<QueryState>,
    pub error: Option<QueryError>,
    pub update_count: Option<u64>,
}

/// Per-poll parameters a client sends with every token. Missing values use
/// the manager's configured defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct PollOptions {
    pub max_wait: Option<Duration>,
    pub target_bytes: Option<u64>,
}

/// Polls `query_id` from token 0 until a batch without a next token
/// arrives, handing every batch to `on_batch`.
pub async fn stream_results<F>(
    manager: &QueryManager,
    query_id: &QueryId,
    options: PollOptions,
    mut on_batch: F,
) -> Result<StreamSummary, RuntimeError>
where
    F: FnMut(&ResultBatch),
{
    let mut summary = StreamSummary::default();
    let mut token = 0;

    loop {
        let batch = manager
            .get_result(query_id, token, options.max_wait, options.target_bytes)
            .await?;
        on_batch(&batch);

        summary.batches += 1;
        summary.rows += batch.row_count();
        summary.final_state = Some(batch.stats.state);
        if batch.error.is_some() {
            summary.error = batch.error.clone();
        }
        if batch.update_count.is_some() {
            summary.update_count = batch.update_count;
        }

        match batch.next_token {
            Some(next) => token = next,
            None => break,
        }
    }

    info!(
        query_id = %query_id,
        batches = summary.batches,
        rows = summary.rows,
        state = ?summary.final_state,
        "Result stream complete"
    );
    Ok(summary)
}

/// Runs a simulated query end to end: registers it, starts its workers,
/// streams its results, and disposes it. Cancelling `cancel` cancels the
/// query through the protocol.
pub async fn run_simulation<F>(
    manager: Arc<QueryManager>,
    query_id: QueryId,
    settings: SimulationSettings,
    options: PollOptions,
    cancel: CancellationToken,
    on_batch: F,
) -> Result<StreamSummary, RuntimeError>
where
    F: FnMut(&ResultBatch),
{
    let query = SimulatedQuery::new(query_id.clone(), settings);
    manager
        .register(query.lifecycle(), query.exchange())
        .await?;
    let workers = query.start(cancel.child_token());

    let canceller = {
        let manager = manager.clone();
        let query_id = query_id.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
            if let Err(err) = manager.cancel(&query_id).await {
                warn!(query_id = %query_id, error = %err, "Cancel failed");
            }
        })
    };

    let result = stream_results(&manager, &query_id, options, on_batch).await;
    canceller.abort();

    if let Err(err) = manager.dispose(&query_id).await {
        warn!(query_id = %query_id, error = %err, "Query already removed");
    }
    workers.await?;

    result
}
