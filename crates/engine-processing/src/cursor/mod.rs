use crate::{
    assembler::BatchAssembler,
    cursor::state::{CursorState, TokenCheck},
    error::{CursorError, FaultSink},
    listener::{ListenerContext, source_is_finished, spawn_listener},
    waiter::CompletionWaiter,
};
use chrono::Utc;
use engine_core::{
    exchange::PageSource,
    lifecycle::QueryLifecycle,
    metrics::{Metrics, MetricsSnapshot},
};
use model::{
    core::identifiers::{QueryId, StageId},
    query::{
        error::{QueryError, StandardErrorCode},
        snapshot::QuerySnapshot,
    },
    records::batch::{ResultBatch, manifest_for},
};
use std::{sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub mod state;

const SYNTHETIC_COLUMN: &str = "result";

/// Remembers the first fault of the cursor's lifetime and fails the query
/// for every fault.
struct FaultCollector<'a> {
    first: &'a mut Option<QueryError>,
    lifecycle: &'a dyn QueryLifecycle,
    metrics: &'a Metrics,
}

impl FaultSink for FaultCollector<'_> {
    fn report(&mut self, fault: QueryError) {
        self.metrics.increment_decode_failures(1);
        warn!(query_id = %self.lifecycle.query_id(), error = %fault, "Fault while draining results");
        self.lifecycle.fail(fault.clone());
        if self.first.is_none() {
            *self.first = Some(fault);
        }
    }
}

/// Serves the result stream of one query as a sequence of token-addressed
/// batches.
///
/// All state transitions happen under one mutex. The only suspension point
/// is the bounded wait for new data, which runs without holding it.
pub struct ResultCursor {
    query_id: QueryId,
    lifecycle: Arc<dyn QueryLifecycle>,
    source: Arc<dyn PageSource>,
    state: Arc<Mutex<CursorState>>,
    waiter: CompletionWaiter,
    metrics: Metrics,
    shutdown: CancellationToken,
}

impl ResultCursor {
    /// Creates the cursor and starts listening for lifecycle events. Output
    /// info and a terminal state published earlier are applied right away.
    pub fn create(lifecycle: Arc<dyn QueryLifecycle>, source: Arc<dyn PageSource>) -> Arc<Self> {
        let query_id = lifecycle.query_id().clone();
        let events = lifecycle.events();
        let (subscription, rx) = events.subscribe();

        let mut initial = CursorState::new();
        ListenerContext::replay(&mut initial, &*lifecycle, &*source);
        let state = Arc::new(Mutex::new(initial));

        let shutdown = CancellationToken::new();
        spawn_listener(
            ListenerContext {
                lifecycle: lifecycle.clone(),
                source: source.clone(),
                state: state.clone(),
            },
            events,
            subscription,
            rx,
            shutdown.clone(),
        );

        info!(query_id = %query_id, "Result cursor created");
        Arc::new(Self {
            query_id,
            waiter: CompletionWaiter::new(source.clone(), lifecycle.clone()),
            lifecycle,
            source,
            state,
            metrics: Metrics::new(),
            shutdown,
        })
    }

    pub fn query_id(&self) -> &QueryId {
        &self.query_id
    }

    /// Returns the batch for `token`, waiting up to `max_wait` for new data
    /// when `token` is the next one to serve.
    pub async fn get_result(
        &self,
        token: u64,
        max_wait: Duration,
        target_bytes: u64,
    ) -> Result<Arc<ResultBatch>, CursorError> {
        self.lifecycle.record_heartbeat();

        {
            let state = self.state.lock().await;
            if let TokenCheck::Replay(batch) = state.check_token(token)? {
                return Ok(self.replayed(batch));
            }
        }

        let outcome = self.waiter.wait(max_wait).await;
        debug!(query_id = %self.query_id, token, ?outcome, "Woke up to serve token");

        let mut state = self.state.lock().await;
        // Another caller may have served this token while we were waiting.
        if let TokenCheck::Replay(batch) = state.check_token(token)? {
            return Ok(self.replayed(batch));
        }

        let batch = Arc::new(self.next_batch(&mut state, token, target_bytes));
        state.record_served(token, batch.clone());
        Ok(batch)
    }

    fn replayed(&self, batch: Arc<ResultBatch>) -> Arc<ResultBatch> {
        self.metrics.increment_replays(1);
        debug!(query_id = %self.query_id, token = batch.token, "Replaying last batch");
        batch
    }

    fn next_batch(&self, state: &mut CursorState, token: u64, target_bytes: u64) -> ResultBatch {
        let snapshot = self.lifecycle.snapshot();

        let assembler = if snapshot.state.is_done()
            && !snapshot.state.is_failed()
            && !snapshot.has_output_stage
            && !state.synthesized_result
        {
            state.synthesized_result = true;
            let assembler = BatchAssembler::single_boolean(SYNTHETIC_COLUMN, true);
            if let Some(columns) = assembler.columns() {
                state.set_columns(columns.to_vec());
            }
            assembler
        } else {
            self.drain(state, target_bytes)
        };

        if snapshot.update_type.is_some() && state.update_count.is_none() {
            state.update_count = assembler.update_count();
        }

        if source_is_finished(&snapshot) {
            self.source.close();
        }

        let next_token = (!snapshot.state.is_done() || !self.source.is_closed()).then_some(token + 1);
        let error = batch_error(&snapshot, state.first_fault.as_ref());

        let rows = assembler.into_rows();
        let manifest = manifest_for(&rows);
        let data = (state.update_count.is_none() && !rows.is_empty()).then_some(rows);

        self.metrics.increment_batches(1);
        self.metrics.increment_rows(manifest.row_count as u64);

        debug!(
            query_id = %self.query_id,
            token,
            rows = manifest.row_count,
            state = %snapshot.state,
            next_token = ?next_token,
            "Serving result batch"
        );

        ResultBatch {
            id: make_batch_id(&self.query_id, token),
            query_id: self.query_id.clone(),
            token,
            columns: state.columns.clone(),
            data,
            stats: snapshot.stats,
            error,
            warnings: snapshot.warnings,
            session: snapshot.session,
            update_type: snapshot.update_type,
            update_count: state.update_count,
            next_token,
            manifest,
            ts: Utc::now(),
        }
    }

    /// Moves pages from the source into an assembler until the byte target
    /// is reached or nothing is buffered. A page that cannot be read ends
    /// the drain; a row that cannot be converted only drops that row.
    fn drain(&self, state: &mut CursorState, target_bytes: u64) -> BatchAssembler {
        let mut assembler = match &state.columns {
            Some(columns) => BatchAssembler::with_schema(columns.clone()),
            None => BatchAssembler::new(),
        };
        let mut faults = FaultCollector {
            first: &mut state.first_fault,
            lifecycle: &*self.lifecycle,
            metrics: &self.metrics,
        };

        let budget = target_bytes.max(1);
        let mut bytes = 0u64;
        let mut pages = 0u64;

        while bytes < budget {
            let serialized = match self.source.poll_page() {
                Ok(Some(page)) => page,
                Ok(None) => break,
                Err(err) => {
                    faults.report(QueryError::from_error(StandardErrorCode::PageTransportError, &err));
                    break;
                }
            };
            pages += 1;

            let page = match serialized.decode() {
                Ok(page) => page,
                Err(err) => {
                    faults.report(QueryError::from_error(StandardErrorCode::SerializationError, &err));
                    break;
                }
            };
            bytes += page.logical_size_bytes();

            if let Err(err) = assembler.add_page(&page, &mut faults) {
                faults.report(QueryError::from_error(StandardErrorCode::GenericInternalError, &err));
                break;
            }
        }

        self.metrics.increment_pages(pages);
        self.metrics.increment_bytes(bytes);
        assembler
    }

    /// Closes the page source and cancels the query.
    pub fn cancel(&self) {
        info!(query_id = %self.query_id, "Canceling query");
        self.source.close();
        self.lifecycle.cancel();
    }

    pub fn partial_cancel(&self, stage: StageId) {
        self.lifecycle.cancel_stage(stage);
    }

    /// Releases the page source and stops the event listener. Idempotent.
    pub fn dispose(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        self.source.close();
        info!(query_id = %self.query_id, metrics = ?self.metrics.snapshot(), "Result cursor disposed");
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Token of the last served batch, if any.
    pub async fn last_served_token(&self) -> Option<u64> {
        self.state.lock().await.last_served_token()
    }
}

fn batch_error(snapshot: &QuerySnapshot, first_fault: Option<&QueryError>) -> Option<QueryError> {
    if snapshot.state.is_failed() {
        return Some(
            snapshot
                .failure
                .clone()
                .unwrap_or_else(|| QueryError::unknown_failure(snapshot.state)),
        );
    }
    first_fault.cloned()
}

fn make_batch_id(query_id: &QueryId, token: u64) -> String {
    let mut h = blake3::Hasher::new();
    h.update(query_id.as_str().as_bytes());
    h.update(&token.to_le_bytes());
    h.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::{exchange::client::ExchangeClient, lifecycle::state_machine::QueryStateMachine};
    use model::{
        core::{
            data_type::DataType,
            identifiers::Location,
            value::Value,
        },
        query::state::QueryState,
        records::page::{Page, SerializedPage},
    };
    use tracing_test::traced_test;

    const WAIT: Duration = Duration::from_millis(50);

    struct Harness {
        lifecycle: Arc<QueryStateMachine>,
        exchange: Arc<ExchangeClient>,
        cursor: Arc<ResultCursor>,
    }

    fn harness(has_output_stage: bool) -> Harness {
        let query_id = QueryId::from("q1");
        let lifecycle = Arc::new(QueryStateMachine::new(query_id.clone(), has_output_stage));
        let exchange = Arc::new(ExchangeClient::new(query_id));
        let cursor = ResultCursor::create(lifecycle.clone(), exchange.clone());
        Harness {
            lifecycle,
            exchange,
            cursor,
        }
    }

    fn int_page(values: &[i64]) -> SerializedPage {
        let rows = values.iter().map(|v| vec![Value::Int(*v)]).collect();
        SerializedPage::encode(&Page::from_rows(rows)).unwrap()
    }

    async fn announce(h: &Harness, types: Vec<DataType>, locations: &[&str]) {
        let names = (0..types.len()).map(|i| format!("c{i}")).collect();
        h.lifecycle.set_output_info(
            names,
            types,
            locations.iter().map(|l| Location::from(*l)).collect(),
            true,
        );
        // Let the listener apply the event.
        for _ in 0..50 {
            if h.exchange.location_count() == locations.len() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    #[tokio::test]
    async fn ddl_statement_yields_single_true_row() {
        let h = harness(false);
        h.lifecycle.finish();

        let batch = h.cursor.get_result(0, WAIT, 1024).await.unwrap();
        assert_eq!(batch.rows(), &[vec![serde_json::Value::Bool(true)]]);
        assert_eq!(batch.columns.as_ref().unwrap()[0].name, "result");
        assert_eq!(batch.next_token, None);
    }

    #[tokio::test]
    async fn replay_returns_same_batch() {
        let h = harness(true);
        h.lifecycle.advance(QueryState::Running);
        announce(&h, vec![DataType::BigInt], &["t0"]).await;
        h.exchange.enqueue(&Location::from("t0"), int_page(&[1, 2])).unwrap();

        let first = h.cursor.get_result(0, WAIT, 1024).await.unwrap();
        let again = h.cursor.get_result(0, WAIT, 1024).await.unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(h.cursor.metrics().replays, 1);
        assert_eq!(first.next_token, Some(1));
    }

    #[tokio::test]
    async fn rejects_stale_and_future_tokens() {
        let h = harness(true);
        h.lifecycle.advance(QueryState::Running);

        h.cursor.get_result(0, Duration::ZERO, 1024).await.unwrap();
        h.cursor.get_result(1, Duration::ZERO, 1024).await.unwrap();

        assert_eq!(
            h.cursor.get_result(0, WAIT, 1024).await.unwrap_err(),
            CursorError::ResultGone { token: 0, last: 1 }
        );
        assert_eq!(
            h.cursor.get_result(5, WAIT, 1024).await.unwrap_err(),
            CursorError::ResultNotFound { token: 5 }
        );
    }

    #[tokio::test]
    async fn timeout_returns_empty_non_terminal_batch() {
        let h = harness(true);
        h.lifecycle.advance(QueryState::Running);

        let batch = h.cursor.get_result(0, Duration::from_millis(10), 1024).await.unwrap();
        assert!(batch.is_empty());
        assert_eq!(batch.next_token, Some(1));
        assert!(batch.error.is_none());
    }

    #[tokio::test]
    async fn terminal_batch_rejects_further_tokens() {
        let h = harness(true);
        announce(&h, vec![DataType::BigInt], &["t0"]).await;
        let loc = Location::from("t0");
        h.exchange.enqueue(&loc, int_page(&[7])).unwrap();
        h.exchange.finish_location(&loc);
        h.lifecycle.finish();

        let batch = h.cursor.get_result(0, WAIT, 1024).await.unwrap();
        assert_eq!(batch.row_count(), 1);
        assert_eq!(batch.next_token, None);
        assert_eq!(
            h.cursor.get_result(1, WAIT, 1024).await.unwrap_err(),
            CursorError::ResultNotFound { token: 1 }
        );
    }

    #[tokio::test]
    async fn update_count_replaces_rows() {
        let h = harness(true);
        h.lifecycle.set_update_type("INSERT");
        announce(&h, vec![DataType::BigInt], &["t0"]).await;
        let loc = Location::from("t0");
        h.exchange.enqueue(&loc, int_page(&[3])).unwrap();
        h.exchange.finish_location(&loc);
        h.lifecycle.finish();

        let batch = h.cursor.get_result(0, WAIT, 1024).await.unwrap();
        assert_eq!(batch.update_count, Some(3));
        assert_eq!(batch.update_type.as_deref(), Some("INSERT"));
        assert!(batch.data.is_none());
    }

    #[tokio::test]
    async fn row_faults_do_not_stop_the_drain() {
        let h = harness(true);
        h.lifecycle.advance(QueryState::Running);
        announce(&h, vec![DataType::BigInt], &["t0"]).await;
        let loc = Location::from("t0");
        for page in 0..5i64 {
            let mut rows: Vec<Vec<Value>> = (0..10).map(|i| vec![Value::Int(page * 10 + i)]).collect();
            match page {
                2 => rows[0][0] = Value::String("bad".into()),
                4 => rows[3][0] = Value::String("bad".into()),
                _ => {}
            }
            let page = SerializedPage::encode(&Page::from_rows(rows)).unwrap();
            h.exchange.enqueue(&loc, page).unwrap();
        }
        h.exchange.finish_location(&loc);

        let first = h.cursor.get_result(0, WAIT, 1 << 20).await.unwrap();
        let ids: Vec<i64> = first.rows().iter().filter_map(|row| row[0].as_i64()).collect();
        let expected: Vec<i64> = (0..50).filter(|id| *id != 20 && *id != 43).collect();
        assert_eq!(ids, expected);
        assert!(first.error.as_ref().unwrap().is(StandardErrorCode::SerializationError));
        assert_eq!(h.cursor.metrics().decode_failures, 2);
        assert_eq!(h.lifecycle.state(), QueryState::Failed);

        let terminal = h.cursor.get_result(1, WAIT, 1 << 20).await.unwrap();
        assert!(terminal.is_empty());
        assert_eq!(terminal.next_token, None);
        assert!(terminal.error.as_ref().unwrap().is(StandardErrorCode::SerializationError));
    }

    #[traced_test]
    #[tokio::test]
    async fn cancel_closes_source_and_fails_query() {
        let h = harness(true);
        h.lifecycle.advance(QueryState::Running);
        h.cursor.cancel();

        assert!(h.exchange.is_closed());
        let batch = h.cursor.get_result(0, WAIT, 1024).await.unwrap();
        let error = batch.error.as_ref().unwrap();
        assert!(error.is(StandardErrorCode::UserCanceled));
        assert_eq!(batch.next_token, None);
        assert!(logs_contain("Canceling query"));
    }

    #[tokio::test]
    async fn dispose_is_idempotent() {
        let h = harness(true);
        h.cursor.dispose();
        h.cursor.dispose();
        assert!(h.exchange.is_closed());
    }

    #[tokio::test]
    async fn cursor_created_late_replays_output_info() {
        let query_id = QueryId::from("late");
        let lifecycle = Arc::new(QueryStateMachine::new(query_id.clone(), true));
        let exchange = Arc::new(ExchangeClient::new(query_id));
        let loc = Location::from("t0");
        lifecycle.set_output_info(vec!["v".into()], vec![DataType::BigInt], vec![loc.clone()], true);
        exchange.enqueue(&loc, int_page(&[1, 2, 3])).unwrap();
        exchange.finish_location(&loc);
        lifecycle.finish();

        let cursor = ResultCursor::create(lifecycle, exchange);
        let batch = cursor.get_result(0, WAIT, 1024).await.unwrap();
        assert_eq!(batch.row_count(), 3);
        assert_eq!(batch.next_token, None);
    }

    #[test]
    fn batch_ids_differ_per_token() {
        let id = QueryId::from("q1");
        assert_ne!(make_batch_id(&id, 0), make_batch_id(&id, 1));
        assert_eq!(make_batch_id(&id, 3), make_batch_id(&id, 3));
    }
}
