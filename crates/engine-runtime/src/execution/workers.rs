use crate::execution::settings::{SimulationSettings, StatementKind};
use engine_core::{
    exchange::client::ExchangeClient,
    lifecycle::{QueryLifecycle, state_machine::QueryStateMachine},
};
use futures::future::join_all;
use model::{
    core::{
        data_type::DataType,
        identifiers::{Location, QueryId, StageId},
        value::Value,
    },
    query::{
        error::{QueryError, StandardErrorCode},
        state::QueryState,
    },
    records::page::{Page, SerializedPage},
};
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Output schema of simulated SELECT statements.
pub fn select_schema() -> (Vec<String>, Vec<DataType>) {
    (
        vec!["id".into(), "name".into(), "score".into()],
        vec![DataType::BigInt, DataType::VarChar, DataType::Double],
    )
}

/// Rows of one simulated page. Ids are global, so every row of a query is
/// distinct.
pub fn build_page(global_page: usize, rows: usize, corrupt: bool) -> Page {
    let first = global_page * rows;
    let rows = (first..first + rows)
        .map(|id| {
            let key = if corrupt && id == first {
                Value::String("corrupt".into())
            } else {
                Value::Int(id as i64)
            };
            vec![
                key,
                Value::String(format!("row-{id:06}")),
                Value::Float(id as f64 * 0.5),
            ]
        })
        .collect();
    Page::from_rows(rows)
}

/// A query whose execution is played by local tasks feeding an in-memory
/// exchange.
pub struct SimulatedQuery {
    lifecycle: Arc<QueryStateMachine>,
    exchange: Arc<ExchangeClient>,
    settings: SimulationSettings,
}

impl SimulatedQuery {
    pub fn new(query_id: QueryId, settings: SimulationSettings) -> Self {
        let has_output_stage = settings.statement != StatementKind::Ddl;
        Self {
            lifecycle: Arc::new(QueryStateMachine::new(query_id.clone(), has_output_stage)),
            exchange: Arc::new(ExchangeClient::new(query_id)),
            settings,
        }
    }

    pub fn lifecycle(&self) -> Arc<QueryStateMachine> {
        self.lifecycle.clone()
    }

    pub fn exchange(&self) -> Arc<ExchangeClient> {
        self.exchange.clone()
    }

    /// Drives the query to a terminal state on a background task.
    pub fn start(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let ctx = WorkerContext {
            lifecycle: self.lifecycle.clone(),
            exchange: self.exchange.clone(),
            settings: self.settings.clone(),
            cancel,
            completed_pages: Arc::new(AtomicU64::new(0)),
        };
        tokio::spawn(async move { ctx.run().await })
    }
}

#[derive(Clone)]
struct WorkerContext {
    lifecycle: Arc<QueryStateMachine>,
    exchange: Arc<ExchangeClient>,
    settings: SimulationSettings,
    cancel: CancellationToken,
    completed_pages: Arc<AtomicU64>,
}

impl WorkerContext {
    fn query_id(&self) -> &QueryId {
        self.lifecycle.query_id()
    }

    async fn run(self) {
        info!(query_id = %self.query_id(), statement = ?self.settings.statement, "Launching workers");
        self.lifecycle.advance(QueryState::Planning);
        self.lifecycle.advance(QueryState::Starting);

        match self.settings.statement {
            StatementKind::Ddl => {
                self.lifecycle.advance(QueryState::Running);
            }
            StatementKind::Update { rows } => {
                self.lifecycle.set_update_type("INSERT");
                let location = Location::new(format!("{}.0.0", self.query_id()));
                self.lifecycle.set_output_info(
                    vec!["rows".into()],
                    vec![DataType::BigInt],
                    vec![location.clone()],
                    true,
                );
                self.lifecycle.advance(QueryState::Running);

                let page = Page::from_rows(vec![vec![Value::Int(rows as i64)]]);
                if self.deliver(&location, &page) {
                    self.exchange.finish_location(&location);
                }
            }
            StatementKind::Select => {
                let locations: Vec<Location> = (0..self.settings.locations)
                    .map(|i| Location::new(format!("{}.1.{i}", self.query_id())))
                    .collect();
                let (columns, types) = select_schema();
                self.lifecycle
                    .set_output_info(columns, types, locations.clone(), true);
                self.lifecycle.advance(QueryState::Running);

                let tasks = locations.into_iter().enumerate().map(|(index, location)| {
                    let ctx = self.clone();
                    tokio::spawn(async move { ctx.produce(index, location).await })
                });
                for result in join_all(tasks).await {
                    if let Err(err) = result {
                        warn!(query_id = %self.query_id(), error = %err, "Worker task failed");
                    }
                }
            }
        }

        if self.cancel.is_cancelled() || self.lifecycle.state().is_done() {
            return;
        }
        self.lifecycle.advance(QueryState::Finishing);
        self.lifecycle.finish();
    }

    async fn produce(&self, index: usize, location: Location) {
        let stage = StageId(index as u32 + 1);
        let pages = self.settings.pages_per_location;

        for page_no in 0..pages {
            if self.cancel.is_cancelled() || self.lifecycle.state().is_done() {
                debug!(location = %location, "Query stopped, worker exiting");
                return;
            }
            if self.lifecycle.is_stage_canceled(stage) {
                info!(location = %location, stage = %stage, "Stage canceled, finishing location early");
                break;
            }

            let global = index * pages + page_no;
            let page = build_page(
                global,
                self.settings.rows_per_page,
                self.settings.corrupt_page == Some(global),
            );
            if !self.deliver(&location, &page) {
                return;
            }

            if self.settings.failing_location == Some(index) {
                self.exchange.fail_location(&location, "simulated worker crash");
                return;
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(self.settings.page_delay) => {}
            }
        }

        self.exchange.finish_location(&location);
    }

    /// Encodes and enqueues one page. Returns false when the page could not
    /// be delivered.
    fn deliver(&self, location: &Location, page: &Page) -> bool {
        let serialized = match SerializedPage::encode(page) {
            Ok(serialized) => serialized,
            Err(err) => {
                self.lifecycle.fail(QueryError::from_error(
                    StandardErrorCode::SerializationError,
                    &err,
                ));
                return false;
            }
        };

        if let Err(err) = self.exchange.enqueue(location, serialized) {
            debug!(location = %location, error = %err, "Page rejected by exchange");
            return false;
        }

        let completed = self.completed_pages.fetch_add(1, Ordering::Relaxed) + 1;
        self.lifecycle.record_progress(
            self.settings.locations as u32,
            self.settings.total_pages() as u64,
            completed,
            page.position_count() as u64,
            page.logical_size_bytes(),
        );
        true
    }
}
