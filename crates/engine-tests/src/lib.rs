#![allow(dead_code)]

use engine_core::{
    exchange::client::ExchangeClient,
    lifecycle::state_machine::QueryStateMachine,
};
use engine_processing::cursor::ResultCursor;
use model::{
    core::{
        data_type::DataType,
        identifiers::{Location, QueryId},
    },
    query::state::QueryState,
};
use std::{sync::Arc, time::Duration};

pub mod integration;
pub mod utils;

/// Wait used by polls that expect data to be buffered already.
pub const SHORT_WAIT: Duration = Duration::from_millis(100);

/// Logical size of a page built by [`utils::text_page`].
pub const PAGE_BYTES: u64 = 100;

/// A query wired to a cursor the way the runtime wires it.
pub struct TestQuery {
    pub lifecycle: Arc<QueryStateMachine>,
    pub exchange: Arc<ExchangeClient>,
    pub cursor: Arc<ResultCursor>,
    pub locations: Vec<Location>,
}

impl TestQuery {
    /// A running query with one `varchar` output column spread over
    /// `locations` output buffers. Output info is published before the
    /// cursor exists, so it is applied on creation.
    pub fn running(id: &str, locations: usize) -> Self {
        let query_id = QueryId::from(id);
        let lifecycle = Arc::new(QueryStateMachine::new(query_id.clone(), true));
        let exchange = Arc::new(ExchangeClient::new(query_id));
        let locations: Vec<Location> = (0..locations)
            .map(|i| Location::new(format!("{id}.1.{i}")))
            .collect();

        lifecycle.advance(QueryState::Running);
        lifecycle.set_output_info(
            vec!["name".into()],
            vec![DataType::VarChar],
            locations.clone(),
            true,
        );
        let cursor = ResultCursor::create(lifecycle.clone(), exchange.clone());

        Self {
            lifecycle,
            exchange,
            cursor,
            locations,
        }
    }

    /// A query without an output stage, such as a DDL statement.
    pub fn without_output(id: &str) -> Self {
        let query_id = QueryId::from(id);
        let lifecycle = Arc::new(QueryStateMachine::new(query_id.clone(), false));
        let exchange = Arc::new(ExchangeClient::new(query_id));
        let cursor = ResultCursor::create(lifecycle.clone(), exchange.clone());

        Self {
            lifecycle,
            exchange,
            cursor,
            locations: Vec::new(),
        }
    }

    pub fn location(&self, index: usize) -> &Location {
        &self.locations[index]
    }

    /// Marks every location as drained and the query as finished.
    pub fn finish(&self) {
        for location in &self.locations {
            self.exchange.finish_location(location);
        }
        self.lifecycle.advance(QueryState::Finishing);
        self.lifecycle.finish();
    }
}
