use crate::{error::ExchangeError, exchange::PageSource};
use async_trait::async_trait;
use model::{
    core::identifiers::{Location, QueryId},
    records::page::SerializedPage,
};
use std::{
    collections::{BTreeMap, VecDeque},
    sync::{Mutex, MutexGuard, PoisonError},
};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct LocationBuffer {
    /// Pages that arrived before the location was announced to the client.
    pending: VecDeque<SerializedPage>,
    added: bool,
    finished: bool,
}

#[derive(Debug, Default)]
struct ExchangeState {
    locations: BTreeMap<Location, LocationBuffer>,
    ready: VecDeque<SerializedPage>,
    buffered_bytes: usize,
    no_more_locations: bool,
    closed: bool,
    failure: Option<ExchangeError>,
}

impl ExchangeState {
    fn is_finished(&self) -> bool {
        self.no_more_locations
            && self.ready.is_empty()
            && self
                .locations
                .values()
                .filter(|buffer| buffer.added)
                .all(|buffer| buffer.finished && buffer.pending.is_empty())
    }

    fn is_closed(&self) -> bool {
        self.closed || self.is_finished()
    }

    fn has_news(&self) -> bool {
        !self.ready.is_empty() || self.failure.is_some() || self.is_closed()
    }
}

/// In-memory exchange: remote tasks push pages per output location, the
/// coordinator's result cursor pulls them in arrival order.
///
/// Only pages from locations the cursor has announced via
/// [`PageSource::add_location`] are visible to [`PageSource::poll_page`].
pub struct ExchangeClient {
    query_id: QueryId,
    state: Mutex<ExchangeState>,
    notify: Notify,
}

impl ExchangeClient {
    pub fn new(query_id: QueryId) -> Self {
        Self {
            query_id,
            state: Mutex::new(ExchangeState::default()),
            notify: Notify::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, ExchangeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Delivers a page produced at `location`.
    pub fn enqueue(&self, location: &Location, page: SerializedPage) -> Result<(), ExchangeError> {
        {
            let mut state = self.state();
            if state.closed {
                return Err(ExchangeError::Closed);
            }

            let known = state.locations.contains_key(location);
            if !known && state.no_more_locations {
                return Err(ExchangeError::UnknownLocation(location.clone()));
            }

            let buffer = state.locations.entry(location.clone()).or_default();
            if buffer.finished {
                warn!(query_id = %self.query_id, location = %location, "Page arrived after location finished");
            }

            if buffer.added {
                state.buffered_bytes += page.size_bytes();
                state.ready.push_back(page);
            } else {
                buffer.pending.push_back(page);
            }
        }

        self.notify.notify_waiters();
        Ok(())
    }

    /// Marks `location` as having produced its last page.
    pub fn finish_location(&self, location: &Location) {
        {
            let mut state = self.state();
            state.locations.entry(location.clone()).or_default().finished = true;
        }
        debug!(query_id = %self.query_id, location = %location, "Location finished");
        self.notify.notify_waiters();
    }

    /// Records a transport failure; subsequent polls report it until the
    /// exchange is closed.
    pub fn fail_location(&self, location: &Location, message: impl Into<String>) {
        let message = message.into();
        {
            let mut state = self.state();
            if state.closed || state.failure.is_some() {
                return;
            }
            state.failure = Some(ExchangeError::RemoteTaskFailed {
                location: location.clone(),
                message: message.clone(),
            });
        }
        warn!(query_id = %self.query_id, location = %location, error = %message, "Remote task failed");
        self.notify.notify_waiters();
    }

    pub fn buffered_bytes(&self) -> usize {
        self.state().buffered_bytes
    }

    pub fn buffered_pages(&self) -> usize {
        self.state().ready.len()
    }

    pub fn location_count(&self) -> usize {
        self.state()
            .locations
            .values()
            .filter(|buffer| buffer.added)
            .count()
    }
}

#[async_trait]
impl PageSource for ExchangeClient {
    fn poll_page(&self) -> Result<Option<SerializedPage>, ExchangeError> {
        let mut state = self.state();
        if state.closed {
            return Ok(None);
        }
        if let Some(failure) = &state.failure {
            return Err(failure.clone());
        }

        let page = state.ready.pop_front();
        if let Some(page) = &page {
            state.buffered_bytes = state.buffered_bytes.saturating_sub(page.size_bytes());
        }
        let finished = state.is_finished();
        drop(state);

        if finished {
            // Last page handed out: wake waiters so they observe the close.
            self.notify.notify_waiters();
        }
        Ok(page)
    }

    async fn wait_for_data(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if self.state().has_news() {
            return;
        }
        notified.await;
    }

    fn is_closed(&self) -> bool {
        self.state().is_closed()
    }

    fn close(&self) {
        {
            let mut state = self.state();
            if state.closed {
                return;
            }
            state.closed = true;
            state.ready.clear();
            state.buffered_bytes = 0;
            for buffer in state.locations.values_mut() {
                buffer.pending.clear();
            }
        }
        info!(query_id = %self.query_id, "Exchange closed");
        self.notify.notify_waiters();
    }

    fn add_location(&self, location: Location) {
        {
            let mut state = self.state();
            if state.closed {
                return;
            }

            let buffer = state.locations.entry(location.clone()).or_default();
            if buffer.added {
                return;
            }
            buffer.added = true;
            let pending: Vec<SerializedPage> = buffer.pending.drain(..).collect();

            for page in pending {
                state.buffered_bytes += page.size_bytes();
                state.ready.push_back(page);
            }
        }
        debug!(query_id = %self.query_id, location = %location, "Location added");
        self.notify.notify_waiters();
    }

    fn no_more_locations(&self) {
        {
            let mut state = self.state();
            if state.no_more_locations {
                return;
            }
            state.no_more_locations = true;
            // Locations never announced cannot contribute pages anymore.
            state.locations.retain(|_, buffer| buffer.added);
        }
        debug!(query_id = %self.query_id, "No more locations");
        self.notify.notify_waiters();
    }
}
