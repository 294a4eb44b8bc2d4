use crate::error::CursorError;
use model::{query::error::QueryError, records::{batch::ResultBatch, column::Column}};
use std::sync::Arc;

pub(crate) enum TokenCheck {
    Replay(Arc<ResultBatch>),
    Advance,
}

/// Pagination state of one cursor. Only touched under the cursor mutex.
#[derive(Debug)]
pub(crate) struct CursorState {
    /// Last served token and its batch, kept for idempotent replay.
    pub last_served: Option<(u64, Arc<ResultBatch>)>,
    /// `None` once the terminal batch has been served.
    pub next_token: Option<u64>,
    pub columns: Option<Vec<Column>>,
    pub update_count: Option<u64>,
    pub first_fault: Option<QueryError>,
    pub synthesized_result: bool,
}

impl CursorState {
    pub fn new() -> Self {
        Self {
            last_served: None,
            next_token: Some(0),
            columns: None,
            update_count: None,
            first_fault: None,
            synthesized_result: false,
        }
    }

    pub fn check_token(&self, token: u64) -> Result<TokenCheck, CursorError> {
        if let Some((last, batch)) = &self.last_served {
            if token == *last {
                return Ok(TokenCheck::Replay(batch.clone()));
            }
            if token < *last {
                return Err(CursorError::ResultGone { token, last: *last });
            }
        }

        match self.next_token {
            Some(next) if next == token => Ok(TokenCheck::Advance),
            _ => Err(CursorError::ResultNotFound { token }),
        }
    }

    pub fn record_served(&mut self, token: u64, batch: Arc<ResultBatch>) {
        self.next_token = batch.next_token;
        self.last_served = Some((token, batch));
    }

    pub fn set_columns(&mut self, columns: Vec<Column>) -> bool {
        if self.columns.is_some() {
            return false;
        }
        self.columns = Some(columns);
        true
    }

    pub fn last_served_token(&self) -> Option<u64> {
        self.last_served.as_ref().map(|(token, _)| *token)
    }
}
