#![allow(dead_code)]

use crate::{PAGE_BYTES, TestQuery};
use engine_processing::{cursor::ResultCursor, error::CursorError};
use model::{
    core::value::Value,
    records::{
        batch::ResultBatch,
        page::{Page, SerializedPage},
    },
};
use std::{sync::Arc, time::Duration};

pub const ROWS_PER_PAGE: usize = 10;

/// Ten-character key of row `id`, so every row weighs ten logical bytes.
pub fn row_key(id: usize) -> String {
    format!("r{id:09}")
}

/// A page of [`ROWS_PER_PAGE`] single-column text rows weighing
/// [`PAGE_BYTES`] logical bytes. Row ids start at `page * ROWS_PER_PAGE`.
pub fn text_page(page: usize) -> Page {
    let first = page * ROWS_PER_PAGE;
    let rows = (first..first + ROWS_PER_PAGE)
        .map(|id| vec![Value::String(row_key(id))])
        .collect();
    let page = Page::from_rows(rows);
    debug_assert_eq!(page.logical_size_bytes(), PAGE_BYTES);
    page
}

/// Like [`text_page`], but row `bad_row` carries an integer where the
/// column expects text.
pub fn corrupt_text_page(page: usize, bad_row: usize) -> Page {
    let mut page = text_page(page);
    page.blocks[0].values[bad_row] = Value::Int(bad_row as i64);
    page
}

pub fn encode(page: &Page) -> SerializedPage {
    SerializedPage::encode(page).expect("encode page")
}

/// Enqueues text pages `pages` into location `location` of `query`.
pub fn enqueue_pages(query: &TestQuery, location: usize, pages: impl IntoIterator<Item = usize>) {
    for page in pages {
        query
            .exchange
            .enqueue(query.location(location), encode(&text_page(page)))
            .expect("enqueue page");
    }
}

/// Row keys of a batch, in order.
pub fn keys(batch: &ResultBatch) -> Vec<String> {
    batch
        .rows()
        .iter()
        .filter_map(|row| row.first().and_then(|v| v.as_str()).map(str::to_string))
        .collect()
}

/// Polls from token 0 until a batch without a next token arrives.
pub async fn poll_until_terminal(
    cursor: &ResultCursor,
    wait: Duration,
    target_bytes: u64,
) -> Result<Vec<Arc<ResultBatch>>, CursorError> {
    let mut batches = Vec::new();
    let mut token = 0;

    loop {
        let batch = cursor.get_result(token, wait, target_bytes).await?;
        let next = batch.next_token;
        batches.push(batch);

        match next {
            Some(next) => token = next,
            None => return Ok(batches),
        }
        assert!(batches.len() < 10_000, "result stream did not terminate");
    }
}
