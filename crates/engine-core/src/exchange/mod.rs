use crate::error::ExchangeError;
use async_trait::async_trait;
use model::{core::identifiers::Location, records::page::SerializedPage};

pub mod client;

/// Supplies serialized pages of query output as remote buffers produce them.
///
/// Implementations are shared between the producing side (remote tasks)
/// and exactly one consuming result cursor.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Removes the next available page. `Ok(None)` means nothing is
    /// buffered right now, not that the source is finished.
    fn poll_page(&self) -> Result<Option<SerializedPage>, ExchangeError>;

    /// Resolves once a page is buffered, the source becomes closed, or it
    /// fails. Dropping the future has no effect on the source.
    async fn wait_for_data(&self);

    /// True once closed explicitly, or once every location has been
    /// announced, finished, and drained.
    fn is_closed(&self) -> bool;

    /// Discards buffered pages and stops accepting new ones. Idempotent.
    fn close(&self);

    fn add_location(&self, location: Location);

    fn no_more_locations(&self);
}
