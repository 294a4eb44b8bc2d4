use engine_core::{exchange::PageSource, lifecycle::QueryLifecycle};
use std::{sync::Arc, time::Duration};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The page source has pages buffered, or just closed.
    DataReady,
    /// The page source is closed and the query reached a terminal state.
    QueryDone,
    /// Nothing new happened within the allowed wait.
    TimedOut,
}

/// Waits for something that can change the next result batch.
///
/// The waiter only observes the source and the query; dropping a pending
/// wait leaves both untouched.
#[derive(Clone)]
pub struct CompletionWaiter {
    source: Arc<dyn PageSource>,
    lifecycle: Arc<dyn QueryLifecycle>,
}

impl CompletionWaiter {
    pub fn new(source: Arc<dyn PageSource>, lifecycle: Arc<dyn QueryLifecycle>) -> Self {
        Self { source, lifecycle }
    }

    pub async fn wait(&self, max_wait: Duration) -> WaitOutcome {
        let outcome = tokio::select! {
            biased;
            outcome = self.ready() => outcome,
            _ = tokio::time::sleep(max_wait) => WaitOutcome::TimedOut,
        };
        trace!(query_id = %self.lifecycle.query_id(), ?outcome, "Wait completed");
        outcome
    }

    async fn ready(&self) -> WaitOutcome {
        if !self.source.is_closed() {
            self.source.wait_for_data().await;
            return WaitOutcome::DataReady;
        }

        // No more pages can arrive; only reaching a terminal state matters.
        let mut states = self.lifecycle.state_changes();
        loop {
            if states.borrow_and_update().is_done() {
                return WaitOutcome::QueryDone;
            }
            if states.changed().await.is_err() {
                return WaitOutcome::QueryDone;
            }
        }
    }
}
