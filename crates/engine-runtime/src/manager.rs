use crate::error::RuntimeError;
use chrono::Utc;
use engine_config::settings::ProtocolSettings;
use engine_core::{exchange::PageSource, lifecycle::QueryLifecycle};
use engine_processing::cursor::ResultCursor;
use model::{
    core::identifiers::{QueryId, StageId},
    query::error::QueryError,
    records::batch::ResultBatch,
};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Clone)]
struct ManagedQuery {
    lifecycle: Arc<dyn QueryLifecycle>,
    cursor: Arc<ResultCursor>,
}

/// Registry of queries whose results are being served to clients.
pub struct QueryManager {
    settings: ProtocolSettings,
    queries: RwLock<HashMap<QueryId, ManagedQuery>>,
}

impl QueryManager {
    pub fn new(settings: ProtocolSettings) -> Self {
        Self {
            settings,
            queries: RwLock::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &ProtocolSettings {
        &self.settings
    }

    /// Creates the result cursor for a query that has started executing.
    pub async fn register(
        &self,
        lifecycle: Arc<dyn QueryLifecycle>,
        source: Arc<dyn PageSource>,
    ) -> Result<Arc<ResultCursor>, RuntimeError> {
        let query_id = lifecycle.query_id().clone();
        let mut queries = self.queries.write().await;
        if queries.contains_key(&query_id) {
            return Err(RuntimeError::AlreadyRegistered(query_id));
        }

        let cursor = ResultCursor::create(lifecycle.clone(), source);
        queries.insert(
            query_id.clone(),
            ManagedQuery {
                lifecycle,
                cursor: cursor.clone(),
            },
        );
        info!(query_id = %query_id, "Query registered");
        Ok(cursor)
    }

    async fn query(&self, query_id: &QueryId) -> Result<ManagedQuery, RuntimeError> {
        self.queries
            .read()
            .await
            .get(query_id)
            .cloned()
            .ok_or_else(|| RuntimeError::QueryNotFound(query_id.clone()))
    }

    /// Serves `token` with the wait and byte target clamped to the
    /// configured limits. Missing values fall back to the defaults.
    pub async fn get_result(
        &self,
        query_id: &QueryId,
        token: u64,
        max_wait: Option<Duration>,
        target_bytes: Option<u64>,
    ) -> Result<Arc<ResultBatch>, RuntimeError> {
        let query = self.query(query_id).await?;
        let wait = self.settings.effective_wait(max_wait);
        let target = self.settings.effective_target(target_bytes);

        Ok(query.cursor.get_result(token, wait, target).await?)
    }

    pub async fn cancel(&self, query_id: &QueryId) -> Result<(), RuntimeError> {
        self.query(query_id).await?.cursor.cancel();
        Ok(())
    }

    pub async fn partial_cancel(&self, query_id: &QueryId, stage: StageId) -> Result<(), RuntimeError> {
        self.query(query_id).await?.cursor.partial_cancel(stage);
        Ok(())
    }

    /// Disposes the cursor and forgets the query.
    pub async fn dispose(&self, query_id: &QueryId) -> Result<(), RuntimeError> {
        let query = self
            .queries
            .write()
            .await
            .remove(query_id)
            .ok_or_else(|| RuntimeError::QueryNotFound(query_id.clone()))?;
        query.cursor.dispose();
        Ok(())
    }

    /// Fails running queries whose client has not polled for longer than
    /// `client_timeout`, and drops every idle query. Returns the ids removed.
    pub async fn purge_abandoned(&self, client_timeout: Duration) -> Vec<QueryId> {
        let now = Utc::now();
        let mut queries = self.queries.write().await;
        let mut removed = Vec::new();

        queries.retain(|query_id, query| {
            let snapshot = query.lifecycle.snapshot();
            let idle = (now - snapshot.last_heartbeat).to_std().unwrap_or_default();
            if idle <= client_timeout {
                return true;
            }

            if !snapshot.state.is_done() {
                warn!(query_id = %query_id, idle_ms = idle.as_millis() as u64, "Abandoning query");
                query.lifecycle.fail(QueryError::abandoned(idle));
            } else {
                debug!(query_id = %query_id, state = %snapshot.state, "Removing idle finished query");
            }
            query.cursor.dispose();
            removed.push(query_id.clone());
            false
        });

        removed
    }

    pub async fn query_count(&self) -> usize {
        self.queries.read().await.len()
    }

    pub async fn contains(&self, query_id: &QueryId) -> bool {
        self.queries.read().await.contains_key(query_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::{exchange::client::ExchangeClient, lifecycle::state_machine::QueryStateMachine};
    use model::query::{error::StandardErrorCode, state::QueryState};
    use tracing_test::traced_test;

    fn query(id: &str) -> (Arc<QueryStateMachine>, Arc<ExchangeClient>) {
        let query_id = QueryId::from(id);
        (
            Arc::new(QueryStateMachine::new(query_id.clone(), true)),
            Arc::new(ExchangeClient::new(query_id)),
        )
    }

    #[tokio::test]
    async fn rejects_duplicate_registration() {
        let manager = QueryManager::new(ProtocolSettings::default());
        let (lifecycle, exchange) = query("q1");
        manager.register(lifecycle.clone(), exchange.clone()).await.unwrap();

        assert!(matches!(
            manager.register(lifecycle, exchange).await,
            Err(RuntimeError::AlreadyRegistered(_))
        ));
    }

    #[tokio::test]
    async fn unknown_query_is_reported() {
        let manager = QueryManager::new(ProtocolSettings::default());
        let err = manager
            .get_result(&QueryId::from("missing"), 0, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::QueryNotFound(_)));
    }

    #[tokio::test]
    async fn protocol_errors_pass_through() {
        let manager = QueryManager::new(ProtocolSettings::default());
        let (lifecycle, exchange) = query("q1");
        lifecycle.advance(QueryState::Running);
        manager.register(lifecycle, exchange).await.unwrap();

        let err = manager
            .get_result(&QueryId::from("q1"), 3, Some(Duration::ZERO), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Cursor(_)));
    }

    #[traced_test]
    #[tokio::test]
    async fn purges_abandoned_queries() {
        let manager = QueryManager::new(ProtocolSettings::default());
        let (lifecycle, exchange) = query("q1");
        lifecycle.advance(QueryState::Running);
        manager.register(lifecycle.clone(), exchange.clone()).await.unwrap();

        assert!(manager.purge_abandoned(Duration::from_secs(60)).await.is_empty());

        tokio::time::sleep(Duration::from_millis(20)).await;
        let removed = manager.purge_abandoned(Duration::from_millis(5)).await;
        assert_eq!(removed, vec![QueryId::from("q1")]);

        let failure = lifecycle.snapshot().failure.unwrap();
        assert!(failure.is(StandardErrorCode::AbandonedQuery));
        assert!(exchange.is_closed());
        assert_eq!(manager.query_count().await, 0);
        assert!(logs_contain("Abandoning query"));
    }

    #[tokio::test]
    async fn dispose_removes_query() {
        let manager = QueryManager::new(ProtocolSettings::default());
        let (lifecycle, exchange) = query("q1");
        manager.register(lifecycle, exchange.clone()).await.unwrap();

        manager.dispose(&QueryId::from("q1")).await.unwrap();
        assert!(exchange.is_closed());
        assert!(!manager.contains(&QueryId::from("q1")).await);
        assert!(manager.dispose(&QueryId::from("q1")).await.is_err());
    }
}
