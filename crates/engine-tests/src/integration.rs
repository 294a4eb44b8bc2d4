#[cfg(test)]
mod tests {
    use crate::{
        PAGE_BYTES, SHORT_WAIT, TestQuery,
        utils::{ROWS_PER_PAGE, corrupt_text_page, encode, enqueue_pages, keys, row_key},
    };
    use engine_processing::error::CursorError;
    use engine_config::settings::ProtocolSettings;
    use engine_runtime::{
        execution::{
            executor::{PollOptions, run_simulation},
            settings::{SimulationSettings, StatementKind},
        },
        manager::QueryManager,
    };
    use model::{
        core::identifiers::QueryId,
        query::{error::StandardErrorCode, state::QueryState},
    };
    use std::{io::Write, sync::Arc, time::Duration};
    use tempfile::NamedTempFile;
    use tokio_util::sync::CancellationToken;
    use tracing_test::traced_test;

    /// Serves tokens 0, 1 and 2 of a running query.
    async fn serve_three_tokens(query: &TestQuery) {
        enqueue_pages(query, 0, 0..3);
        for token in 0..3 {
            let batch = query
                .cursor
                .get_result(token, SHORT_WAIT, PAGE_BYTES)
                .await
                .unwrap();
            assert_eq!(batch.next_token, Some(token + 1));
        }
        assert_eq!(query.cursor.last_served_token().await, Some(2));
    }

    #[traced_test]
    #[tokio::test]
    async fn tc01_no_output_stage_yields_single_true_row() {
        let query = TestQuery::without_output("tc01");
        query.lifecycle.finish();

        let batch = query.cursor.get_result(0, SHORT_WAIT, 1024).await.unwrap();

        assert_eq!(batch.rows(), &[vec![serde_json::Value::Bool(true)]]);
        let columns = batch.columns.as_ref().unwrap();
        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0].name, "result");
        assert_eq!(batch.next_token, None);
        assert!(batch.error.is_none());
        assert_eq!(batch.stats.state, QueryState::Finished);
    }

    #[traced_test]
    #[tokio::test]
    async fn tc02_byte_target_splits_result_across_tokens() {
        let query = TestQuery::running("tc02", 1);
        enqueue_pages(&query, 0, 0..10);
        query.finish();

        let first = query.cursor.get_result(0, SHORT_WAIT, 400).await.unwrap();
        assert_eq!(first.row_count(), 4 * ROWS_PER_PAGE);
        assert_eq!(first.next_token, Some(1));

        let second = query
            .cursor
            .get_result(1, SHORT_WAIT, 10 * PAGE_BYTES)
            .await
            .unwrap();
        assert_eq!(second.row_count(), 6 * ROWS_PER_PAGE);
        assert_eq!(second.next_token, None);
        assert!(second.error.is_none());

        let mut all = keys(&first);
        all.extend(keys(&second));
        let expected: Vec<String> = (0..10 * ROWS_PER_PAGE).map(row_key).collect();
        assert_eq!(all, expected);
        assert_eq!(query.cursor.metrics().bytes_drained, 10 * PAGE_BYTES);
    }

    #[tokio::test]
    async fn tc03_token_beyond_next_is_not_found() {
        let query = TestQuery::running("tc03", 1);
        serve_three_tokens(&query).await;

        assert_eq!(
            query.cursor.get_result(5, SHORT_WAIT, 1024).await.unwrap_err(),
            CursorError::ResultNotFound { token: 5 }
        );
        // The stream is unaffected.
        assert_eq!(query.cursor.last_served_token().await, Some(2));
    }

    #[tokio::test]
    async fn tc04_replay_of_last_token_is_identical() {
        let query = TestQuery::running("tc04", 1);
        serve_three_tokens(&query).await;
        let served = query.cursor.get_result(2, SHORT_WAIT, 1024).await.unwrap();
        let heartbeat = query.lifecycle.last_heartbeat();
        let stats = query.cursor.metrics();

        tokio::time::sleep(Duration::from_millis(5)).await;
        let replayed = query.cursor.get_result(2, SHORT_WAIT, 1024).await.unwrap();

        assert!(Arc::ptr_eq(&served, &replayed));
        assert_eq!(*served, *replayed);
        assert_eq!(query.lifecycle.state(), QueryState::Running);
        assert!(query.lifecycle.last_heartbeat() > heartbeat);

        let after = query.cursor.metrics();
        assert_eq!(after.batches_served, stats.batches_served);
        assert_eq!(after.replays, stats.replays + 1);
    }

    #[tokio::test]
    async fn tc05_token_before_last_is_gone() {
        let query = TestQuery::running("tc05", 1);
        serve_three_tokens(&query).await;

        assert_eq!(
            query.cursor.get_result(1, SHORT_WAIT, 1024).await.unwrap_err(),
            CursorError::ResultGone { token: 1, last: 2 }
        );
        assert_eq!(
            query.cursor.get_result(0, SHORT_WAIT, 1024).await.unwrap_err(),
            CursorError::ResultGone { token: 0, last: 2 }
        );
    }

    #[traced_test]
    #[tokio::test]
    async fn tc06_row_fault_keeps_decoded_rows_and_fails_query() {
        let query = TestQuery::running("tc06", 1);
        let location = query.location(0).clone();
        for page in 0..5 {
            let page = if page == 2 {
                corrupt_text_page(page, 4)
            } else {
                crate::utils::text_page(page)
            };
            query.exchange.enqueue(&location, encode(&page)).unwrap();
        }
        query.exchange.finish_location(&location);

        let batch = query
            .cursor
            .get_result(0, SHORT_WAIT, 100 * PAGE_BYTES)
            .await
            .unwrap();

        // Pages after the faulty one are still drained, minus only the bad row.
        let expected: Vec<String> = (0..5 * ROWS_PER_PAGE)
            .filter(|id| *id != 2 * ROWS_PER_PAGE + 4)
            .map(row_key)
            .collect();
        assert_eq!(keys(&batch), expected);
        assert!(batch.error.as_ref().unwrap().is(StandardErrorCode::SerializationError));
        assert_eq!(query.lifecycle.state(), QueryState::Failed);
        assert_eq!(query.cursor.metrics().decode_failures, 1);

        let next = batch.next_token.unwrap();
        let terminal = query.cursor.get_result(next, SHORT_WAIT, 1024).await.unwrap();
        assert_eq!(terminal.next_token, None);
        assert!(terminal.error.as_ref().unwrap().is(StandardErrorCode::SerializationError));
        assert!(logs_contain("Fault while draining results"));
    }

    #[traced_test]
    #[tokio::test]
    async fn manager_streams_simulated_query_with_small_target() {
        let manager = Arc::new(QueryManager::new(ProtocolSettings::default()));
        let settings = SimulationSettings {
            locations: 4,
            pages_per_location: 6,
            rows_per_page: 25,
            page_delay: Duration::from_millis(1),
            ..SimulationSettings::default()
        };
        let expected = settings.total_rows();

        let mut seen = Vec::new();
        let summary = run_simulation(
            manager.clone(),
            QueryId::from("managed"),
            settings,
            PollOptions {
                max_wait: Some(Duration::from_millis(50)),
                target_bytes: Some(512),
            },
            CancellationToken::new(),
            |batch| seen.extend(batch.rows().iter().filter_map(|row| row[0].as_i64())),
        )
        .await
        .unwrap();

        seen.sort_unstable();
        assert_eq!(seen, (0..expected as i64).collect::<Vec<_>>());
        assert_eq!(summary.final_state, Some(QueryState::Finished));
        assert!(summary.batches > 1);
        assert_eq!(manager.query_count().await, 0);
        assert!(logs_contain("Result cursor disposed"));
    }

    #[tokio::test]
    async fn manager_reports_ddl_and_update_statements() {
        let manager = Arc::new(QueryManager::new(ProtocolSettings::default()));

        let ddl = run_simulation(
            manager.clone(),
            QueryId::from("ddl"),
            SimulationSettings {
                statement: StatementKind::Ddl,
                ..SimulationSettings::default()
            },
            PollOptions::default(),
            CancellationToken::new(),
            |_| {},
        )
        .await
        .unwrap();
        assert_eq!(ddl.rows, 1);
        assert!(ddl.error.is_none());

        let update = run_simulation(
            manager,
            QueryId::from("update"),
            SimulationSettings {
                statement: StatementKind::Update { rows: 7 },
                ..SimulationSettings::default()
            },
            PollOptions::default(),
            CancellationToken::new(),
            |_| {},
        )
        .await
        .unwrap();
        assert_eq!(update.update_count, Some(7));
    }

    #[tokio::test]
    async fn corrupt_simulated_page_fails_stream() {
        let manager = Arc::new(QueryManager::new(ProtocolSettings::default()));
        let summary = run_simulation(
            manager,
            QueryId::from("corrupt"),
            SimulationSettings {
                locations: 1,
                pages_per_location: 5,
                rows_per_page: 10,
                corrupt_page: Some(2),
                page_delay: Duration::from_millis(20),
                ..SimulationSettings::default()
            },
            PollOptions::default(),
            CancellationToken::new(),
            |_| {},
        )
        .await
        .unwrap();

        assert!(summary.error.unwrap().is(StandardErrorCode::SerializationError));
        assert_eq!(summary.final_state, Some(QueryState::Failed));
    }

    #[tokio::test]
    async fn manager_clamps_requests_to_configured_limits() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "target_result_size": "100B", "max_target_result_size": "256B", "max_wait": "50ms", "default_wait": "50ms" }}"#
        )
        .unwrap();
        let settings = ProtocolSettings::load(Some(file.path())).unwrap();

        let query = TestQuery::running("clamped", 1);
        let manager = QueryManager::new(settings);
        manager
            .register(query.lifecycle.clone(), query.exchange.clone())
            .await
            .unwrap();
        let query_id = QueryId::from("clamped");

        let started = tokio::time::Instant::now();
        let empty = manager
            .get_result(&query_id, 0, Some(Duration::from_secs(30)), None)
            .await
            .unwrap();
        assert!(empty.is_empty());
        assert!(started.elapsed() < Duration::from_secs(5));

        enqueue_pages(&query, 0, 0..10);
        let clamped = manager
            .get_result(&query_id, 1, None, Some(10 * 1024 * 1024))
            .await
            .unwrap();
        assert_eq!(clamped.row_count(), 3 * ROWS_PER_PAGE);

        let defaulted = manager.get_result(&query_id, 2, None, None).await.unwrap();
        assert_eq!(defaulted.row_count(), ROWS_PER_PAGE);
    }
}
