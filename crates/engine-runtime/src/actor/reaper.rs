use crate::{
    actor::{Actor, ActorContext, ActorRef, messages::ReaperMsg, scheduler::TickScheduler, spawn::spawn_actor},
    error::ActorError,
    manager::QueryManager,
};
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Periodically fails and disposes queries whose client stopped polling.
pub struct ReaperActor {
    manager: Arc<QueryManager>,
    client_timeout: Duration,
    interval: Duration,
    ticker: CancellationToken,
}

impl ReaperActor {
    pub fn new(manager: Arc<QueryManager>, client_timeout: Duration, interval: Duration) -> Self {
        Self {
            manager,
            client_timeout,
            interval,
            ticker: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl Actor<ReaperMsg> for ReaperActor {
    async fn handle(&mut self, msg: ReaperMsg, ctx: &ActorContext) -> Result<(), ActorError> {
        match msg {
            ReaperMsg::SetActorRef(actor_ref) => {
                let scheduler = TickScheduler::new(actor_ref, self.interval);
                tokio::spawn(scheduler.run(self.ticker.clone()));
            }
            ReaperMsg::Tick => {
                let removed = self.manager.purge_abandoned(self.client_timeout).await;
                if removed.is_empty() {
                    debug!(actor = %ctx.name(), "No abandoned queries");
                } else {
                    info!(actor = %ctx.name(), count = removed.len(), queries = ?removed, "Reaped queries");
                }
            }
            ReaperMsg::Stop => self.ticker.cancel(),
        }
        Ok(())
    }

    async fn on_stop(&mut self, _ctx: &ActorContext) -> Result<(), ActorError> {
        self.ticker.cancel();
        Ok(())
    }
}

/// Starts the reaper using the manager's `client_timeout` and
/// `reaper_interval` settings.
pub async fn spawn_reaper(
    manager: Arc<QueryManager>,
) -> Result<(ActorRef<ReaperMsg>, JoinHandle<()>), ActorError> {
    let settings = manager.settings();
    let actor = ReaperActor::new(
        manager.clone(),
        settings.client_timeout.as_duration(),
        settings.reaper_interval.as_duration(),
    );

    let (actor_ref, handle) = spawn_actor("reaper", 4, actor);
    actor_ref.send(ReaperMsg::SetActorRef(actor_ref.clone())).await?;
    Ok((actor_ref, handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_config::settings::{ProtocolSettings, units::ConfigDuration};
    use engine_core::{exchange::client::ExchangeClient, lifecycle::state_machine::QueryStateMachine};
    use model::{core::identifiers::QueryId, query::state::QueryState};

    #[tokio::test]
    async fn reaps_idle_query_and_stops() {
        let settings = ProtocolSettings {
            client_timeout: ConfigDuration::millis(20),
            reaper_interval: ConfigDuration::millis(10),
            ..ProtocolSettings::default()
        };
        let manager = Arc::new(QueryManager::new(settings));
        let query_id = QueryId::from("idle");
        let lifecycle = Arc::new(QueryStateMachine::new(query_id.clone(), true));
        lifecycle.advance(QueryState::Running);
        manager
            .register(lifecycle.clone(), Arc::new(ExchangeClient::new(query_id)))
            .await
            .unwrap();

        let (reaper, handle) = spawn_reaper(manager.clone()).await.unwrap();

        for _ in 0..100 {
            if manager.query_count().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(manager.query_count().await, 0);
        assert_eq!(lifecycle.state(), QueryState::Failed);

        reaper.send(ReaperMsg::Stop).await.unwrap();
        drop(reaper);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
