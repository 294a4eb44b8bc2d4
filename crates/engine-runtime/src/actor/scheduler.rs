use crate::actor::{ActorRef, messages::ReaperMsg};
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Sends `ReaperMsg::Tick` to an actor at a fixed interval.
pub struct TickScheduler {
    actor_ref: ActorRef<ReaperMsg>,
    interval: Duration,
}

impl TickScheduler {
    pub fn new(actor_ref: ActorRef<ReaperMsg>, interval: Duration) -> Self {
        Self {
            actor_ref,
            interval,
        }
    }

    /// Ticks until `cancel` fires or the mailbox closes. Ticks are skipped,
    /// not queued, while the actor is busy.
    pub async fn run(self, cancel: CancellationToken) {
        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if self.actor_ref.is_closed() {
                        break;
                    }
                    // A full mailbox already holds a pending tick.
                    let _ = self.actor_ref.try_send(ReaperMsg::Tick);
                }
            }
        }

        debug!(actor = %self.actor_ref.name(), "tick scheduler stopped");
    }
}
