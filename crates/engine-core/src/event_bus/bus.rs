use model::events::{Event, QueryEvent};
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A subscription handle that can be used to unsubscribe from events.
#[derive(Debug, Clone)]
pub struct Subscription {
    subscriber_id: u64,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.subscriber_id
    }
}

type Subscribers = HashMap<u64, mpsc::UnboundedSender<Arc<QueryEvent>>>;

/// Per-query fan-out of lifecycle events.
///
/// Publishing never blocks and never drops an event for a live subscriber:
/// channels are unbounded, and a subscriber whose receiver is gone is
/// removed on the next publish.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Subscribers>>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribers(&self) -> MutexGuard<'_, Subscribers> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> (Subscription, mpsc::UnboundedReceiver<Arc<QueryEvent>>) {
        let subscriber_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        self.subscribers().insert(subscriber_id, tx);
        debug!(subscriber_id = subscriber_id, "Subscribed to query events");

        (Subscription { subscriber_id }, rx)
    }

    pub fn publish(&self, event: impl Into<QueryEvent>) {
        let event = Arc::new(event.into());
        let mut subscribers = self.subscribers();

        if subscribers.is_empty() {
            debug!(
                event_type = event.event_type(),
                query_id = %event.query_id(),
                "No subscribers for event"
            );
            return;
        }

        debug!(
            event_type = event.event_type(),
            query_id = %event.query_id(),
            subscriber_count = subscribers.len(),
            "Publishing event"
        );

        subscribers.retain(|subscriber_id, sender| match sender.send(event.clone()) {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    event_type = event.event_type(),
                    subscriber_id = subscriber_id,
                    "Dropping subscriber with closed receiver"
                );
                false
            }
        });
    }

    pub fn unsubscribe(&self, subscription: Subscription) {
        if self
            .subscribers()
            .remove(&subscription.subscriber_id)
            .is_some()
        {
            debug!(
                subscriber_id = subscription.subscriber_id,
                "Unsubscribed from query events"
            );
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers().len()
    }

    pub fn clear(&self) {
        self.subscribers().clear();
        debug!("Cleared all subscriptions from EventBus");
    }
}
