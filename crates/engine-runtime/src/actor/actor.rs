use crate::error::ActorError;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct ActorContext {
    name: Arc<str>,
}

impl ActorContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Arc::from(name.into()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A background service driven by messages of type `M`.
///
/// `on_start` runs once, `handle` runs for every message in mailbox order,
/// and `on_stop` runs after the last sender is dropped.
#[async_trait]
pub trait Actor<M>: Send + 'static
where
    M: Send + Debug + 'static,
{
    async fn on_start(&mut self, _ctx: &ActorContext) -> Result<(), ActorError> {
        Ok(())
    }

    async fn handle(&mut self, msg: M, ctx: &ActorContext) -> Result<(), ActorError>;

    async fn on_stop(&mut self, _ctx: &ActorContext) -> Result<(), ActorError> {
        Ok(())
    }
}

/// Sending side of an actor's mailbox.
#[derive(Debug)]
pub struct ActorRef<M>
where
    M: Send + Debug + 'static,
{
    name: Arc<str>,
    tx: mpsc::Sender<M>,
}

impl<M> Clone for ActorRef<M>
where
    M: Send + Debug + 'static,
{
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            tx: self.tx.clone(),
        }
    }
}

impl<M> ActorRef<M>
where
    M: Send + Debug + 'static,
{
    pub fn new(name: impl Into<String>, tx: mpsc::Sender<M>) -> Self {
        Self {
            name: Arc::from(name.into()),
            tx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn send(&self, msg: M) -> Result<(), ActorError> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| ActorError::MailboxClosed)
    }

    /// Sends without waiting; fails if the mailbox is full or closed.
    pub fn try_send(&self, msg: M) -> Result<(), ActorError> {
        self.tx.try_send(msg).map_err(|_| ActorError::MailboxClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
