use crate::actor::ActorRef;

/// Messages for the reaper actor.
///
/// Responsible for failing and disposing queries whose client stopped polling.
#[derive(Debug)]
pub enum ReaperMsg {
    /// Initialize the actor with its own reference for tick scheduling.
    SetActorRef(ActorRef<ReaperMsg>),

    /// Periodic sweep for abandoned queries.
    Tick,

    /// Stop scheduling ticks; the actor exits once its mailbox drains.
    Stop,
}
