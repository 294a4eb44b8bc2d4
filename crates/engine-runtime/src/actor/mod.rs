pub mod actor;
pub mod messages;
pub mod reaper;
pub mod scheduler;
pub mod spawn;

pub use actor::{Actor, ActorContext, ActorRef};
