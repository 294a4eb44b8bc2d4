pub mod error;
pub mod snapshot;
pub mod state;
pub mod stats;
