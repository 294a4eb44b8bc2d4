pub mod actor;
pub mod error;
pub mod execution;
pub mod manager;
