pub mod error;
pub mod event_bus;
pub mod exchange;
pub mod lifecycle;
pub mod metrics;
