pub mod core;
pub mod events;
pub mod query;
pub mod records;
