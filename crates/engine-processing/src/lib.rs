pub mod assembler;
pub mod cursor;
pub mod error;
pub mod listener;
pub mod waiter;
