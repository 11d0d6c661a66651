//! Retry timer module
//!
//! One owned repeating timer per armed subscriber.

mod manager;

pub use manager::{RetryTimerManager, TickFlow};
