//! Scheduling module
//!
//! Timezone-aware once-a-day triggers for the campaign cycle and the
//! day-rollover reset.

mod daily;

pub use daily::{next_occurrence, seconds_until, DailyTrigger};
