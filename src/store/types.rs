//! Daily record and tick-outcome types

use chrono::NaiveDate;

/// Per-subscriber state for the current campaign cycle
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyRecord {
    /// True once the subscriber has confirmed for this cycle
    pub acknowledged_today: bool,
    /// Follow-ups sent since the cycle's first prompt
    pub reminders_sent: u32,
    /// Calendar date (in the campaign timezone) this record applies to
    pub cycle_date: NaiveDate,
}

impl DailyRecord {
    /// A fresh record for the given cycle date
    pub fn fresh(cycle_date: NaiveDate) -> Self {
        Self {
            acknowledged_today: false,
            reminders_sent: 0,
            cycle_date,
        }
    }
}

/// Outcome of the per-tick cap-and-acknowledgment check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Send a follow-up. The count has already been incremented.
    Eligible { reminders_sent: u32 },
    /// Send nothing; the subscriber's timer should disarm itself.
    Suppressed(SuppressReason),
}

/// Why a tick was suppressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// The subscriber already confirmed this cycle
    Acknowledged,
    /// The follow-up cap has been reached
    CapReached,
    /// The record predates the current cycle date
    StaleCycle,
    /// No record exists for the subscriber
    Unknown,
}
