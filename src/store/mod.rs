//! Daily state store
//!
//! Per-subscriber acknowledgment flag and reminder count for the current
//! cycle. Every mutation runs inside a single write-lock critical section, so
//! the check-and-increment for a follow-up can never race an acknowledgment
//! or a cycle reset into exceeding the cap.

mod types;

pub use types::{DailyRecord, SuppressReason, TickOutcome};

use std::collections::HashMap;

use chrono::NaiveDate;
use parking_lot::RwLock;

use crate::SubscriberId;

/// Concurrency-safe map of subscriber id to [`DailyRecord`].
///
/// Callers never read-modify-write a record directly; all state transitions
/// go through the atomic operations below.
#[derive(Debug, Default)]
pub struct DailyStateStore {
    records: RwLock<HashMap<SubscriberId, DailyRecord>>,
}

impl DailyStateStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Reset every known record for a new cycle date.
    ///
    /// One critical section: concurrent readers observe either the old state
    /// or the fully reset state, never a half-reset mix.
    pub fn reset_all(&self, new_date: NaiveDate) {
        let mut records = self.records.write();
        for record in records.values_mut() {
            *record = DailyRecord::fresh(new_date);
        }
    }

    /// Atomic check-and-increment for one follow-up send.
    ///
    /// Returns [`TickOutcome::Eligible`] and bumps the count only when the
    /// record is current, unacknowledged, and under `cap`. Two racing calls
    /// can never push `reminders_sent` past `cap`, and no call returns
    /// `Eligible` after an acknowledgment has been recorded.
    pub fn increment_if_eligible(
        &self,
        id: SubscriberId,
        cap: u32,
        today: NaiveDate,
    ) -> TickOutcome {
        let mut records = self.records.write();
        let Some(record) = records.get_mut(&id) else {
            return TickOutcome::Suppressed(SuppressReason::Unknown);
        };
        if record.cycle_date != today {
            return TickOutcome::Suppressed(SuppressReason::StaleCycle);
        }
        if record.acknowledged_today {
            return TickOutcome::Suppressed(SuppressReason::Acknowledged);
        }
        if record.reminders_sent >= cap {
            return TickOutcome::Suppressed(SuppressReason::CapReached);
        }
        record.reminders_sent += 1;
        TickOutcome::Eligible {
            reminders_sent: record.reminders_sent,
        }
    }

    /// Atomically mark a subscriber as acknowledged for this cycle.
    ///
    /// Unknown subscribers get a record stamped `today` (a late-arriving
    /// confirmation from a freshly onboarded subscriber is not an error).
    /// Returns true when the flag was newly set, false on a repeat.
    pub fn mark_acknowledged(&self, id: SubscriberId, today: NaiveDate) -> bool {
        let mut records = self.records.write();
        let record = records.entry(id).or_insert_with(|| DailyRecord::fresh(today));
        let newly_acknowledged = !record.acknowledged_today;
        record.acknowledged_today = true;
        newly_acknowledged
    }

    /// Get a copy of a subscriber's record
    pub fn get(&self, id: SubscriberId) -> Option<DailyRecord> {
        self.records.read().get(&id).cloned()
    }

    /// Create a fresh record stamped `today` if none exists (late join).
    /// Existing records are left untouched.
    pub fn ensure_record(&self, id: SubscriberId, today: NaiveDate) {
        self.records
            .write()
            .entry(id)
            .or_insert_with(|| DailyRecord::fresh(today));
    }

    /// Copy of the full record map, for status reporting and persistence
    pub fn snapshot(&self) -> HashMap<SubscriberId, DailyRecord> {
        self.records.read().clone()
    }

    /// Replace the record map wholesale (startup state restore)
    pub fn load(&self, records: HashMap<SubscriberId, DailyRecord>) {
        *self.records.write() = records;
    }

    /// Number of subscribers acknowledged for the given cycle date
    pub fn acknowledged_count(&self, date: NaiveDate) -> usize {
        self.records
            .read()
            .values()
            .filter(|r| r.cycle_date == date && r.acknowledged_today)
            .count()
    }

    /// Total follow-ups sent for the given cycle date
    pub fn reminders_sent_total(&self, date: NaiveDate) -> u64 {
        self.records
            .read()
            .values()
            .filter(|r| r.cycle_date == date)
            .map(|r| u64::from(r.reminders_sent))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, d).unwrap()
    }

    #[test]
    fn test_cap_boundary() {
        let store = DailyStateStore::new();
        store.ensure_record(1, day(6));
        store.reset_all(day(6));

        for n in 1..=3 {
            assert_eq!(
                store.increment_if_eligible(1, 3, day(6)),
                TickOutcome::Eligible { reminders_sent: n }
            );
        }
        assert_eq!(
            store.increment_if_eligible(1, 3, day(6)),
            TickOutcome::Suppressed(SuppressReason::CapReached)
        );
        assert_eq!(store.get(1).unwrap().reminders_sent, 3);
    }

    #[test]
    fn test_acknowledgment_suppresses_regardless_of_count() {
        let store = DailyStateStore::new();
        store.ensure_record(1, day(6));
        store.increment_if_eligible(1, 10, day(6));

        assert!(store.mark_acknowledged(1, day(6)));
        assert_eq!(
            store.increment_if_eligible(1, 10, day(6)),
            TickOutcome::Suppressed(SuppressReason::Acknowledged)
        );
    }

    #[test]
    fn test_mark_acknowledged_is_idempotent_and_creates_records() {
        let store = DailyStateStore::new();
        assert!(store.mark_acknowledged(99, day(6)));
        assert!(!store.mark_acknowledged(99, day(6)));

        let record = store.get(99).unwrap();
        assert!(record.acknowledged_today);
        assert_eq!(record.cycle_date, day(6));
    }

    #[test]
    fn test_stale_record_is_suppressed() {
        let store = DailyStateStore::new();
        store.ensure_record(1, day(5));
        assert_eq!(
            store.increment_if_eligible(1, 3, day(6)),
            TickOutcome::Suppressed(SuppressReason::StaleCycle)
        );
    }

    #[test]
    fn test_unknown_subscriber_is_suppressed() {
        let store = DailyStateStore::new();
        assert_eq!(
            store.increment_if_eligible(7, 3, day(6)),
            TickOutcome::Suppressed(SuppressReason::Unknown)
        );
    }

    #[test]
    fn test_reset_clears_flag_and_count() {
        let store = DailyStateStore::new();
        store.ensure_record(1, day(5));
        store.increment_if_eligible(1, 5, day(5));
        store.mark_acknowledged(1, day(5));

        store.reset_all(day(6));

        let record = store.get(1).unwrap();
        assert_eq!(record, DailyRecord::fresh(day(6)));
    }

    #[test]
    fn test_racing_increments_never_exceed_cap() {
        let store = Arc::new(DailyStateStore::new());
        store.ensure_record(1, day(6));

        let cap = 12;
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let mut eligible = 0u32;
                    for _ in 0..100 {
                        if matches!(
                            store.increment_if_eligible(1, cap, day(6)),
                            TickOutcome::Eligible { .. }
                        ) {
                            eligible += 1;
                        }
                    }
                    eligible
                })
            })
            .collect();

        let total: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, cap);
        assert_eq!(store.get(1).unwrap().reminders_sent, cap);
    }

    #[test]
    fn test_no_eligible_after_acknowledgment_completes() {
        let store = Arc::new(DailyStateStore::new());
        store.ensure_record(1, day(6));

        // Racing incrementers while one thread acknowledges
        let ack = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || store.mark_acknowledged(1, day(6)))
        };
        let incrementers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        store.increment_if_eligible(1, 1000, day(6));
                    }
                })
            })
            .collect();

        ack.join().unwrap();
        let count_at_ack = store.get(1).unwrap().reminders_sent;

        for h in incrementers {
            h.join().unwrap();
        }

        // Once the flag is set no further increment can have landed
        assert_eq!(store.get(1).unwrap().reminders_sent, count_at_ack);
        assert_eq!(
            store.increment_if_eligible(1, 1000, day(6)),
            TickOutcome::Suppressed(SuppressReason::Acknowledged)
        );
    }
}
