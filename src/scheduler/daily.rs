//! Daily trigger
//!
//! Fires a callback once per calendar day at a configured wall-clock time in
//! a configured timezone. The next occurrence is recomputed from the current
//! schedule on every iteration, so runtime reconfiguration applies to the
//! following fire and DST transitions keep the trigger at the same local
//! time year-round.

use std::future::Future;

use chrono::{DateTime, Duration as ChronoDuration, LocalResult, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Resolve the next instant strictly after `after` whose local wall-clock
/// time in `tz` equals `at`.
///
/// A local time made ambiguous by a DST fall-back resolves to the earlier
/// instant; a local time skipped by a DST spring-forward shifts one hour
/// later on the same day.
pub fn next_occurrence(after: DateTime<Utc>, at: NaiveTime, tz: Tz) -> DateTime<Utc> {
    let local_now = after.with_timezone(&tz);
    let mut date = local_now.date_naive();
    if local_now.time() >= at {
        date = date.succ_opt().unwrap_or(date);
    }

    loop {
        match tz.from_local_datetime(&date.and_time(at)) {
            LocalResult::Single(dt) => return dt.with_timezone(&Utc),
            LocalResult::Ambiguous(earliest, _) => return earliest.with_timezone(&Utc),
            LocalResult::None => {
                let shifted = date.and_time(at) + ChronoDuration::hours(1);
                if let LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) =
                    tz.from_local_datetime(&shifted)
                {
                    return dt.with_timezone(&Utc);
                }
                // Gap wider than an hour; fall through to the next day.
                match date.succ_opt() {
                    Some(next) => date = next,
                    None => return after,
                }
            }
        }
    }
}

/// Whole seconds until the next occurrence of `at` in `tz`
pub fn seconds_until(at: NaiveTime, tz: Tz) -> i64 {
    let now = Utc::now();
    (next_occurrence(now, at, tz) - now).num_seconds()
}

/// Once-a-day trigger loop
pub struct DailyTrigger;

impl DailyTrigger {
    /// Spawn the trigger loop as a background task.
    ///
    /// `schedule()` is consulted before every sleep so a reconfigured time
    /// or timezone takes effect for the following day. Runs until aborted.
    pub fn spawn<S, SFut, F, FFut>(label: &'static str, schedule: S, callback: F) -> JoinHandle<()>
    where
        S: Fn() -> SFut + Send + Sync + 'static,
        SFut: Future<Output = (NaiveTime, Tz)> + Send,
        F: Fn() -> FFut + Send + Sync + 'static,
        FFut: Future<Output = ()> + Send,
    {
        tokio::spawn(async move {
            loop {
                let (at, tz) = schedule().await;
                let now = Utc::now();
                let next = next_occurrence(now, at, tz);
                let wait = match (next - now).to_std() {
                    Ok(wait) => wait,
                    Err(_) => {
                        warn!("[{}] Computed fire time in the past, retrying in 60s", label);
                        std::time::Duration::from_secs(60)
                    }
                };

                info!(
                    "[{}] Next fire at {} ({}s from now)",
                    label,
                    next.with_timezone(&tz),
                    wait.as_secs()
                );
                tokio::time::sleep(wait).await;

                callback().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Europe::Madrid;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_same_day_when_time_not_yet_reached() {
        // 08:00 UTC is 10:00 in Madrid (CEST); 11:00 local is 09:00 UTC
        let next = next_occurrence(utc(2026, 6, 1, 8, 0), at(11, 0), Madrid);
        assert_eq!(next, utc(2026, 6, 1, 9, 0));
    }

    #[test]
    fn test_rolls_to_next_day_when_time_passed() {
        // 10:00 UTC is 12:00 in Madrid, past the 11:00 trigger
        let next = next_occurrence(utc(2026, 6, 1, 10, 0), at(11, 0), Madrid);
        assert_eq!(next, utc(2026, 6, 2, 9, 0));
    }

    #[test]
    fn test_fires_at_same_local_time_across_seasons() {
        // Winter (CET, UTC+1): 11:00 local is 10:00 UTC
        let winter = next_occurrence(utc(2026, 1, 15, 0, 0), at(11, 0), Madrid);
        assert_eq!(winter, utc(2026, 1, 15, 10, 0));

        // Summer (CEST, UTC+2): 11:00 local is 09:00 UTC
        let summer = next_occurrence(utc(2026, 7, 15, 0, 0), at(11, 0), Madrid);
        assert_eq!(summer, utc(2026, 7, 15, 9, 0));
    }

    #[test]
    fn test_spring_forward_gap_shifts_one_hour() {
        // Madrid skips 02:00-03:00 on 2026-03-29; 02:30 becomes 03:30 CEST
        let next = next_occurrence(utc(2026, 3, 28, 12, 0), at(2, 30), Madrid);
        assert_eq!(next, utc(2026, 3, 29, 1, 30));
    }

    #[test]
    fn test_fall_back_ambiguity_resolves_to_earlier_instant() {
        // Madrid repeats 02:00-03:00 on 2026-10-25; first 02:30 is CEST (UTC+2)
        let next = next_occurrence(utc(2026, 10, 24, 12, 0), at(2, 30), Madrid);
        assert_eq!(next, utc(2026, 10, 25, 0, 30));
    }

    #[test]
    fn test_exact_trigger_instant_rolls_over() {
        // At exactly 11:00 local the trigger just fired; next is tomorrow
        let next = next_occurrence(utc(2026, 6, 1, 9, 0), at(11, 0), Madrid);
        assert_eq!(next, utc(2026, 6, 2, 9, 0));
    }
}
