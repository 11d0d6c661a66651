//! Retry timer manager
//!
//! Owns one repeating tokio task per armed subscriber, keyed by subscriber
//! id. Arming replaces any live timer for the same id, so two timers can
//! never run for one subscriber. Entries carry a generation tag: a stopping
//! tick removes its own map entry only while its generation still matches,
//! so a timer re-armed by a newer cycle is never evicted by a stale task.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use crate::SubscriberId;

/// What a tick handler wants its timer to do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickFlow {
    /// Keep ticking
    Continue,
    /// Self-cancel; no further ticks fire for this subscriber
    Stop,
}

struct TimerEntry {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Per-subscriber repeating retry timers
#[derive(Default)]
pub struct RetryTimerManager {
    timers: Arc<Mutex<HashMap<SubscriberId, TimerEntry>>>,
    next_generation: AtomicU64,
}

impl RetryTimerManager {
    /// Create a manager with no armed timers
    pub fn new() -> Self {
        Self {
            timers: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Arm a repeating timer for `id`, firing every `interval`.
    ///
    /// The first fire happens after `interval` has elapsed, never
    /// immediately. Any live timer for the same id is cancelled first.
    /// `on_tick` returns [`TickFlow::Stop`] to self-cancel; the task then
    /// removes its own handle as its last action.
    pub fn arm<F, Fut>(&self, id: SubscriberId, interval: Duration, on_tick: F)
    where
        F: Fn(SubscriberId) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TickFlow> + Send + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let task_timers = Arc::clone(&self.timers);

        let mut timers = self.timers.lock();
        if let Some(old) = timers.remove(&id) {
            old.handle.abort();
            debug!("Replaced live timer for subscriber {}", id);
        }

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if on_tick(id).await == TickFlow::Stop {
                    break;
                }
            }
            // Self-removal, but only while this task still owns the slot.
            let mut timers = task_timers.lock();
            if timers.get(&id).map(|e| e.generation) == Some(generation) {
                timers.remove(&id);
            }
        });

        timers.insert(id, TimerEntry { generation, handle });
    }

    /// Cancel and remove the timer for `id`. Returns false if none was armed.
    ///
    /// Takes effect before the next scheduled tick; a tick already in flight
    /// may still complete at most one send.
    pub fn disarm(&self, id: SubscriberId) -> bool {
        let entry = self.timers.lock().remove(&id);
        match entry {
            Some(entry) => {
                entry.handle.abort();
                debug!("Disarmed timer for subscriber {}", id);
                true
            }
            None => false,
        }
    }

    /// Cancel every live timer. Returns how many were disarmed.
    ///
    /// Called at the start of a new cycle so no previous cycle's timer
    /// survives into the new one.
    pub fn disarm_all(&self) -> usize {
        let entries: Vec<TimerEntry> = {
            let mut timers = self.timers.lock();
            timers.drain().map(|(_, entry)| entry).collect()
        };
        let count = entries.len();
        for entry in &entries {
            entry.handle.abort();
        }
        count
    }

    /// Number of live timers
    pub fn armed_count(&self) -> usize {
        self.timers.lock().len()
    }

    /// Whether a timer is armed for `id`
    pub fn is_armed(&self, id: SubscriberId) -> bool {
        self.timers.lock().contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use tokio::time::sleep;

    use super::*;

    const INTERVAL: Duration = Duration::from_secs(60);

    /// Arm a counting timer that keeps ticking until `stop_at` ticks.
    fn arm_counting(
        manager: &RetryTimerManager,
        id: SubscriberId,
        ticks: Arc<AtomicU32>,
        stop_at: u32,
    ) {
        manager.arm(id, INTERVAL, move |_| {
            let ticks = Arc::clone(&ticks);
            async move {
                let n = ticks.fetch_add(1, Ordering::SeqCst) + 1;
                if n >= stop_at {
                    TickFlow::Stop
                } else {
                    TickFlow::Continue
                }
            }
        });
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_fire_waits_a_full_interval() {
        let manager = RetryTimerManager::new();
        let ticks = Arc::new(AtomicU32::new(0));
        arm_counting(&manager, 1, Arc::clone(&ticks), u32::MAX);

        sleep(INTERVAL / 2).await;
        settle().await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);

        sleep(INTERVAL).await;
        settle().await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_the_live_timer() {
        let manager = RetryTimerManager::new();
        let first = Arc::new(AtomicU32::new(0));
        let second = Arc::new(AtomicU32::new(0));

        arm_counting(&manager, 1, Arc::clone(&first), u32::MAX);
        arm_counting(&manager, 1, Arc::clone(&second), u32::MAX);
        assert_eq!(manager.armed_count(), 1);

        sleep(INTERVAL * 3 + INTERVAL / 2).await;
        settle().await;

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_stops_future_ticks() {
        let manager = RetryTimerManager::new();
        let ticks = Arc::new(AtomicU32::new(0));
        arm_counting(&manager, 1, Arc::clone(&ticks), u32::MAX);

        sleep(INTERVAL + INTERVAL / 2).await;
        settle().await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        assert!(manager.disarm(1));
        assert!(!manager.disarm(1));
        assert!(!manager.is_armed(1));

        sleep(INTERVAL * 5).await;
        settle().await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_self_cancels_and_removes_handle() {
        let manager = RetryTimerManager::new();
        let ticks = Arc::new(AtomicU32::new(0));
        arm_counting(&manager, 1, Arc::clone(&ticks), 3);

        sleep(INTERVAL * 10).await;
        settle().await;

        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        assert_eq!(manager.armed_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_all_cancels_every_timer() {
        let manager = RetryTimerManager::new();
        let ticks = Arc::new(AtomicU32::new(0));
        for id in 1..=5 {
            arm_counting(&manager, id, Arc::clone(&ticks), u32::MAX);
        }
        assert_eq!(manager.armed_count(), 5);

        assert_eq!(manager.disarm_all(), 5);
        assert_eq!(manager.armed_count(), 0);

        sleep(INTERVAL * 3).await;
        settle().await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_after_self_stop_starts_fresh() {
        let manager = RetryTimerManager::new();
        let first = Arc::new(AtomicU32::new(0));
        arm_counting(&manager, 1, Arc::clone(&first), 2);

        sleep(INTERVAL * 4).await;
        settle().await;
        assert_eq!(first.load(Ordering::SeqCst), 2);
        assert_eq!(manager.armed_count(), 0);

        let second = Arc::new(AtomicU32::new(0));
        arm_counting(&manager, 1, Arc::clone(&second), u32::MAX);
        sleep(INTERVAL * 2 + INTERVAL / 2).await;
        settle().await;

        assert_eq!(second.load(Ordering::SeqCst), 2);
        assert!(manager.is_armed(1));
    }
}
