//! Campaign controller and acknowledgment handling.
//!
//! Orchestrates the daily cycle: reset state, send first prompts, arm one
//! retry timer per reachable subscriber. Also processes inbound
//! confirmations and the day-rollover reset. The web routes delegate here.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::scheduler;
use crate::store::TickOutcome;
use crate::timer::TickFlow;
use crate::{AppState, CampaignParams, SubscriberId};

// ========== Shared Response Types ==========

/// Campaign-wide status snapshot
#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignStatus {
    pub subscribers: usize,
    pub armed_timers: usize,
    pub acknowledged_today: usize,
    pub reminders_sent_today: u64,
    pub last_cycle_date: Option<chrono::NaiveDate>,
    pub next_trigger_in_secs: i64,
    pub next_reset_in_secs: i64,
}

/// Result of one daily cycle run
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleSummary {
    pub cycle_date: chrono::NaiveDate,
    pub prompts_sent: usize,
    pub timers_armed: usize,
    pub skipped: usize,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeResponse {
    pub newly_registered: bool,
    pub prompted: bool,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmResponse {
    pub newly_acknowledged: bool,
    pub timer_disarmed: bool,
}

/// Per-subscriber view for the control plane
#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriberView {
    pub id: SubscriberId,
    pub timer_armed: bool,
    pub record: Option<crate::store::DailyRecord>,
}

// ========== Daily Cycle ==========

/// Run one daily campaign cycle.
///
/// Disarms leftovers from the previous cycle, resets every record to
/// today's date, then sends first prompts concurrently and arms a retry
/// timer for each subscriber whose prompt went out. A failed prompt is
/// logged and skipped; it never aborts the cycle for other subscribers.
pub async fn run_daily_cycle(state: &AppState) -> CycleSummary {
    let params = state.campaign_params().await;
    let today = Utc::now().with_timezone(&params.timezone).date_naive();
    let cycle_id = Uuid::new_v4().to_string()[..8].to_string();

    info!("[Cycle {}] Starting daily cycle for {}", cycle_id, today);

    let stale = state.timers.disarm_all();
    if stale > 0 {
        warn!(
            "[Cycle {}] Disarmed {} stale timers from a previous cycle",
            cycle_id, stale
        );
    }

    state.store.reset_all(today);

    let subscribers = state.registry.list_all();
    for &id in &subscribers {
        state.store.ensure_record(id, today);
    }

    // First prompts go out concurrently; each resolves to (id, send result).
    let sends = subscribers.iter().map(|&id| {
        let transport = Arc::clone(&state.transport);
        async move { (id, transport.send_prompt(id).await) }
    });
    let results = join_all(sends).await;

    let mut summary = CycleSummary {
        cycle_date: today,
        prompts_sent: 0,
        timers_armed: 0,
        skipped: 0,
    };

    for (id, result) in results {
        match result {
            Ok(()) => {
                summary.prompts_sent += 1;
                if params.count_first_prompt {
                    state
                        .store
                        .increment_if_eligible(id, params.max_reminders, today);
                }
                spawn_retry_timer(state, &params, id);
                summary.timers_armed += 1;
            }
            Err(e) => {
                warn!(
                    "[Cycle {}] First prompt to subscriber {} failed: {} - no reminders this cycle",
                    cycle_id, id, e
                );
                summary.skipped += 1;
            }
        }
    }

    *state.last_cycle.write().await = Some(today);
    state.persist().await;

    info!(
        "[Cycle {}] {} prompts sent, {} timers armed, {} skipped",
        cycle_id, summary.prompts_sent, summary.timers_armed, summary.skipped
    );
    summary
}

/// Arm the retry timer for one subscriber.
///
/// The tick handler runs the quiet-cutoff check, then the store's atomic
/// eligibility check; any suppression stops the timer as its last action,
/// so no tick ever sends after suppression is first detected.
fn spawn_retry_timer(state: &AppState, params: &CampaignParams, id: SubscriberId) {
    let store = Arc::clone(&state.store);
    let transport = Arc::clone(&state.transport);
    let cap = params.max_reminders;
    let tz = params.timezone;
    let cutoff = params.quiet_cutoff;

    state.timers.arm(id, params.retry_interval, move |id| {
        let store = Arc::clone(&store);
        let transport = Arc::clone(&transport);
        async move {
            let local_now = Utc::now().with_timezone(&tz);

            if let Some(cutoff) = cutoff {
                if local_now.time() >= cutoff {
                    debug!("Subscriber {}: past quiet cutoff, disarming", id);
                    return TickFlow::Stop;
                }
            }

            match store.increment_if_eligible(id, cap, local_now.date_naive()) {
                TickOutcome::Eligible { reminders_sent } => {
                    match transport.send_reminder(id).await {
                        Ok(()) => {
                            info!("Reminder {}/{} sent to subscriber {}", reminders_sent, cap, id);
                            TickFlow::Continue
                        }
                        Err(e) => {
                            warn!(
                                "Reminder to subscriber {} failed: {} - disarming for this cycle",
                                id, e
                            );
                            TickFlow::Stop
                        }
                    }
                }
                TickOutcome::Suppressed(reason) => {
                    debug!("Subscriber {}: suppressed ({:?}), disarming", id, reason);
                    TickFlow::Stop
                }
            }
        }
    });
}

// ========== Acknowledgment ==========

/// Process an inbound confirmation.
///
/// Marks the record, disarms the subscriber's timer immediately, and
/// answers with the acknowledgment text. Safe to call repeatedly and
/// concurrently with an in-flight tick: the store's atomic check keeps a
/// racing tick from sending after the mark lands, and the disarm wins the
/// race for all future ticks. Unknown subscribers are registered
/// implicitly.
pub async fn confirm(state: &AppState, id: SubscriberId) -> ConfirmResponse {
    let params = state.campaign_params().await;
    let today = Utc::now().with_timezone(&params.timezone).date_naive();

    if state.registry.add(id) {
        info!("Subscriber {} registered implicitly via confirmation", id);
    }

    let newly_acknowledged = state.store.mark_acknowledged(id, today);
    let timer_disarmed = state.timers.disarm(id);

    if newly_acknowledged {
        info!(
            "Subscriber {} acknowledged (timer disarmed: {})",
            id, timer_disarmed
        );
        if let Err(e) = state.transport.send_ack(id).await {
            warn!("Ack confirmation to subscriber {} failed: {}", id, e);
        }
    } else {
        debug!("Repeat confirmation from subscriber {}", id);
    }

    state.persist().await;

    ConfirmResponse {
        newly_acknowledged,
        timer_disarmed,
    }
}

// ========== Subscription ==========

/// Register a subscriber.
///
/// Idempotent. When `immediatePromptOnLateJoin` is on and today's cycle
/// already ran, a brand-new subscriber gets their first prompt right away
/// and a timer is armed for them; otherwise they wait for the next cycle.
pub async fn subscribe(state: &AppState, id: SubscriberId) -> SubscribeResponse {
    let params = state.campaign_params().await;
    let today = Utc::now().with_timezone(&params.timezone).date_naive();

    let newly_registered = state.registry.add(id);
    state.store.ensure_record(id, today);

    let mut prompted = false;
    if newly_registered {
        info!("Subscriber {} registered", id);

        if params.immediate_prompt_on_late_join {
            let cycle_ran_today = *state.last_cycle.read().await == Some(today);
            let acknowledged = state
                .store
                .get(id)
                .map(|r| r.acknowledged_today)
                .unwrap_or(false);

            if cycle_ran_today && !acknowledged {
                match state.transport.send_prompt(id).await {
                    Ok(()) => {
                        if params.count_first_prompt {
                            state
                                .store
                                .increment_if_eligible(id, params.max_reminders, today);
                        }
                        spawn_retry_timer(state, &params, id);
                        prompted = true;
                        info!("Late-join first prompt sent to subscriber {}", id);
                    }
                    Err(e) => {
                        warn!(
                            "Late-join prompt to subscriber {} failed: {} - waiting for next cycle",
                            id, e
                        );
                    }
                }
            }
        }
    }

    state.persist().await;

    SubscribeResponse {
        newly_registered,
        prompted,
    }
}

// ========== Day Rollover ==========

/// Reset all state for the new calendar day.
///
/// Disarms every timer first, so a cycle that never resolved cannot leak
/// ticks into the new day, then restamps every record.
pub async fn run_rollover_reset(state: &AppState) {
    let params = state.campaign_params().await;
    let today = Utc::now().with_timezone(&params.timezone).date_naive();

    let disarmed = state.timers.disarm_all();
    state.store.reset_all(today);
    *state.last_cycle.write().await = None;
    state.persist().await;

    info!(
        "Day rollover: state reset for {} ({} timers disarmed)",
        today, disarmed
    );
}

// ========== Status ==========

/// Campaign status snapshot for the control plane
pub async fn campaign_status(state: &AppState) -> CampaignStatus {
    let params = state.campaign_params().await;
    let today = Utc::now().with_timezone(&params.timezone).date_naive();

    CampaignStatus {
        subscribers: state.registry.len(),
        armed_timers: state.timers.armed_count(),
        acknowledged_today: state.store.acknowledged_count(today),
        reminders_sent_today: state.store.reminders_sent_total(today),
        last_cycle_date: *state.last_cycle.read().await,
        next_trigger_in_secs: scheduler::seconds_until(params.trigger_time, params.timezone),
        next_reset_in_secs: scheduler::seconds_until(params.rollover_time, params.timezone),
    }
}

/// Per-subscriber records, sorted by id
pub async fn subscriber_views(state: &AppState) -> Vec<SubscriberView> {
    let records = state.store.snapshot();
    let mut views: Vec<SubscriberView> = state
        .registry
        .list_all()
        .into_iter()
        .map(|id| SubscriberView {
            id,
            timer_armed: state.timers.is_armed(id),
            record: records.get(&id).cloned(),
        })
        .collect();
    views.sort_by_key(|v| v.id);
    views
}
