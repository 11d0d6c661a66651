//! Nudgebot server
//!
//! Headless daemon running the daily campaign triggers and the HTTP
//! control plane.
//!
//! Environment variables:
//! - `NUDGEBOT_WEB_PORT` - Server port (default: 8080)
//! - `NUDGEBOT_WEB_USER` - Basic auth username (default: "admin")
//! - `NUDGEBOT_WEB_PASS` - Basic auth password (auth disabled if not set)

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};

use nudgebot::scheduler::DailyTrigger;
use nudgebot::{campaign, web, AppConfig, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guard = nudgebot::init_logging();

    info!("Starting nudgebot (server mode)");

    if let Some(dir) = nudgebot::log_dir() {
        info!("Log files saved to: {}", dir.display());
    }

    let config = AppConfig::load();
    // A partially configured daemon must not run; validation is fatal here.
    let params = config.validate().context("invalid configuration")?;
    info!(
        "Campaign: daily at {} {} / retry every {}s / cap {} follow-ups",
        params.trigger_time,
        params.timezone,
        params.retry_interval.as_secs(),
        params.max_reminders
    );

    let state = Arc::new(AppState::new(config).context("failed to initialize state")?);

    // Daily campaign cycle at the configured local time
    let _cycle_trigger = {
        let schedule_state = state.clone();
        let fire_state = state.clone();
        DailyTrigger::spawn(
            "daily-cycle",
            move || {
                let state = schedule_state.clone();
                async move {
                    let params = state.campaign_params().await;
                    (params.trigger_time, params.timezone)
                }
            },
            move || {
                let state = fire_state.clone();
                async move {
                    campaign::run_daily_cycle(&state).await;
                }
            },
        )
    };

    // Day-rollover reset, usually at midnight
    let _rollover_trigger = {
        let schedule_state = state.clone();
        let fire_state = state.clone();
        DailyTrigger::spawn(
            "rollover-reset",
            move || {
                let state = schedule_state.clone();
                async move {
                    let params = state.campaign_params().await;
                    (params.rollover_time, params.timezone)
                }
            },
            move || {
                let state = fire_state.clone();
                async move {
                    campaign::run_rollover_reset(&state).await;
                }
            },
        )
    };

    let port: u16 = std::env::var("NUDGEBOT_WEB_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    if std::env::var("NUDGEBOT_WEB_PASS").map(|p| !p.is_empty()).unwrap_or(false) {
        let user = std::env::var("NUDGEBOT_WEB_USER").unwrap_or_else(|_| "admin".to_string());
        info!("Basic auth enabled (user: {})", user);
    } else {
        info!("Basic auth disabled (set NUDGEBOT_WEB_PASS to enable)");
    }

    info!("Control plane: http://0.0.0.0:{}/api", port);

    // Blocks until shutdown
    if let Err(e) = web::start_server(state, port).await {
        error!("Web server exited with error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
