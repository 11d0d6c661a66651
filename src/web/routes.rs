//! HTTP route handlers for the control plane.
//!
//! All business logic is delegated to `crate::campaign`; handlers only
//! translate between HTTP and the campaign operations.

use std::sync::Arc;

use axum::{
    extract::{Extension, Json},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tracing::info;

use crate::campaign;
use crate::{AppConfig, AppState, SubscriberId};

/// JSON error response helper
fn err_response(status: StatusCode, msg: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({ "error": msg })))
}

/// Build the API router with all endpoints.
pub fn api_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Status
        .route("/status", get(get_status))
        .route("/subscribers", get(get_subscribers))
        // Config
        .route("/config", get(get_config).post(configure))
        // Campaign control
        .route("/cycle/run", post(run_cycle))
        .route("/rollover/run", post(run_rollover))
        .route("/schedule/status", get(get_schedule_status))
        // Inbound from the chat gateway
        .route("/subscribe", post(subscribe))
        .route("/confirm", post(confirm))
        // Logs
        .route("/logs/dir", get(get_log_dir))
        // Auth middleware (only if NUDGEBOT_WEB_PASS is set)
        .layer(middleware::from_fn(super::auth::basic_auth_middleware))
        .layer(Extension(state))
}

// ========== Status Handlers ==========

async fn get_status(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    Json(campaign::campaign_status(&state).await)
}

async fn get_subscribers(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    Json(campaign::subscriber_views(&state).await)
}

// ========== Config Handlers ==========

async fn get_config(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    let config = state.config.read().await.clone();
    Json(config)
}

async fn configure(
    Extension(state): Extension<Arc<AppState>>,
    Json(config): Json<AppConfig>,
) -> impl IntoResponse {
    info!("Configuring application via web API");
    match state.configure(config).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => err_response(StatusCode::BAD_REQUEST, &e.to_string()).into_response(),
    }
}

// ========== Campaign Control Handlers ==========

async fn run_cycle(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    info!("Manual cycle trigger via web API");
    Json(campaign::run_daily_cycle(&state).await)
}

async fn run_rollover(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    info!("Manual rollover reset via web API");
    campaign::run_rollover_reset(&state).await;
    StatusCode::OK
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleStatus {
    daily_trigger_time: String,
    rollover_reset_time: String,
    timezone: String,
    next_trigger_in_secs: i64,
    next_reset_in_secs: i64,
}

async fn get_schedule_status(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    let config = state.config.read().await.clone();
    let params = state.campaign_params().await;

    Json(ScheduleStatus {
        daily_trigger_time: config.daily_trigger_time,
        rollover_reset_time: config.rollover_reset_time,
        timezone: config.timezone,
        next_trigger_in_secs: crate::scheduler::seconds_until(params.trigger_time, params.timezone),
        next_reset_in_secs: crate::scheduler::seconds_until(params.rollover_time, params.timezone),
    })
}

// ========== Gateway Handlers ==========

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriberRequest {
    subscriber_id: SubscriberId,
}

async fn subscribe(
    Extension(state): Extension<Arc<AppState>>,
    Json(req): Json<SubscriberRequest>,
) -> impl IntoResponse {
    Json(campaign::subscribe(&state, req.subscriber_id).await)
}

async fn confirm(
    Extension(state): Extension<Arc<AppState>>,
    Json(req): Json<SubscriberRequest>,
) -> impl IntoResponse {
    Json(campaign::confirm(&state, req.subscriber_id).await)
}

// ========== Logs Handler ==========

async fn get_log_dir() -> impl IntoResponse {
    match crate::log_dir() {
        Some(p) => Json(serde_json::json!({ "path": p.to_string_lossy() })).into_response(),
        None => err_response(StatusCode::INTERNAL_SERVER_ERROR, "Could not determine log directory")
            .into_response(),
    }
}
