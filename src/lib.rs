//! Nudgebot
//!
//! A daily check-in reminder daemon: once a day, at a configured local time,
//! every subscriber is asked a yes/no question and then re-asked at a fixed
//! interval until they confirm, a follow-up cap is reached, or the day rolls
//! over.

pub mod campaign;
pub mod registry;
pub mod scheduler;
pub mod store;
pub mod timer;
pub mod transport;
pub mod web;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};
use chrono_tz::Tz;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use url::Url;

use registry::SubscriberRegistry;
use store::{DailyRecord, DailyStateStore};
use timer::RetryTimerManager;
use transport::{HttpTransport, LogTransport, MessageTexts, Transport};

/// Stable numeric chat/account id of a subscriber
pub type SubscriberId = i64;

/// Application configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// Wall-clock time of the daily first prompt (HH:MM)
    pub daily_trigger_time: String,
    /// IANA timezone the campaign runs in
    pub timezone: String,
    /// Seconds between follow-up reminders
    pub retry_interval_secs: u64,
    /// Maximum follow-ups per subscriber per cycle
    pub max_reminders: u32,

    /// No reminders at or past this local time (HH:MM), if set
    #[serde(default)]
    pub quiet_cutoff_time: Option<String>,
    /// Wall-clock time of the day-rollover state reset (HH:MM)
    #[serde(default = "default_rollover_time")]
    pub rollover_reset_time: String,

    /// Count the first prompt against maxReminders
    #[serde(default)]
    pub count_first_prompt: bool,
    /// Send an immediate first prompt to subscribers joining mid-cycle
    #[serde(default)]
    pub immediate_prompt_on_late_join: bool,

    /// Outbound webhook URL; messages are logged only when unset
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Message texts
    #[serde(default = "default_prompt_text")]
    pub prompt_text: String,
    #[serde(default = "default_reminder_text")]
    pub reminder_text: String,
    #[serde(default = "default_ack_text")]
    pub ack_text: String,

    /// Persist registry and daily records across restarts
    #[serde(default = "default_true")]
    pub persist_state: bool,
}

fn default_rollover_time() -> String {
    "00:00".to_string()
}

fn default_prompt_text() -> String {
    "Daily check-in: done for today?".to_string()
}

fn default_reminder_text() -> String {
    "Still waiting: done for today?".to_string()
}

fn default_ack_text() -> String {
    "Got it, no more reminders today.".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            daily_trigger_time: "11:00".to_string(),
            timezone: "Europe/Madrid".to_string(),
            retry_interval_secs: 900,
            max_reminders: 12,
            quiet_cutoff_time: Some("14:00".to_string()),
            rollover_reset_time: default_rollover_time(),
            count_first_prompt: false,
            immediate_prompt_on_late_join: false,
            webhook_url: None,
            prompt_text: default_prompt_text(),
            reminder_text: default_reminder_text(),
            ack_text: default_ack_text(),
            persist_state: true,
        }
    }
}

/// Configuration errors, all fatal at startup
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid time '{0}' (expected HH:MM)")]
    InvalidTime(String),

    #[error("unknown timezone '{0}'")]
    UnknownTimezone(String),

    #[error("retryIntervalSecs must be greater than zero")]
    ZeroInterval,

    #[error("invalid webhook URL '{0}': {1}")]
    InvalidWebhookUrl(String, String),

    #[error("failed to build transport: {0}")]
    Transport(String),
}

/// Validated campaign parameters derived from [`AppConfig`]
#[derive(Debug, Clone)]
pub struct CampaignParams {
    pub trigger_time: NaiveTime,
    pub timezone: Tz,
    pub retry_interval: Duration,
    pub max_reminders: u32,
    pub quiet_cutoff: Option<NaiveTime>,
    pub rollover_time: NaiveTime,
    pub count_first_prompt: bool,
    pub immediate_prompt_on_late_join: bool,
    pub webhook: Option<Url>,
}

fn parse_time(value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value, "%H:%M").map_err(|_| ConfigError::InvalidTime(value.to_string()))
}

impl AppConfig {
    /// Validate the configuration into usable campaign parameters.
    ///
    /// The daemon must not run partially configured; the server binary
    /// treats any error here as fatal.
    pub fn validate(&self) -> Result<CampaignParams, ConfigError> {
        let trigger_time = parse_time(&self.daily_trigger_time)?;
        let rollover_time = parse_time(&self.rollover_reset_time)?;
        let quiet_cutoff = self.quiet_cutoff_time.as_deref().map(parse_time).transpose()?;

        let timezone: Tz = self
            .timezone
            .parse()
            .map_err(|_| ConfigError::UnknownTimezone(self.timezone.clone()))?;

        if self.retry_interval_secs == 0 {
            return Err(ConfigError::ZeroInterval);
        }

        let webhook = self
            .webhook_url
            .as_deref()
            .map(|raw| {
                Url::parse(raw)
                    .map_err(|e| ConfigError::InvalidWebhookUrl(raw.to_string(), e.to_string()))
            })
            .transpose()?;

        Ok(CampaignParams {
            trigger_time,
            timezone,
            retry_interval: Duration::from_secs(self.retry_interval_secs),
            max_reminders: self.max_reminders,
            quiet_cutoff,
            rollover_time,
            count_first_prompt: self.count_first_prompt,
            immediate_prompt_on_late_join: self.immediate_prompt_on_late_join,
            webhook,
        })
    }

    /// Get config file path
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("nudgebot").join("config.json"))
    }

    /// Load config from file, falling back to defaults
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            if path.exists() {
                match std::fs::read_to_string(&path) {
                    Ok(content) => match serde_json::from_str(&content) {
                        Ok(config) => {
                            info!("Loaded config from {:?}", path);
                            return config;
                        }
                        Err(e) => {
                            warn!("Failed to parse config file: {}", e);
                        }
                    },
                    Err(e) => {
                        warn!("Failed to read config file: {}", e);
                    }
                }
            }
        }
        Self::default()
    }

    /// Save config to file
    pub fn save(&self) {
        if let Some(path) = Self::config_path() {
            if let Some(parent) = path.parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    error!("Failed to create config directory: {}", e);
                    return;
                }
            }

            match serde_json::to_string_pretty(self) {
                Ok(content) => {
                    if let Err(e) = std::fs::write(&path, content) {
                        error!("Failed to save config: {}", e);
                    } else {
                        info!("Config saved to {:?}", path);
                    }
                }
                Err(e) => {
                    error!("Failed to serialize config: {}", e);
                }
            }
        }
    }
}

/// Get log directory path (shared across modules)
pub fn log_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("nudgebot").join("logs"))
}

/// Snapshot of registry and daily records persisted across restarts
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedState {
    subscribers: Vec<SubscriberId>,
    records: HashMap<SubscriberId, DailyRecord>,
    last_cycle_date: Option<NaiveDate>,
}

impl PersistedState {
    fn state_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("nudgebot").join("state.json"))
    }

    fn load() -> Option<Self> {
        Self::load_from(&Self::state_path()?)
    }

    fn load_from(path: &std::path::Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(state) => Some(state),
                Err(e) => {
                    warn!("Failed to parse state file, starting fresh: {}", e);
                    None
                }
            },
            Err(e) => {
                warn!("Failed to read state file, starting fresh: {}", e);
                None
            }
        }
    }

    fn save(&self) {
        if let Some(path) = Self::state_path() {
            self.save_to(&path);
        }
    }

    fn save_to(&self, path: &std::path::Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                error!("Failed to create state directory: {}", e);
                return;
            }
        }

        match serde_json::to_string_pretty(self) {
            Ok(content) => {
                if let Err(e) = std::fs::write(path, content) {
                    error!("Failed to save state: {}", e);
                }
            }
            Err(e) => {
                error!("Failed to serialize state: {}", e);
            }
        }
    }
}

/// Application state shared across the daemon's tasks
pub struct AppState {
    /// Opted-in subscriber ids
    pub registry: Arc<SubscriberRegistry>,
    /// Per-subscriber daily records
    pub store: Arc<DailyStateStore>,
    /// Per-subscriber retry timers
    pub timers: Arc<RetryTimerManager>,
    /// Outbound delivery
    pub transport: Arc<dyn Transport>,
    /// Raw configuration (as loaded/saved)
    pub config: Arc<RwLock<AppConfig>>,
    /// Validated campaign parameters, kept in sync with `config`
    pub params: Arc<RwLock<CampaignParams>>,
    /// Date of the most recent daily cycle, None before the first cycle of
    /// the current day
    pub last_cycle: Arc<RwLock<Option<NaiveDate>>>,
}

impl AppState {
    /// Create state from a configuration, building the transport from it.
    ///
    /// Restores the persisted registry/records snapshot when enabled.
    pub fn new(config: AppConfig) -> Result<Self, ConfigError> {
        let params = config.validate()?;

        let transport: Arc<dyn Transport> = match &params.webhook {
            Some(url) => {
                let texts = MessageTexts {
                    prompt: config.prompt_text.clone(),
                    reminder: config.reminder_text.clone(),
                    ack: config.ack_text.clone(),
                };
                let http = HttpTransport::new(url.clone(), texts)
                    .map_err(|e| ConfigError::Transport(e.to_string()))?;
                info!("Outbound transport: webhook {}", url);
                Arc::new(http)
            }
            None => {
                info!("No webhook configured - outbound messages are logged only");
                Arc::new(LogTransport)
            }
        };

        Ok(Self::build(config, params, transport))
    }

    /// Create state with an injected transport (embedding and tests)
    pub fn with_transport(
        config: AppConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConfigError> {
        let params = config.validate()?;
        Ok(Self::build(config, params, transport))
    }

    fn build(config: AppConfig, params: CampaignParams, transport: Arc<dyn Transport>) -> Self {
        let registry = SubscriberRegistry::new();
        let store = DailyStateStore::new();
        let mut last_cycle = None;

        if config.persist_state {
            if let Some(persisted) = PersistedState::load() {
                for id in persisted.subscribers {
                    registry.add(id);
                }
                store.load(persisted.records);
                last_cycle = persisted.last_cycle_date;
                info!("Restored state: {} subscribers", registry.len());
            }
        }

        Self {
            registry: Arc::new(registry),
            store: Arc::new(store),
            timers: Arc::new(RetryTimerManager::new()),
            transport,
            config: Arc::new(RwLock::new(config)),
            params: Arc::new(RwLock::new(params)),
            last_cycle: Arc::new(RwLock::new(last_cycle)),
        }
    }

    /// Current validated campaign parameters
    pub async fn campaign_params(&self) -> CampaignParams {
        self.params.read().await.clone()
    }

    /// Apply and save a new configuration.
    ///
    /// Rejected wholesale when validation fails, so the running parameters
    /// are always valid. Webhook/transport changes take effect on restart.
    pub async fn configure(&self, config: AppConfig) -> Result<(), ConfigError> {
        let params = config.validate()?;

        *self.params.write().await = params;
        config.save();
        *self.config.write().await = config;

        info!("Application configured");
        Ok(())
    }

    /// Write the registry/records snapshot to disk, if persistence is on
    pub async fn persist(&self) {
        if !self.config.read().await.persist_state {
            return;
        }
        let state = PersistedState {
            subscribers: self.registry.list_all(),
            records: self.store.snapshot(),
            last_cycle_date: *self.last_cycle.read().await,
        };
        state.save();
    }
}

/// Initialize logging
pub fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false);

    if let Some(log_dir) = log_dir() {
        let _ = std::fs::create_dir_all(&log_dir);
        let file_appender = tracing_appender::rolling::daily(&log_dir, "nudgebot.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(non_blocking);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let params = AppConfig::default().validate().unwrap();
        assert_eq!(params.retry_interval, Duration::from_secs(900));
        assert_eq!(params.max_reminders, 12);
        assert_eq!(params.timezone, chrono_tz::Europe::Madrid);
        assert!(params.quiet_cutoff.is_some());
    }

    #[test]
    fn test_invalid_trigger_time_is_rejected() {
        let config = AppConfig {
            daily_trigger_time: "25:99".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTime(_))));
    }

    #[test]
    fn test_unknown_timezone_is_rejected() {
        let config = AppConfig {
            timezone: "Mars/Olympus_Mons".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownTimezone(_))
        ));
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let config = AppConfig {
            retry_interval_secs: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroInterval)));
    }

    #[test]
    fn test_bad_webhook_url_is_rejected() {
        let config = AppConfig {
            webhook_url: Some("not a url".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidWebhookUrl(..))
        ));
    }

    #[test]
    fn test_persisted_state_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let date = NaiveDate::from_ymd_opt(2026, 8, 6).unwrap();

        let state = PersistedState {
            subscribers: vec![1, 2],
            records: HashMap::from([(1, DailyRecord::fresh(date))]),
            last_cycle_date: Some(date),
        };
        state.save_to(&path);

        let loaded = PersistedState::load_from(&path).unwrap();
        assert_eq!(loaded.subscribers, vec![1, 2]);
        assert_eq!(loaded.records.get(&1), Some(&DailyRecord::fresh(date)));
        assert_eq!(loaded.last_cycle_date, Some(date));
    }

    #[test]
    fn test_corrupt_state_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(PersistedState::load_from(&path).is_none());
    }
}
