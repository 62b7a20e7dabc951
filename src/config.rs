//! Runtime configuration.
//!
//! Plain structured config: TOML file plus `DUEPULSE_*` environment
//! overrides for the handful of values worth tuning per deployment. All
//! schedules are explicit intervals or calendar triggers; no scheduling
//! pattern syntax.

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::digest::DigestSchedule;
use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Reminder scan interval in seconds.
    pub tick_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 900,
        }
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.tick_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Heartbeat age in seconds below which an observer is online.
    pub online_within_secs: i64,
    /// Heartbeat age in seconds below which an observer is away.
    pub away_within_secs: i64,
    /// Disconnect debounce before announcing offline.
    pub disconnect_grace_secs: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            online_within_secs: 300,
            away_within_secs: 1800,
            disconnect_grace_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Bounded queue capacity for external channel sends.
    pub queue_capacity: usize,
    /// Worker tasks draining the queue.
    pub workers: usize,
    /// Chat-webhook endpoint; webhook delivery is disabled when unset.
    pub webhook_endpoint: Option<String>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            workers: 4,
            webhook_endpoint: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    pub presence: PresenceConfig,
    pub delivery: DeliveryConfig,
    /// Digest triggers. An absent key gets the defaults (daily 08:00 UTC
    /// plus Monday 08:00 UTC); an explicit empty array disables digests.
    #[serde(default = "AppConfig::default_digests")]
    pub digests: Vec<DigestSchedule>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            presence: PresenceConfig::default(),
            delivery: DeliveryConfig::default(),
            digests: Self::default_digests(),
        }
    }
}

impl AppConfig {
    pub fn default_digests() -> Vec<DigestSchedule> {
        vec![
            DigestSchedule::Daily { hour: 8, minute: 0 },
            DigestSchedule::Weekly {
                weekday: Weekday::Mon,
                hour: 8,
                minute: 0,
            },
        ]
    }

    /// Parse from TOML and validate.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|e| ConfigError::InvalidValue {
            key: "config".to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus `DUEPULSE_*` environment overrides. Loads `.env`
    /// first so local development picks up a checked-out env file.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        if let Some(value) = env_parse::<u64>("DUEPULSE_TICK_INTERVAL_SECS")? {
            config.scheduler.tick_interval_secs = value;
        }
        if let Some(value) = env_parse::<i64>("DUEPULSE_ONLINE_WITHIN_SECS")? {
            config.presence.online_within_secs = value;
        }
        if let Some(value) = env_parse::<i64>("DUEPULSE_AWAY_WITHIN_SECS")? {
            config.presence.away_within_secs = value;
        }
        if let Some(value) = env_parse::<u64>("DUEPULSE_DISCONNECT_GRACE_SECS")? {
            config.presence.disconnect_grace_secs = value;
        }
        if let Some(value) = env_parse::<usize>("DUEPULSE_DELIVERY_QUEUE_CAPACITY")? {
            config.delivery.queue_capacity = value;
        }
        if let Some(value) = env_parse::<usize>("DUEPULSE_DELIVERY_WORKERS")? {
            config.delivery.workers = value;
        }
        if let Ok(endpoint) = std::env::var("DUEPULSE_WEBHOOK_ENDPOINT") {
            if !endpoint.is_empty() {
                config.delivery.webhook_endpoint = Some(endpoint);
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.tick_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "scheduler.tick_interval_secs".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.presence.online_within_secs <= 0
            || self.presence.away_within_secs <= self.presence.online_within_secs
        {
            return Err(ConfigError::InvalidValue {
                key: "presence".to_string(),
                message: "requires 0 < online_within_secs < away_within_secs".to_string(),
            });
        }
        if self.delivery.queue_capacity == 0 || self.delivery.workers == 0 {
            return Err(ConfigError::InvalidValue {
                key: "delivery".to_string(),
                message: "queue_capacity and workers must be positive".to_string(),
            });
        }
        for (index, digest) in self.digests.iter().enumerate() {
            let (hour, minute) = match *digest {
                DigestSchedule::Daily { hour, minute }
                | DigestSchedule::Weekly { hour, minute, .. } => (hour, minute),
            };
            if hour > 23 || minute > 59 {
                return Err(ConfigError::InvalidValue {
                    key: format!("digests[{index}]"),
                    message: format!("invalid time {hour:02}:{minute:02}"),
                });
            }
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse().map(Some).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{e}"),
        }),
        Err(_) => Ok(None),
    }
}
