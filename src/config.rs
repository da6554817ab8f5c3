use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub settings: Settings,
}

/// Runtime tunables consumed by the engine and the streaming channels.
/// Defaults match the documented platform behavior; every value can be
/// overridden through the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub heartbeat_interval: Duration,
    pub notification_stream_max: Duration,
    pub tracking_stream_max: Duration,
    pub location_freshness: chrono::Duration,
    pub auto_assign_candidate_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            notification_stream_max: Duration::from_secs(30 * 60),
            tracking_stream_max: Duration::from_secs(60 * 60),
            location_freshness: chrono::Duration::minutes(15),
            auto_assign_candidate_limit: 10,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Settings::default();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            settings: Settings {
                heartbeat_interval: Duration::from_secs(parse_or_default(
                    "HEARTBEAT_INTERVAL_SECS",
                    defaults.heartbeat_interval.as_secs(),
                )?),
                notification_stream_max: Duration::from_secs(parse_or_default(
                    "NOTIFICATION_STREAM_MAX_SECS",
                    defaults.notification_stream_max.as_secs(),
                )?),
                tracking_stream_max: Duration::from_secs(parse_or_default(
                    "TRACKING_STREAM_MAX_SECS",
                    defaults.tracking_stream_max.as_secs(),
                )?),
                location_freshness: chrono::Duration::seconds(parse_or_default(
                    "LOCATION_FRESHNESS_SECS",
                    defaults.location_freshness.num_seconds(),
                )?),
                auto_assign_candidate_limit: parse_or_default(
                    "AUTO_ASSIGN_CANDIDATE_LIMIT",
                    defaults.auto_assign_candidate_limit,
                )?,
            },
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
