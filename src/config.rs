//! Service configuration loaded from environment variables.

use crate::error::ConfigError;
use crate::scheduler::CronScheduler;
use std::time::Duration;

pub const DEFAULT_SCHEDULES: &str = "0 0 12 * * *;0 0 * * * *";

#[derive(Debug, Clone)]
pub struct Config {
    /// Document store endpoint (connection string).
    pub database_url: String,
    /// Database (schema) holding the deals collection.
    pub database_name: String,
    pub database_key: Option<String>,
    pub deals_collection: String,

    pub steam_country: String,
    pub steam_language: String,

    pub target_currency: String,
    pub rates_api_url: String,
    pub rate_ttl: Duration,

    /// Bound on every outbound HTTP request.
    pub http_timeout: Duration,
    pub fetch_timeout: Duration,
    /// Bound on a whole fetch-and-reconcile cycle.
    pub run_timeout: Duration,
    /// Cron expressions (seconds field first), all sharing one runner.
    pub schedules: Vec<String>,
    pub run_on_start: bool,

    pub notify_webhook_url: Option<String>,
    pub notify_min_discount: f64,

    pub port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `DATABASE_URL`: document store endpoint
    /// - `DATABASE_NAME`: database (schema) name
    ///
    /// Everything else falls back to a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = required("DATABASE_URL")?.trim_end_matches('/').to_string();
        let database_name = required("DATABASE_NAME")?;
        let database_key = optional("DATABASE_KEY");
        let deals_collection = optional("DEALS_COLLECTION").unwrap_or_else(|| "game_deals".into());

        let steam_country = optional("STEAM_COUNTRY").unwrap_or_else(|| "us".into());
        let steam_language = optional("STEAM_LANGUAGE").unwrap_or_else(|| "en".into());

        let target_currency = optional("TARGET_CURRENCY")
            .unwrap_or_else(|| "BRL".into())
            .to_uppercase();
        let rates_api_url = optional("RATES_API_URL")
            .unwrap_or_else(|| "https://economia.awesomeapi.com.br".into())
            .trim_end_matches('/')
            .to_string();
        let rate_ttl = Duration::from_secs(parse_or("RATE_TTL_SECS", 3600u64)?);
        let http_timeout = Duration::from_secs(parse_or("HTTP_TIMEOUT_SECS", 30u64)?);
        let fetch_timeout = Duration::from_secs(parse_or("FETCH_TIMEOUT_SECS", 30u64)?);
        let run_timeout = Duration::from_secs(parse_or("RUN_TIMEOUT_SECS", 600u64)?);

        let schedules: Vec<String> = optional("SCHEDULES")
            .unwrap_or_else(|| DEFAULT_SCHEDULES.into())
            .split(';')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if schedules.is_empty() {
            return Err(ConfigError::Invalid {
                key: "SCHEDULES",
                reason: "at least one cron expression is required".into(),
            });
        }
        if let Some(bad) = schedules.iter().find(|s| !CronScheduler::validate(s)) {
            return Err(ConfigError::Invalid {
                key: "SCHEDULES",
                reason: format!("invalid cron expression '{}'", bad),
            });
        }
        let run_on_start = parse_or("RUN_ON_START", false)?;

        let notify_webhook_url = optional("NOTIFY_WEBHOOK_URL");
        let notify_min_discount = parse_or("NOTIFY_MIN_DISCOUNT", 0.0f64)?;
        if !(0.0..=1.0).contains(&notify_min_discount) {
            return Err(ConfigError::Invalid {
                key: "NOTIFY_MIN_DISCOUNT",
                reason: "must be between 0 and 1".into(),
            });
        }

        let port = parse_or("PORT", 3003u16)?;

        Ok(Self {
            database_url,
            database_name,
            database_key,
            deals_collection,
            steam_country,
            steam_language,
            target_currency,
            rates_api_url,
            rate_ttl,
            http_timeout,
            fetch_timeout,
            run_timeout,
            schedules,
            run_on_start,
            notify_webhook_url,
            notify_min_discount,
            port,
        })
    }
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    optional(key).ok_or(ConfigError::Missing(key))
}

fn parse_or<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match optional(key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
