// region:    --- Imports
use std::{env, fmt::Display, str::FromStr};
use thiserror::Error;
use tracing::{info, warn};
// endregion: --- Imports

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Service configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub kafka_brokers: Option<String>,
    pub kafka_topic: String,
    pub clerk_api_url: String,
    pub clerk_secret_key: Option<String>,
    pub auction: AuctionRules,
    pub settlement_grace_ms: u64,
    pub sweep_interval_secs: u64,
    pub stalled_settlement_secs: i64,
}

/// Rules the engine applies to every auction.
#[derive(Debug, Clone)]
pub struct AuctionRules {
    /// Minimum distance between "now" and `start_time` at create/update.
    pub lead_time_secs: i64,
    pub enforce_min_bid_increment: bool,
    /// Item status id written on a successful sale.
    pub pending_delivery_status: String,
    pub max_bid_retries: u32,
}

impl Default for AuctionRules {
    fn default() -> Self {
        Self {
            lead_time_secs: 300,
            enforce_min_bid_increment: true,
            pending_delivery_status: "pending-delivery".to_string(),
            max_bid_retries: 100,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let defaults = AuctionRules::default();
        Ok(Self {
            port: try_load("PORT", "3000")?,
            database_url: optional("DATABASE_URL"),
            db_max_connections: try_load("DB_MAX_CONNECTIONS", "5")?,
            kafka_brokers: optional("KAFKA_BROKERS"),
            kafka_topic: try_load("KAFKA_TOPIC", "auction-events")?,
            clerk_api_url: try_load("CLERK_API_URL", "https://api.clerk.com/v1")?,
            clerk_secret_key: optional("CLERK_SECRET_KEY"),
            auction: AuctionRules {
                lead_time_secs: try_load("AUCTION_LEAD_TIME_SECS", "300")?,
                enforce_min_bid_increment: try_load("ENFORCE_MIN_BID_INCREMENT", "true")?,
                pending_delivery_status: try_load(
                    "PENDING_DELIVERY_STATUS",
                    &defaults.pending_delivery_status,
                )?,
                max_bid_retries: defaults.max_bid_retries,
            },
            settlement_grace_ms: try_load("SETTLEMENT_GRACE_MS", "1000")?,
            sweep_interval_secs: try_load("SETTLEMENT_SWEEP_SECS", "30")?,
            stalled_settlement_secs: try_load("STALLED_SETTLEMENT_SECS", "60")?,
        })
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let raw = optional(key).unwrap_or_else(|| {
        info!("{:<12} --> {key} not set, using default: {default}", "Config");
        default.to_string()
    });
    parse_value(key, &raw)
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    raw.trim().parse().map_err(|e: T::Err| {
        warn!("{:<12} --> Invalid {key} value: {e}", "Config");
        ConfigError::InvalidValue {
            key: key.to_string(),
            reason: e.to_string(),
        }
    })
}
