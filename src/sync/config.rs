use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_FEED_URL: &str = "ws://localhost:8080/ws/websocket";
pub const DEFAULT_TRADE_TOPIC: &str = "/topic/trades";
pub const DEFAULT_SYMBOL: &str = "OIL";
pub const DEFAULT_METRICS_POLL_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_ORDER_BOOK_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_ORDER_BOOK_DEPTH: u16 = 10;
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 3_000;
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_TRADE_HISTORY_CAPACITY: usize = 50;
pub const DEFAULT_LATENCY_WINDOW_CAPACITY: usize = 30;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const MIN_POLL_INTERVAL_MS: u64 = 100;
pub const MAX_POLL_INTERVAL_MS: u64 = 60_000;
pub const MIN_ORDER_BOOK_DEPTH: u16 = 1;
pub const MAX_ORDER_BOOK_DEPTH: u16 = 100;
pub const MIN_RECONNECT_DELAY_MS: u64 = 100;
pub const MAX_RECONNECT_DELAY_MS: u64 = 60_000;
pub const MIN_RECONNECT_ATTEMPTS: u32 = 1;
pub const MAX_RECONNECT_ATTEMPTS: u32 = 20;
pub const MIN_BUFFER_CAPACITY: usize = 1;
pub const MAX_BUFFER_CAPACITY: usize = 1_000;
pub const MIN_TIMEOUT_MS: u64 = 100;
pub const MAX_TIMEOUT_MS: u64 = 60_000;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SyncArgs {
    pub api_base_url: Option<String>,
    pub feed_url: Option<String>,
    pub trade_topic: Option<String>,
    pub symbol: Option<String>,
    pub metrics_poll_interval_ms: Option<u64>,
    pub order_book_poll_interval_ms: Option<u64>,
    pub order_book_depth: Option<u16>,
    pub reconnect_delay_ms: Option<u64>,
    pub max_reconnect_attempts: Option<u32>,
    pub trade_history_capacity: Option<usize>,
    pub latency_window_capacity: Option<usize>,
    pub request_timeout_ms: Option<u64>,
    pub handshake_timeout_ms: Option<u64>,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub api_base_url: String,
    pub feed_url: String,
    pub trade_topic: String,
    pub symbol: String,
    pub metrics_poll_interval_ms: u64,
    pub order_book_poll_interval_ms: u64,
    pub order_book_depth: u16,
    pub reconnect_delay_ms: u64,
    pub max_reconnect_attempts: u32,
    pub trade_history_capacity: usize,
    pub latency_window_capacity: usize,
    pub request_timeout_ms: u64,
    pub handshake_timeout_ms: u64,
    pub log_level: String,
}

impl SyncConfig {
    pub fn metrics_poll_interval(&self) -> Duration {
        Duration::from_millis(self.metrics_poll_interval_ms)
    }

    pub fn order_book_poll_interval(&self) -> Duration {
        Duration::from_millis(self.order_book_poll_interval_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

pub fn normalize_symbol(raw: &str) -> Result<String, AppError> {
    let symbol = raw.trim().to_ascii_uppercase();
    if symbol.is_empty() || !symbol.chars().all(|ch| ch.is_ascii_alphanumeric()) {
        return Err(AppError::InvalidArgument(
            "symbol must be non-empty alphanumeric ASCII".to_string(),
        ));
    }
    Ok(symbol)
}

fn normalize_url(field: &str, raw: String, schemes: &[&str]) -> Result<String, AppError> {
    let url = raw.trim().trim_end_matches('/').to_string();
    if !schemes.iter().any(|scheme| url.starts_with(scheme)) {
        return Err(AppError::InvalidArgument(format!(
            "{field} must start with one of {}",
            schemes.join(", ")
        )));
    }
    Ok(url)
}

fn bounded<T>(field: &str, value: T, min: T, max: T) -> Result<T, AppError>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    if value < min || value > max {
        return Err(AppError::InvalidArgument(format!(
            "{field} must be between {min} and {max}"
        )));
    }
    Ok(value)
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_parsed<T>(name: &str) -> Result<Option<T>, AppError>
where
    T: std::str::FromStr<Err = std::num::ParseIntError>,
{
    match env_value(name) {
        Some(raw) => raw.parse::<T>().map(Some).map_err(|error| {
            AppError::InvalidArgument(format!("{name} must be an integer: {error}"))
        }),
        None => Ok(None),
    }
}

impl SyncArgs {
    /// Reads `DASHBOARD_*` variables. Unset or blank variables stay `None`
    /// so `normalize` falls back to the defaults.
    pub fn from_env() -> Result<Self, AppError> {
        Ok(Self {
            api_base_url: env_value("DASHBOARD_API_URL"),
            feed_url: env_value("DASHBOARD_FEED_URL"),
            trade_topic: env_value("DASHBOARD_TOPIC"),
            symbol: env_value("DASHBOARD_SYMBOL"),
            metrics_poll_interval_ms: env_parsed("DASHBOARD_METRICS_POLL_MS")?,
            order_book_poll_interval_ms: env_parsed("DASHBOARD_ORDER_BOOK_POLL_MS")?,
            order_book_depth: env_parsed("DASHBOARD_ORDER_BOOK_DEPTH")?,
            reconnect_delay_ms: env_parsed("DASHBOARD_RECONNECT_DELAY_MS")?,
            max_reconnect_attempts: env_parsed("DASHBOARD_MAX_RECONNECT_ATTEMPTS")?,
            trade_history_capacity: None,
            latency_window_capacity: None,
            request_timeout_ms: env_parsed("DASHBOARD_REQUEST_TIMEOUT_MS")?,
            handshake_timeout_ms: env_parsed("DASHBOARD_HANDSHAKE_TIMEOUT_MS")?,
            log_level: env_value("DASHBOARD_LOG_LEVEL"),
        })
    }

    pub fn normalize(self) -> Result<SyncConfig, AppError> {
        let api_base_url = normalize_url(
            "apiBaseUrl",
            self.api_base_url
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            &["http://", "https://"],
        )?;
        let feed_url = normalize_url(
            "feedUrl",
            self.feed_url.unwrap_or_else(|| DEFAULT_FEED_URL.to_string()),
            &["ws://", "wss://"],
        )?;

        let trade_topic = self
            .trade_topic
            .unwrap_or_else(|| DEFAULT_TRADE_TOPIC.to_string())
            .trim()
            .to_string();
        if !trade_topic.starts_with('/') || trade_topic.chars().any(char::is_whitespace) {
            return Err(AppError::InvalidArgument(
                "tradeTopic must be an absolute destination without whitespace".to_string(),
            ));
        }

        let symbol = normalize_symbol(self.symbol.as_deref().unwrap_or(DEFAULT_SYMBOL))?;

        let metrics_poll_interval_ms = bounded(
            "metricsPollIntervalMs",
            self.metrics_poll_interval_ms
                .unwrap_or(DEFAULT_METRICS_POLL_INTERVAL_MS),
            MIN_POLL_INTERVAL_MS,
            MAX_POLL_INTERVAL_MS,
        )?;
        let order_book_poll_interval_ms = bounded(
            "orderBookPollIntervalMs",
            self.order_book_poll_interval_ms
                .unwrap_or(DEFAULT_ORDER_BOOK_POLL_INTERVAL_MS),
            MIN_POLL_INTERVAL_MS,
            MAX_POLL_INTERVAL_MS,
        )?;
        let order_book_depth = bounded(
            "orderBookDepth",
            self.order_book_depth.unwrap_or(DEFAULT_ORDER_BOOK_DEPTH),
            MIN_ORDER_BOOK_DEPTH,
            MAX_ORDER_BOOK_DEPTH,
        )?;
        let reconnect_delay_ms = bounded(
            "reconnectDelayMs",
            self.reconnect_delay_ms.unwrap_or(DEFAULT_RECONNECT_DELAY_MS),
            MIN_RECONNECT_DELAY_MS,
            MAX_RECONNECT_DELAY_MS,
        )?;
        let max_reconnect_attempts = bounded(
            "maxReconnectAttempts",
            self.max_reconnect_attempts
                .unwrap_or(DEFAULT_MAX_RECONNECT_ATTEMPTS),
            MIN_RECONNECT_ATTEMPTS,
            MAX_RECONNECT_ATTEMPTS,
        )?;
        let trade_history_capacity = bounded(
            "tradeHistoryCapacity",
            self.trade_history_capacity
                .unwrap_or(DEFAULT_TRADE_HISTORY_CAPACITY),
            MIN_BUFFER_CAPACITY,
            MAX_BUFFER_CAPACITY,
        )?;
        let latency_window_capacity = bounded(
            "latencyWindowCapacity",
            self.latency_window_capacity
                .unwrap_or(DEFAULT_LATENCY_WINDOW_CAPACITY),
            MIN_BUFFER_CAPACITY,
            MAX_BUFFER_CAPACITY,
        )?;
        let request_timeout_ms = bounded(
            "requestTimeoutMs",
            self.request_timeout_ms.unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
            MIN_TIMEOUT_MS,
            MAX_TIMEOUT_MS,
        )?;
        let handshake_timeout_ms = bounded(
            "handshakeTimeoutMs",
            self.handshake_timeout_ms
                .unwrap_or(DEFAULT_HANDSHAKE_TIMEOUT_MS),
            MIN_TIMEOUT_MS,
            MAX_TIMEOUT_MS,
        )?;

        let log_level = self
            .log_level
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
            .trim()
            .to_ascii_lowercase();
        if !LOG_LEVELS.contains(&log_level.as_str()) {
            return Err(AppError::InvalidArgument(format!(
                "logLevel must be one of {}",
                LOG_LEVELS.join(", ")
            )));
        }

        Ok(SyncConfig {
            api_base_url,
            feed_url,
            trade_topic,
            symbol,
            metrics_poll_interval_ms,
            order_book_poll_interval_ms,
            order_book_depth,
            reconnect_delay_ms,
            max_reconnect_attempts,
            trade_history_capacity,
            latency_window_capacity,
            request_timeout_ms,
            handshake_timeout_ms,
            log_level,
        })
    }
}
