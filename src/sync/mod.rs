pub mod buffer;
pub mod config;
pub mod coordinator;
pub mod feed;
pub mod polling;
pub mod reconnect;
pub mod rest;
pub mod state;
pub mod stomp;
pub mod subscription;
pub mod types;

pub const METRICS_PATH: &str = "/api/metrics";
pub const ORDER_BOOK_PATH: &str = "/api/orderbook";
pub const TRADE_SUBSCRIPTION_ID: &str = "sub-0";
pub const SUPPORTED_SYMBOLS: [&str; 5] = ["OIL", "GOLD", "SILVER", "COPPER", "GAS"];
