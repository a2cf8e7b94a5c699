use crate::error::{AppError, PollError};
use crate::sync::types::{
    parse_metrics_payload, parse_order_book_payload, MetricsSnapshot, OrderBookSnapshot,
};
use crate::sync::{METRICS_PATH, ORDER_BOOK_PATH};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Pull side of the engine: aggregate metrics and per-symbol order books.
#[async_trait]
pub trait SnapshotSource: Send + Sync + 'static {
    async fn fetch_metrics(&self) -> Result<MetricsSnapshot, PollError>;

    async fn fetch_order_book(&self, symbol: &str) -> Result<OrderBookSnapshot, PollError>;
}

fn metrics_endpoint(base_url: &str) -> String {
    format!("{base_url}{METRICS_PATH}")
}

fn order_book_endpoint(base_url: &str, symbol: &str, depth: u16) -> String {
    format!(
        "{base_url}{ORDER_BOOK_PATH}/{}?depth={depth}",
        symbol.to_ascii_uppercase()
    )
}

pub struct HttpSnapshotSource {
    client: Client,
    base_url: String,
    order_book_depth: u16,
}

impl HttpSnapshotSource {
    pub fn new(
        base_url: String,
        order_book_depth: u16,
        request_timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            base_url,
            order_book_depth,
        })
    }

    async fn fetch_body(&self, endpoint: String) -> Result<Vec<u8>, PollError> {
        let response = self.client.get(endpoint).send().await?.error_for_status()?;
        let body = response.bytes().await?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn fetch_metrics(&self) -> Result<MetricsSnapshot, PollError> {
        let mut body = self.fetch_body(metrics_endpoint(&self.base_url)).await?;
        Ok(parse_metrics_payload(&mut body)?)
    }

    async fn fetch_order_book(&self, symbol: &str) -> Result<OrderBookSnapshot, PollError> {
        let endpoint = order_book_endpoint(&self.base_url, symbol, self.order_book_depth);
        let mut body = self.fetch_body(endpoint).await?;
        Ok(parse_order_book_payload(&mut body, symbol)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_endpoint_is_correct() {
        let endpoint = metrics_endpoint("http://localhost:8080");
        assert_eq!(endpoint, "http://localhost:8080/api/metrics");
    }

    #[test]
    fn order_book_endpoint_uses_uppercase_symbol_and_depth() {
        let endpoint = order_book_endpoint("http://localhost:8080", "gold", 10);
        assert!(endpoint.ends_with("/api/orderbook/GOLD?depth=10"));
    }
}
