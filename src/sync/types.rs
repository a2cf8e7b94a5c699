use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", content = "attempt", rename_all = "camelCase")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
    Reconnecting(u32),
    GaveUp(u32),
}

impl ConnectionStatus {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::GaveUp(_))
    }

    /// Legal successors of a status. Reconnect attempts only ever step up by
    /// one and `Connecting` is reachable only from a resting state.
    pub fn can_transition_to(self, next: ConnectionStatus) -> bool {
        match (self, next) {
            (Self::Connecting, Self::Connected | Self::Disconnected) => true,
            (Self::Connected, Self::Disconnected) => true,
            (Self::Disconnected, Self::Reconnecting(1) | Self::GaveUp(_) | Self::Connecting) => {
                true
            }
            (Self::Reconnecting(_), Self::Connected | Self::GaveUp(_)) => true,
            (Self::Reconnecting(current), Self::Reconnecting(following)) => {
                following == current.saturating_add(1)
            }
            (Self::GaveUp(_), Self::Connecting) => true,
            _ => false,
        }
    }

    pub fn label(self) -> String {
        match self {
            Self::Connecting => "connecting".to_string(),
            Self::Connected => "connected".to_string(),
            Self::Disconnected => "disconnected".to_string(),
            Self::Reconnecting(attempt) => format!("reconnecting ({attempt})"),
            Self::GaveUp(attempts) => format!("gave up after {attempts} attempts"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: u64,
    pub symbol: String,
    pub price: f64,
    pub quantity: u64,
    pub latency_micros: f64,
    pub occurred_at: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeWire {
    pub trade_id: u64,
    pub commodity: String,
    pub price: f64,
    pub quantity: u64,
    pub latency_micros: f64,
    pub timestamp: i64,
}

impl TryFrom<TradeWire> for Trade {
    type Error = AppError;

    fn try_from(value: TradeWire) -> Result<Self, Self::Error> {
        let symbol = value.commodity.trim().to_ascii_uppercase();
        if symbol.is_empty() {
            return Err(AppError::InvalidArgument(
                "trade commodity must be non-empty".to_string(),
            ));
        }
        if !value.price.is_finite() || value.price < 0.0 {
            return Err(AppError::InvalidArgument(
                "trade price must be finite and non-negative".to_string(),
            ));
        }
        if !value.latency_micros.is_finite() || value.latency_micros < 0.0 {
            return Err(AppError::InvalidArgument(
                "trade latencyMicros must be finite and non-negative".to_string(),
            ));
        }

        Ok(Self {
            id: value.trade_id,
            symbol,
            price: value.price,
            quantity: value.quantity,
            latency_micros: value.latency_micros,
            occurred_at: value.timestamp,
        })
    }
}

pub fn parse_trade_payload(payload: &mut [u8]) -> Result<Trade, AppError> {
    let wire: TradeWire = simd_json::serde::from_slice(payload)?;
    wire.try_into()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LatencySample {
    pub captured_at: i64,
    pub latency_micros: f64,
}

impl LatencySample {
    pub fn from_trade(trade: &Trade, captured_at: i64) -> Self {
        Self {
            captured_at,
            latency_micros: trade.latency_micros,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SymbolMetrics {
    pub symbol: String,
    pub orders_received: u64,
    pub trades_executed: u64,
    pub complete_fills: u64,
    pub partial_fills: u64,
    pub fill_rate: f64,
    pub avg_slippage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub total_orders: u64,
    pub total_trades: u64,
    pub avg_latency_micros: f64,
    pub per_symbol: BTreeMap<String, SymbolMetrics>,
}

impl MetricsSnapshot {
    pub fn symbol(&self, symbol: &str) -> Option<&SymbolMetrics> {
        self.per_symbol.get(symbol)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolMetricsWire {
    pub commodity: Option<String>,
    pub orders_received: u64,
    pub trades_executed: u64,
    #[serde(default)]
    pub complete_fills: u64,
    #[serde(default)]
    pub partial_fills: u64,
    pub fill_rate: f64,
    pub avg_slippage: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsWire {
    pub total_orders: u64,
    pub total_trades: u64,
    pub avg_latency_micros: f64,
    #[serde(default, alias = "perSymbol")]
    pub commodities: BTreeMap<String, SymbolMetricsWire>,
}

impl TryFrom<MetricsWire> for MetricsSnapshot {
    type Error = AppError;

    fn try_from(value: MetricsWire) -> Result<Self, Self::Error> {
        if !value.avg_latency_micros.is_finite() || value.avg_latency_micros < 0.0 {
            return Err(AppError::InvalidArgument(
                "avgLatencyMicros must be finite and non-negative".to_string(),
            ));
        }

        let mut per_symbol = BTreeMap::new();
        for (key, entry) in value.commodities {
            if !(0.0..=100.0).contains(&entry.fill_rate) {
                return Err(AppError::InvalidArgument(format!(
                    "fillRate for {key} must be between 0 and 100"
                )));
            }
            if !entry.avg_slippage.is_finite() {
                return Err(AppError::InvalidArgument(format!(
                    "avgSlippage for {key} must be finite"
                )));
            }

            let symbol = entry
                .commodity
                .map(|name| name.trim().to_ascii_uppercase())
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| key.to_ascii_uppercase());
            per_symbol.insert(
                symbol.clone(),
                SymbolMetrics {
                    symbol,
                    orders_received: entry.orders_received,
                    trades_executed: entry.trades_executed,
                    complete_fills: entry.complete_fills,
                    partial_fills: entry.partial_fills,
                    fill_rate: entry.fill_rate,
                    avg_slippage: entry.avg_slippage,
                },
            );
        }

        Ok(Self {
            total_orders: value.total_orders,
            total_trades: value.total_trades,
            avg_latency_micros: value.avg_latency_micros,
            per_symbol,
        })
    }
}

pub fn parse_metrics_payload(payload: &mut [u8]) -> Result<MetricsSnapshot, AppError> {
    let wire: MetricsWire = simd_json::serde::from_slice(payload)?;
    wire.try_into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PriceLevel {
    pub order_id: Option<u64>,
    pub price: f64,
    pub quantity: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderBookSnapshot {
    pub symbol: String,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    pub best_bid: f64,
    pub best_ask: f64,
    pub spread: f64,
    pub bid_count: u64,
    pub ask_count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceLevelWire {
    pub order_id: Option<u64>,
    pub price: f64,
    pub quantity: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBookWire {
    pub commodity: String,
    pub bids: Vec<PriceLevelWire>,
    pub asks: Vec<PriceLevelWire>,
    pub best_bid: f64,
    pub best_ask: f64,
    pub spread: f64,
    #[serde(default)]
    pub bid_count: Option<u64>,
    #[serde(default)]
    pub ask_count: Option<u64>,
}

fn convert_levels(side: &str, levels: Vec<PriceLevelWire>) -> Result<Vec<PriceLevel>, AppError> {
    let mut converted = Vec::with_capacity(levels.len());
    for level in levels {
        if !level.price.is_finite() {
            return Err(AppError::InvalidArgument(format!(
                "{side} price must be finite"
            )));
        }
        converted.push(PriceLevel {
            order_id: level.order_id,
            price: level.price,
            quantity: level.quantity,
        });
    }
    Ok(converted)
}

impl OrderBookWire {
    pub fn into_snapshot(self, expected_symbol: &str) -> Result<OrderBookSnapshot, AppError> {
        let symbol = self.commodity.trim().to_ascii_uppercase();
        if symbol != expected_symbol {
            return Err(AppError::InvalidArgument(format!(
                "order book for {symbol} returned when {expected_symbol} was requested"
            )));
        }
        if !self.best_bid.is_finite() || !self.best_ask.is_finite() || !self.spread.is_finite() {
            return Err(AppError::InvalidArgument(
                "bestBid/bestAsk/spread must be finite".to_string(),
            ));
        }

        let bids = convert_levels("bid", self.bids)?;
        let asks = convert_levels("ask", self.asks)?;
        if bids.windows(2).any(|pair| pair[0].price < pair[1].price) {
            return Err(AppError::InvalidArgument(
                "bids must be ordered by descending price".to_string(),
            ));
        }
        if asks.windows(2).any(|pair| pair[0].price > pair[1].price) {
            return Err(AppError::InvalidArgument(
                "asks must be ordered by ascending price".to_string(),
            ));
        }

        let bid_count = self.bid_count.unwrap_or(bids.len() as u64);
        let ask_count = self.ask_count.unwrap_or(asks.len() as u64);
        Ok(OrderBookSnapshot {
            symbol,
            bids,
            asks,
            best_bid: self.best_bid,
            best_ask: self.best_ask,
            spread: self.spread,
            bid_count,
            ask_count,
        })
    }
}

pub fn parse_order_book_payload(
    payload: &mut [u8],
    expected_symbol: &str,
) -> Result<OrderBookSnapshot, AppError> {
    let wire: OrderBookWire = simd_json::serde::from_slice(payload)?;
    wire.into_snapshot(expected_symbol)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_trade_payload_with_identical_fields() {
        let mut payload = br#"{"tradeId":1,"commodity":"OIL","price":82.5,"quantity":10,"latencyMicros":45.2,"timestamp":1700000000000}"#.to_vec();
        let trade = parse_trade_payload(&mut payload).expect("trade payload should parse");

        assert_eq!(trade.id, 1);
        assert_eq!(trade.symbol, "OIL");
        assert_eq!(trade.price, 82.5);
        assert_eq!(trade.quantity, 10);
        assert_eq!(trade.latency_micros, 45.2);
        assert_eq!(trade.occurred_at, 1_700_000_000_000);
    }

    #[test]
    fn ignores_extra_trade_fields() {
        let mut payload = br#"{"tradeId":9,"commodity":"gold","price":1900,"quantity":2,"buyOrderId":4,"sellOrderId":5,"latencyMicros":12,"timestamp":1}"#.to_vec();
        let trade = parse_trade_payload(&mut payload).expect("extra fields are ignored");

        assert_eq!(trade.symbol, "GOLD");
        assert_eq!(trade.price, 1900.0);
        assert_eq!(trade.latency_micros, 12.0);
    }

    #[test]
    fn rejects_trade_with_missing_fields() {
        let mut payload = br#"{"tradeId":1,"commodity":"OIL","price":82.5}"#.to_vec();
        assert!(parse_trade_payload(&mut payload).is_err());
    }

    #[test]
    fn rejects_trade_with_negative_latency() {
        let mut payload = br#"{"tradeId":1,"commodity":"OIL","price":82.5,"quantity":10,"latencyMicros":-1.0,"timestamp":1}"#.to_vec();
        assert!(parse_trade_payload(&mut payload).is_err());
    }

    #[test]
    fn parses_metrics_with_commodity_map() {
        let mut payload = br#"{"totalOrders":120,"totalTrades":40,"avgLatencyMicros":38.5,"commodities":{"OIL":{"commodity":"OIL","ordersReceived":60,"tradesExecuted":20,"completeFills":15,"partialFills":5,"fillRate":75.0,"avgSlippage":0.012}}}"#.to_vec();
        let metrics = parse_metrics_payload(&mut payload).expect("metrics payload should parse");

        assert_eq!(metrics.total_orders, 120);
        assert_eq!(metrics.total_trades, 40);
        let oil = metrics.symbol("OIL").expect("OIL metrics should exist");
        assert_eq!(oil.fill_rate, 75.0);
        assert_eq!(oil.complete_fills, 15);
    }

    #[test]
    fn rejects_metrics_with_fill_rate_out_of_range() {
        let mut payload = br#"{"totalOrders":1,"totalTrades":1,"avgLatencyMicros":1.0,"commodities":{"OIL":{"ordersReceived":1,"tradesExecuted":1,"fillRate":140.0,"avgSlippage":0.0}}}"#.to_vec();
        assert!(parse_metrics_payload(&mut payload).is_err());
    }

    #[test]
    fn parses_order_book_and_checks_symbol() {
        let body = r#"{"commodity":"OIL","bids":[{"orderId":3,"price":82.4,"quantity":5,"side":"BUY"},{"orderId":1,"price":82.1,"quantity":2,"side":"BUY"}],"asks":[{"orderId":7,"price":82.6,"quantity":4,"side":"SELL"}],"bestBid":82.4,"bestAsk":82.6,"spread":0.2,"bidCount":2,"askCount":1}"#;

        let book = parse_order_book_payload(&mut body.as_bytes().to_vec(), "OIL")
            .expect("order book should parse");
        assert_eq!(book.bids.len(), 2);
        assert_eq!(book.asks[0].order_id, Some(7));
        assert_eq!(book.best_bid, 82.4);

        let mismatch = parse_order_book_payload(&mut body.as_bytes().to_vec(), "GOLD");
        assert!(mismatch.is_err());
    }

    #[test]
    fn rejects_unsorted_order_book() {
        let mut payload = br#"{"commodity":"OIL","bids":[{"price":80.0,"quantity":1},{"price":81.0,"quantity":1}],"asks":[],"bestBid":81.0,"bestAsk":0.0,"spread":0.0}"#.to_vec();
        assert!(parse_order_book_payload(&mut payload, "OIL").is_err());
    }

    #[test]
    fn reconnect_attempts_only_step_by_one() {
        assert!(ConnectionStatus::Reconnecting(1).can_transition_to(ConnectionStatus::Reconnecting(2)));
        assert!(!ConnectionStatus::Reconnecting(1).can_transition_to(ConnectionStatus::Reconnecting(3)));
        assert!(!ConnectionStatus::Connected.can_transition_to(ConnectionStatus::Reconnecting(1)));
        assert!(ConnectionStatus::Disconnected.can_transition_to(ConnectionStatus::Reconnecting(1)));
        assert!(ConnectionStatus::GaveUp(5).can_transition_to(ConnectionStatus::Connecting));
        assert!(!ConnectionStatus::GaveUp(5).can_transition_to(ConnectionStatus::Connected));
    }
}
