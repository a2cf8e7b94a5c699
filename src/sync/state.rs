use crate::error::PollError;
use crate::sync::buffer::BoundedEventBuffer;
use crate::sync::polling::{PollOutcome, PollTracker};
use crate::sync::types::{
    ConnectionStatus, LatencySample, MetricsSnapshot, OrderBookSnapshot, Trade,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PollHealth {
    pub metrics: PollTracker,
    pub order_books: BTreeMap<String, PollTracker>,
}

impl PollHealth {
    pub fn metrics_degraded(&self) -> bool {
        self.metrics.is_degraded()
    }

    pub fn order_book_degraded(&self, symbol: &str) -> bool {
        self.order_books
            .get(symbol)
            .is_some_and(PollTracker::is_degraded)
    }
}

/// Immutable point-in-time view handed to readers. Trades are newest-first,
/// the latency window oldest-first.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub trades: Vec<Trade>,
    pub latency_window: Vec<LatencySample>,
    pub metrics: Option<Arc<MetricsSnapshot>>,
    pub order_books: BTreeMap<String, Arc<OrderBookSnapshot>>,
    pub connection_status: ConnectionStatus,
    pub poll_health: PollHealth,
    pub advisory: Option<String>,
    pub trades_received: u64,
}

impl DashboardSnapshot {
    pub fn trades_for<'a>(&'a self, symbol: &'a str) -> impl Iterator<Item = &'a Trade> + 'a {
        self.trades.iter().filter(move |trade| trade.symbol == symbol)
    }

    pub fn order_book(&self, symbol: &str) -> Option<&Arc<OrderBookSnapshot>> {
        self.order_books.get(symbol)
    }
}

/// All mutable dashboard state. Only the coordinator task owns one.
#[derive(Debug)]
pub struct SyncState {
    trades: BoundedEventBuffer<Trade>,
    latency_window: BoundedEventBuffer<LatencySample>,
    metrics: Option<Arc<MetricsSnapshot>>,
    order_books: BTreeMap<String, Arc<OrderBookSnapshot>>,
    connection_status: ConnectionStatus,
    poll_health: PollHealth,
    trades_received: u64,
}

impl SyncState {
    pub fn new(trade_capacity: usize, latency_capacity: usize) -> Self {
        Self {
            trades: BoundedEventBuffer::new(trade_capacity),
            latency_window: BoundedEventBuffer::new(latency_capacity),
            metrics: None,
            order_books: BTreeMap::new(),
            connection_status: ConnectionStatus::Connecting,
            poll_health: PollHealth::default(),
            trades_received: 0,
        }
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection_status
    }

    pub fn on_trade_received(&mut self, trade: Trade, received_at_ms: i64) {
        self.latency_window
            .push(LatencySample::from_trade(&trade, received_at_ms));
        self.trades.push(trade);
        self.trades_received = self.trades_received.saturating_add(1);
    }

    pub fn on_metrics_polled(
        &mut self,
        seq: u64,
        result: Result<MetricsSnapshot, PollError>,
    ) -> PollOutcome {
        match result {
            Ok(metrics) => {
                let outcome = self.poll_health.metrics.on_success(seq);
                if outcome == PollOutcome::Applied {
                    self.metrics = Some(Arc::new(metrics));
                } else {
                    debug!(seq, "discarding stale metrics poll");
                }
                outcome
            }
            Err(error) => {
                warn!(seq, %error, "metrics poll failed");
                self.poll_health.metrics.on_failure(seq, error)
            }
        }
    }

    pub fn on_order_book_polled(
        &mut self,
        symbol: &str,
        seq: u64,
        result: Result<OrderBookSnapshot, PollError>,
    ) -> PollOutcome {
        let tracker = self
            .poll_health
            .order_books
            .entry(symbol.to_string())
            .or_default();
        match result {
            Ok(book) => {
                let outcome = tracker.on_success(seq);
                if outcome == PollOutcome::Applied {
                    self.order_books.insert(symbol.to_string(), Arc::new(book));
                } else {
                    debug!(symbol, seq, "discarding stale order book poll");
                }
                outcome
            }
            Err(error) => {
                warn!(symbol, seq, %error, "order book poll failed");
                tracker.on_failure(seq, error)
            }
        }
    }

    /// Forgets the poll health of a symbol that is no longer polled. Its last
    /// snapshot stays readable.
    pub fn on_order_book_unwatched(&mut self, symbol: &str) {
        self.poll_health.order_books.remove(symbol);
    }

    /// Applies a status change if it is a legal successor of the current
    /// status. Out-of-sequence changes are rejected and reported as false.
    pub fn on_connection_event(&mut self, status: ConnectionStatus) -> bool {
        if !self.connection_status.can_transition_to(status) {
            warn!(
                current = ?self.connection_status,
                requested = ?status,
                "rejecting out-of-sequence connection status"
            );
            return false;
        }
        self.connection_status = status;
        true
    }

    pub fn advisory(&self) -> Option<String> {
        if let ConnectionStatus::GaveUp(attempts) = self.connection_status {
            return Some(format!("failed to reconnect after {attempts} attempts"));
        }
        if self.poll_health.metrics_degraded() && !self.connection_status.is_connected() {
            let reason = self
                .poll_health
                .metrics
                .last_error()
                .map(ToString::to_string)
                .unwrap_or_else(|| "unknown error".to_string());
            return Some(format!("unable to fetch metrics: {reason}"));
        }
        None
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            trades: self.trades.to_vec_newest_first(),
            latency_window: self.latency_window.to_vec_oldest_first(),
            metrics: self.metrics.clone(),
            order_books: self.order_books.clone(),
            connection_status: self.connection_status,
            poll_health: self.poll_health.clone(),
            advisory: self.advisory(),
            trades_received: self.trades_received,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trade(id: u64, symbol: &str, latency_micros: f64) -> Trade {
        Trade {
            id,
            symbol: symbol.to_string(),
            price: 82.5,
            quantity: 10,
            latency_micros,
            occurred_at: 1_700_000_000_000 + id as i64,
        }
    }

    fn sample_metrics(total_orders: u64) -> MetricsSnapshot {
        MetricsSnapshot {
            total_orders,
            total_trades: total_orders / 2,
            avg_latency_micros: 40.0,
            per_symbol: BTreeMap::new(),
        }
    }

    fn sample_book(symbol: &str, best_bid: f64) -> OrderBookSnapshot {
        OrderBookSnapshot {
            symbol: symbol.to_string(),
            bids: Vec::new(),
            asks: Vec::new(),
            best_bid,
            best_ask: best_bid + 0.5,
            spread: 0.5,
            bid_count: 0,
            ask_count: 0,
        }
    }

    fn connected_state() -> SyncState {
        let mut state = SyncState::new(50, 30);
        assert!(state.on_connection_event(ConnectionStatus::Connected));
        state
    }

    #[test]
    fn trade_buffer_keeps_latest_fifty_newest_first() {
        let mut state = SyncState::new(50, 30);
        for id in 1..=120 {
            state.on_trade_received(sample_trade(id, "OIL", id as f64), 0);
        }

        let snapshot = state.snapshot();
        assert_eq!(snapshot.trades.len(), 50);
        let ids: Vec<u64> = snapshot.trades.iter().map(|trade| trade.id).collect();
        let expected: Vec<u64> = (71..=120).rev().collect();
        assert_eq!(ids, expected);
        assert_eq!(snapshot.trades_received, 120);
    }

    #[test]
    fn latency_window_tracks_latest_thirty_across_symbols() {
        let mut state = SyncState::new(50, 30);
        let symbols = ["OIL", "GOLD", "SILVER"];
        for id in 1..=45_u64 {
            let symbol = symbols[(id % 3) as usize];
            state.on_trade_received(sample_trade(id, symbol, id as f64), id as i64);
        }

        let snapshot = state.snapshot();
        assert_eq!(snapshot.latency_window.len(), 30);
        let latencies: Vec<f64> = snapshot
            .latency_window
            .iter()
            .map(|sample| sample.latency_micros)
            .collect();
        let expected: Vec<f64> = (16..=45).map(|id| id as f64).collect();
        assert_eq!(latencies, expected);
        assert_eq!(snapshot.latency_window[0].captured_at, 16);
    }

    #[test]
    fn single_trade_produces_one_latency_sample() {
        let mut state = SyncState::new(50, 30);
        state.on_trade_received(sample_trade(1, "OIL", 45.2), 10);

        let snapshot = state.snapshot();
        assert_eq!(snapshot.trades[0], sample_trade(1, "OIL", 45.2));
        assert_eq!(snapshot.latency_window.len(), 1);
        assert_eq!(snapshot.latency_window[0].latency_micros, 45.2);
    }

    #[test]
    fn stale_metrics_poll_never_overwrites_newer_snapshot() {
        let mut state = connected_state();

        assert_eq!(
            state.on_metrics_polled(2, Ok(sample_metrics(200))),
            PollOutcome::Applied
        );
        assert_eq!(
            state.on_metrics_polled(1, Ok(sample_metrics(100))),
            PollOutcome::Stale
        );

        let metrics = state.snapshot().metrics.expect("metrics should be present");
        assert_eq!(metrics.total_orders, 200);
    }

    #[test]
    fn failed_metrics_poll_keeps_previous_snapshot() {
        let mut state = connected_state();
        state.on_metrics_polled(1, Ok(sample_metrics(100)));
        let before = state.snapshot().metrics.expect("metrics should be present");

        assert_eq!(
            state.on_metrics_polled(2, Err(PollError::Status(500))),
            PollOutcome::Failed
        );

        let snapshot = state.snapshot();
        let after = snapshot.metrics.expect("metrics should be retained");
        assert!(Arc::ptr_eq(&before, &after));
        assert!(snapshot.poll_health.metrics_degraded());
        assert!(snapshot.advisory.is_none());
    }

    #[test]
    fn poll_failure_is_advisory_only_when_push_is_down() {
        let mut state = connected_state();
        state.on_metrics_polled(1, Err(PollError::Status(500)));
        assert!(state.advisory().is_none());

        assert!(state.on_connection_event(ConnectionStatus::Disconnected));
        let advisory = state.advisory().expect("advisory should be raised");
        assert!(advisory.contains("unable to fetch metrics"));
        assert!(advisory.contains("500"));

        state.on_metrics_polled(2, Ok(sample_metrics(10)));
        assert!(state.advisory().is_none());
    }

    #[test]
    fn order_books_are_replaced_per_symbol() {
        let mut state = connected_state();
        state.on_order_book_polled("OIL", 1, Ok(sample_book("OIL", 82.0)));
        state.on_order_book_polled("GOLD", 2, Ok(sample_book("GOLD", 1900.0)));
        state.on_order_book_polled("OIL", 3, Ok(sample_book("OIL", 83.0)));
        assert_eq!(
            state.on_order_book_polled("OIL", 2, Ok(sample_book("OIL", 10.0))),
            PollOutcome::Stale
        );
        state.on_order_book_polled("GOLD", 4, Err(PollError::Decode("bad".to_string())));

        let snapshot = state.snapshot();
        assert_eq!(snapshot.order_book("OIL").map(|book| book.best_bid), Some(83.0));
        assert_eq!(
            snapshot.order_book("GOLD").map(|book| book.best_bid),
            Some(1900.0)
        );
        assert!(snapshot.poll_health.order_book_degraded("GOLD"));
        assert!(!snapshot.poll_health.order_book_degraded("OIL"));
    }

    #[test]
    fn unwatched_symbol_keeps_book_but_drops_health() {
        let mut state = connected_state();
        state.on_order_book_polled("GOLD", 1, Ok(sample_book("GOLD", 1900.0)));
        state.on_order_book_polled("GOLD", 2, Err(PollError::Status(503)));
        assert!(state.snapshot().poll_health.order_book_degraded("GOLD"));

        state.on_order_book_unwatched("GOLD");

        let snapshot = state.snapshot();
        assert!(!snapshot.poll_health.order_books.contains_key("GOLD"));
        assert_eq!(
            snapshot.order_book("GOLD").map(|book| book.best_bid),
            Some(1900.0)
        );
    }

    #[test]
    fn rejects_out_of_sequence_status() {
        let mut state = connected_state();
        assert!(!state.on_connection_event(ConnectionStatus::Reconnecting(1)));
        assert_eq!(state.connection_status(), ConnectionStatus::Connected);

        assert!(state.on_connection_event(ConnectionStatus::Disconnected));
        assert!(state.on_connection_event(ConnectionStatus::Reconnecting(1)));
        assert!(!state.on_connection_event(ConnectionStatus::Reconnecting(3)));
        assert!(state.on_connection_event(ConnectionStatus::Reconnecting(2)));
        assert!(state.on_connection_event(ConnectionStatus::GaveUp(2)));
        assert_eq!(
            state.advisory(),
            Some("failed to reconnect after 2 attempts".to_string())
        );
    }

    #[test]
    fn filters_trades_by_symbol() {
        let mut state = SyncState::new(50, 30);
        state.on_trade_received(sample_trade(1, "OIL", 1.0), 0);
        state.on_trade_received(sample_trade(2, "GOLD", 1.0), 0);
        state.on_trade_received(sample_trade(3, "OIL", 1.0), 0);

        let snapshot = state.snapshot();
        let oil: Vec<u64> = snapshot.trades_for("OIL").map(|trade| trade.id).collect();
        assert_eq!(oil, vec![3, 1]);
    }
}
