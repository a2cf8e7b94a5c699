use crate::sync::state::DashboardSnapshot;
use crate::sync::types::{ConnectionStatus, LatencySample, OrderBookSnapshot, SymbolMetrics, Trade};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Headline {
    pub total_orders: u64,
    pub total_trades: u64,
    pub avg_latency_micros: f64,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LatencySummary {
    pub min_micros: f64,
    pub max_micros: f64,
    pub mean_micros: f64,
}

impl LatencySummary {
    fn from_samples(samples: &[LatencySample]) -> Option<Self> {
        let first = samples.first()?;
        let mut summary = Self {
            min_micros: first.latency_micros,
            max_micros: first.latency_micros,
            mean_micros: 0.0,
        };
        let mut total = 0.0;
        for sample in samples {
            summary.min_micros = summary.min_micros.min(sample.latency_micros);
            summary.max_micros = summary.max_micros.max(sample.latency_micros);
            total += sample.latency_micros;
        }
        summary.mean_micros = total / samples.len() as f64;
        Some(summary)
    }
}

/// Per-symbol projection of the dashboard state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    pub symbol: String,
    pub connection: ConnectionStatus,
    pub connection_label: String,
    pub advisory: Option<String>,
    pub headline: Option<Headline>,
    pub symbol_metrics: Option<SymbolMetrics>,
    pub other_symbols: Vec<SymbolMetrics>,
    pub order_book: Option<Arc<OrderBookSnapshot>>,
    pub recent_trades: Vec<Trade>,
    pub latency_series: Vec<LatencySample>,
    pub latency_summary: Option<LatencySummary>,
    pub trades_received: u64,
}

pub fn build_dashboard_view(snapshot: &DashboardSnapshot, symbol: &str) -> DashboardView {
    let symbol = symbol.trim().to_ascii_uppercase();
    let metrics = snapshot.metrics.as_deref();

    DashboardView {
        connection: snapshot.connection_status,
        connection_label: snapshot.connection_status.label(),
        advisory: snapshot.advisory.clone(),
        headline: metrics.map(|metrics| Headline {
            total_orders: metrics.total_orders,
            total_trades: metrics.total_trades,
            avg_latency_micros: metrics.avg_latency_micros,
        }),
        symbol_metrics: metrics.and_then(|metrics| metrics.symbol(&symbol).cloned()),
        other_symbols: metrics
            .map(|metrics| {
                metrics
                    .per_symbol
                    .values()
                    .filter(|entry| entry.symbol != symbol)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default(),
        order_book: snapshot.order_book(&symbol).cloned(),
        recent_trades: snapshot.trades_for(&symbol).cloned().collect(),
        latency_series: snapshot.latency_window.clone(),
        latency_summary: LatencySummary::from_samples(&snapshot.latency_window),
        trades_received: snapshot.trades_received,
        symbol,
    }
}
