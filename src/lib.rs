pub mod commands;
pub mod error;
pub mod logging;
pub mod sync;

use commands::{dashboard::build_dashboard_view, health::build_health_response};
use error::AppError;
use logging::setup_logging;
use std::time::{Duration, Instant};
use sync::config::{SyncArgs, SyncConfig};
use sync::coordinator::SyncCoordinator;
use sync::SUPPORTED_SYMBOLS;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

const REPORT_INTERVAL_MS: u64 = 5_000;

fn report(coordinator: &SyncCoordinator, symbol: &str, started_at: Instant) {
    let snapshot = coordinator.current_state();
    let view = build_dashboard_view(&snapshot, symbol);
    let health = build_health_response(started_at, &snapshot);

    info!(
        symbol = %view.symbol,
        connection = %view.connection_label,
        health = health.status,
        trades_received = view.trades_received,
        recent_trades = view.recent_trades.len(),
        best_bid = view.order_book.as_ref().map(|book| book.best_bid),
        best_ask = view.order_book.as_ref().map(|book| book.best_ask),
        mean_latency_micros = view.latency_summary.map(|summary| summary.mean_micros),
        total_orders = view.headline.as_ref().map(|headline| headline.total_orders),
        "dashboard"
    );
    if let Some(advisory) = view.advisory {
        warn!(%advisory, "dashboard advisory");
    }
}

async fn run_dashboard(config: SyncConfig) -> Result<(), AppError> {
    let started_at = Instant::now();
    let symbol = config.symbol.clone();
    info!(
        api = %config.api_base_url,
        feed = %config.feed_url,
        topic = %config.trade_topic,
        symbol = %symbol,
        "starting matching dashboard"
    );
    if !SUPPORTED_SYMBOLS.contains(&symbol.as_str()) {
        warn!(symbol = %symbol, supported = ?SUPPORTED_SYMBOLS, "symbol is not listed by the engine");
    }
    let coordinator = SyncCoordinator::connect(config)?;

    let mut ticker = tokio::time::interval(Duration::from_millis(REPORT_INTERVAL_MS));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(error) = signal {
                    warn!(%error, "failed to listen for ctrl-c");
                }
                break;
            }
            _ = ticker.tick() => report(&coordinator, &symbol, started_at),
        }
    }

    info!("shutting down");
    coordinator.shutdown().await;
    Ok(())
}

pub fn run() -> Result<(), AppError> {
    let config = SyncArgs::from_env()?.normalize()?;
    setup_logging(&config.log_level)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run_dashboard(config))
}
