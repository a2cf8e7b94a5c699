use crate::sync::polling::PollTracker;
use crate::sync::state::DashboardSnapshot;
use crate::sync::types::ConnectionStatus;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_ms: u128,
    pub connection: ConnectionStatus,
    pub metrics_poll: PollTracker,
    pub order_book_polls: BTreeMap<String, PollTracker>,
    pub advisory: Option<String>,
}

fn overall_status(snapshot: &DashboardSnapshot) -> &'static str {
    if snapshot.connection_status.is_terminal() {
        return "down";
    }
    let polls_degraded = snapshot.poll_health.metrics_degraded()
        || snapshot
            .poll_health
            .order_books
            .values()
            .any(PollTracker::is_degraded);
    if !snapshot.connection_status.is_connected() || polls_degraded {
        return "degraded";
    }
    "ok"
}

pub fn build_health_response(started_at: Instant, snapshot: &DashboardSnapshot) -> HealthResponse {
    HealthResponse {
        status: overall_status(snapshot),
        uptime_ms: started_at.elapsed().as_millis(),
        connection: snapshot.connection_status,
        metrics_poll: snapshot.poll_health.metrics.clone(),
        order_book_polls: snapshot.poll_health.order_books.clone(),
        advisory: snapshot.advisory.clone(),
    }
}
