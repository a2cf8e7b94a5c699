use crate::error::PollError;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Issue-order stamps shared by every poll loop of one coordinator.
#[derive(Debug, Clone, Default)]
pub struct PollSequence {
    next: Arc<AtomicU64>,
}

impl PollSequence {
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Applied,
    Stale,
    Failed,
}

/// Completion-order gate for one polled resource. A result is applied only
/// if it was issued after the last applied result.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PollTracker {
    applied_seq: Option<u64>,
    failed_seq: Option<u64>,
    consecutive_failures: u32,
    last_error: Option<PollError>,
}

impl PollTracker {
    fn is_stale(&self, seq: u64) -> bool {
        self.applied_seq.is_some_and(|applied| seq <= applied)
    }

    pub fn on_success(&mut self, seq: u64) -> PollOutcome {
        if self.is_stale(seq) {
            return PollOutcome::Stale;
        }
        self.applied_seq = Some(seq);
        if self.failed_seq.map_or(true, |failed| seq > failed) {
            self.consecutive_failures = 0;
            self.last_error = None;
        }
        PollOutcome::Applied
    }

    pub fn on_failure(&mut self, seq: u64, error: PollError) -> PollOutcome {
        if self.is_stale(seq) {
            return PollOutcome::Stale;
        }
        self.failed_seq = Some(self.failed_seq.map_or(seq, |failed| failed.max(seq)));
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_error = Some(error);
        PollOutcome::Failed
    }

    pub fn is_degraded(&self) -> bool {
        self.consecutive_failures > 0
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn last_error(&self) -> Option<&PollError> {
        self.last_error.as_ref()
    }

    pub fn applied_seq(&self) -> Option<u64> {
        self.applied_seq
    }
}

pub struct PollerHandle {
    cancel_token: CancellationToken,
    join_handle: JoinHandle<()>,
}

impl PollerHandle {
    /// Stops the timer and aborts requests still in flight.
    pub async fn stop(self) {
        self.cancel_token.cancel();
        let _ = self.join_handle.await;
    }
}

/// Starts a fixed-cadence poll loop. Every tick issues an independent
/// request, so slow requests may overlap with newer ones; each completion is
/// handed to `deliver` together with its issue sequence number.
pub fn spawn_poller<T, F, Fut, D>(
    interval: Duration,
    sequence: PollSequence,
    parent_token: &CancellationToken,
    fetch: F,
    deliver: D,
) -> PollerHandle
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, PollError>> + Send + 'static,
    D: Fn(u64, Result<T, PollError>) + Send + Sync + 'static,
{
    let cancel_token = parent_token.child_token();
    let loop_token = cancel_token.clone();
    let deliver = Arc::new(deliver);

    let join_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                _ = loop_token.cancelled() => break,
                _ = ticker.tick() => {
                    let seq = sequence.next();
                    let request = fetch();
                    let deliver = Arc::clone(&deliver);
                    in_flight.spawn(async move {
                        let result = request.await;
                        deliver(seq, result);
                    });
                }
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
            }
        }

        in_flight.shutdown().await;
    });

    PollerHandle {
        cancel_token,
        join_handle,
    }
}
