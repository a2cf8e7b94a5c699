use crate::sync::feed::{FeedSession, FeedTransport};
use crate::sync::types::{parse_trade_payload, Trade};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Identifies one subscription attempt so events from retired sessions can
/// be told apart from the live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub enum FeedEventKind {
    Connected,
    Trade(Trade),
    Disconnected { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedEvent {
    pub session: SessionId,
    pub kind: FeedEventKind,
}

pub type FeedEventSink = Arc<dyn Fn(FeedEvent) + Send + Sync>;

pub struct SubscriptionHandle {
    session: SessionId,
    cancel_token: CancellationToken,
    join_handle: JoinHandle<()>,
}

impl SubscriptionHandle {
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Cancels the session and waits for its task. No event is emitted for a
    /// session closed this way.
    pub async fn close(self) {
        self.cancel_token.cancel();
        let _ = self.join_handle.await;
    }
}

/// Opens a push subscription on its own task. Emits `Connected` once the
/// topic is subscribed, one `Trade` per well-formed message and exactly one
/// `Disconnected` when the session ends for any reason other than `close`.
pub fn open(
    transport: Arc<dyn FeedTransport>,
    topic: String,
    session: SessionId,
    on_event: FeedEventSink,
    parent_token: &CancellationToken,
) -> SubscriptionHandle {
    let cancel_token = parent_token.child_token();
    let task_token = cancel_token.clone();

    let join_handle = tokio::spawn(async move {
        let emit = |kind: FeedEventKind| on_event(FeedEvent { session, kind });

        let opened = tokio::select! {
            _ = task_token.cancelled() => return,
            opened = transport.open_session(&topic) => opened,
        };
        let mut feed = match opened {
            Ok(feed) => feed,
            Err(error) => {
                warn!(session = session.0, %error, "failed to open trade feed");
                emit(FeedEventKind::Disconnected {
                    reason: error.to_string(),
                });
                return;
            }
        };

        info!(session = session.0, topic = %topic, "trade feed subscribed");
        emit(FeedEventKind::Connected);

        let reason = tokio::select! {
            _ = task_token.cancelled() => None,
            reason = pump_messages(feed.as_mut(), session, &emit) => Some(reason),
        };
        feed.close().await;

        if let Some(reason) = reason {
            emit(FeedEventKind::Disconnected { reason });
        }
    });

    SubscriptionHandle {
        session,
        cancel_token,
        join_handle,
    }
}

async fn pump_messages<E>(feed: &mut dyn FeedSession, session: SessionId, emit: &E) -> String
where
    E: Fn(FeedEventKind),
{
    loop {
        match feed.next_message().await {
            Some(Ok(body)) => {
                let mut payload = body.into_bytes();
                match parse_trade_payload(&mut payload) {
                    Ok(trade) => emit(FeedEventKind::Trade(trade)),
                    Err(error) => {
                        warn!(session = session.0, %error, "dropping malformed trade message");
                    }
                }
            }
            Some(Err(error)) => {
                warn!(session = session.0, %error, "trade feed failed");
                return error.to_string();
            }
            None => {
                debug!(session = session.0, "trade feed closed by server");
                return "feed closed by server".to_string();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct ScriptedSession {
        messages: VecDeque<Result<String, AppError>>,
        hold_open: bool,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl FeedSession for ScriptedSession {
        async fn next_message(&mut self) -> Option<Result<String, AppError>> {
            match self.messages.pop_front() {
                Some(message) => Some(message),
                None if self.hold_open => std::future::pending().await,
                None => None,
            }
        }

        async fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    struct ScriptedTransport {
        session: Mutex<Option<ScriptedSession>>,
    }

    #[async_trait]
    impl FeedTransport for ScriptedTransport {
        async fn open_session(&self, _topic: &str) -> Result<Box<dyn FeedSession>, AppError> {
            match self.session.lock().take() {
                Some(session) => Ok(Box::new(session)),
                None => Err(AppError::Protocol("connection refused".to_string())),
            }
        }
    }

    fn trade_json(id: u64) -> String {
        format!(
            r#"{{"tradeId":{id},"commodity":"OIL","price":82.5,"quantity":100,"latencyMicros":45.2,"timestamp":1700000000000}}"#
        )
    }

    fn recorder() -> (FeedEventSink, Arc<Mutex<Vec<FeedEventKind>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        (
            Arc::new(move |event: FeedEvent| sink.lock().push(event.kind)),
            events,
        )
    }

    #[tokio::test]
    async fn emits_trades_then_one_disconnect() {
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Arc::new(ScriptedTransport {
            session: Mutex::new(Some(ScriptedSession {
                messages: VecDeque::from(vec![
                    Ok(trade_json(1)),
                    Ok("not json".to_string()),
                    Ok(trade_json(2)),
                    Err(AppError::Protocol("reset".to_string())),
                ]),
                hold_open: false,
                closed: Arc::clone(&closed),
            })),
        });
        let (sink, events) = recorder();
        let root = CancellationToken::new();

        let handle = open(transport, "/topic/trades".to_string(), SessionId(1), sink, &root);
        handle.join_handle.await.expect("subscription task should finish");

        let events = events.lock();
        assert_eq!(events.len(), 4);
        assert_eq!(events[0], FeedEventKind::Connected);
        assert!(matches!(&events[1], FeedEventKind::Trade(trade) if trade.id == 1));
        assert!(matches!(&events[2], FeedEventKind::Trade(trade) if trade.id == 2));
        assert!(matches!(
            &events[3],
            FeedEventKind::Disconnected { reason } if reason.contains("reset")
        ));
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn failed_open_reports_disconnect_without_connect() {
        let transport = Arc::new(ScriptedTransport {
            session: Mutex::new(None),
        });
        let (sink, events) = recorder();
        let root = CancellationToken::new();

        let handle = open(transport, "/topic/trades".to_string(), SessionId(7), sink, &root);
        assert_eq!(handle.session(), SessionId(7));
        handle.join_handle.await.expect("subscription task should finish");

        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            FeedEventKind::Disconnected { reason } if reason.contains("connection refused")
        ));
    }

    #[tokio::test]
    async fn close_is_silent() {
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Arc::new(ScriptedTransport {
            session: Mutex::new(Some(ScriptedSession {
                messages: VecDeque::from(vec![Ok(trade_json(1))]),
                hold_open: true,
                closed: Arc::clone(&closed),
            })),
        });
        let (sink, events) = recorder();
        let root = CancellationToken::new();

        let handle = open(transport, "/topic/trades".to_string(), SessionId(2), sink, &root);
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        handle.close().await;

        let events = events.lock();
        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .all(|event| !matches!(event, FeedEventKind::Disconnected { .. })));
        assert!(closed.load(Ordering::SeqCst));
    }
}
