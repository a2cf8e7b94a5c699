use crate::error::{AppError, PollError};
use crate::sync::config::{normalize_symbol, SyncConfig};
use crate::sync::feed::{FeedTransport, StompWebSocketFeed};
use crate::sync::polling::{spawn_poller, PollSequence, PollerHandle};
use crate::sync::reconnect::{ReconnectDecision, ReconnectPolicy};
use crate::sync::rest::{HttpSnapshotSource, SnapshotSource};
use crate::sync::state::{DashboardSnapshot, SyncState};
use crate::sync::subscription::{self, FeedEvent, FeedEventKind, SessionId, SubscriptionHandle};
use crate::sync::types::{ConnectionStatus, MetricsSnapshot, OrderBookSnapshot};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// A single state mutation request. Every external trigger becomes one of
/// these and the coordinator task applies them one at a time.
#[derive(Debug)]
pub enum SyncCommand {
    Feed(FeedEvent),
    MetricsPolled {
        seq: u64,
        result: Result<MetricsSnapshot, PollError>,
    },
    OrderBookPolled {
        symbol: String,
        seq: u64,
        result: Result<OrderBookSnapshot, PollError>,
    },
    WatchOrderBook(String),
    UnwatchOrderBook(String),
    RetryConnection,
}

type PublishedSnapshot = Arc<RwLock<Arc<DashboardSnapshot>>>;

fn now_unix_ms() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_millis().min(i64::MAX as u128) as i64,
        Err(_) => 0,
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

struct SyncRuntime {
    config: SyncConfig,
    feed: Arc<dyn FeedTransport>,
    source: Arc<dyn SnapshotSource>,
    state: SyncState,
    published: PublishedSnapshot,
    commands_tx: UnboundedSender<SyncCommand>,
    cancel_token: CancellationToken,
    sequence: PollSequence,
    policy: ReconnectPolicy,
    subscription: Option<SubscriptionHandle>,
    next_session: u64,
    reconnect_at: Option<Instant>,
    metrics_poller: Option<PollerHandle>,
    order_book_pollers: BTreeMap<String, PollerHandle>,
}

impl SyncRuntime {
    async fn run(mut self, mut commands: UnboundedReceiver<SyncCommand>) {
        self.start_metrics_poller();
        self.watch_order_book(self.config.symbol.clone());
        self.open_subscription();
        self.publish();

        loop {
            let cancel_token = self.cancel_token.clone();
            let reconnect_at = self.reconnect_at;

            tokio::select! {
                _ = cancel_token.cancelled() => break,
                Some(command) = commands.recv() => self.handle_command(command).await,
                _ = sleep_until_deadline(reconnect_at) => {
                    self.reconnect_at = None;
                    info!(state = ?self.policy.state(), "reconnecting trade feed");
                    self.open_subscription();
                }
            }

            self.publish();
        }

        self.teardown().await;
    }

    fn publish(&self) {
        let snapshot = Arc::new(self.state.snapshot());
        *self.published.write() = snapshot;
    }

    async fn handle_command(&mut self, command: SyncCommand) {
        match command {
            SyncCommand::Feed(event) => self.on_feed_event(event).await,
            SyncCommand::MetricsPolled { seq, result } => {
                self.state.on_metrics_polled(seq, result);
            }
            SyncCommand::OrderBookPolled {
                symbol,
                seq,
                result,
            } => {
                if self.order_book_pollers.contains_key(&symbol) {
                    self.state.on_order_book_polled(&symbol, seq, result);
                } else {
                    debug!(symbol = %symbol, seq, "ignoring poll for unwatched order book");
                }
            }
            SyncCommand::WatchOrderBook(symbol) => self.watch_order_book(symbol),
            SyncCommand::UnwatchOrderBook(symbol) => {
                if let Some(poller) = self.order_book_pollers.remove(&symbol) {
                    poller.stop().await;
                    self.state.on_order_book_unwatched(&symbol);
                    info!(symbol = %symbol, "stopped order book polling");
                }
            }
            SyncCommand::RetryConnection => self.retry_connection(),
        }
    }

    async fn on_feed_event(&mut self, event: FeedEvent) {
        let live_session = self.subscription.as_ref().map(SubscriptionHandle::session);
        if live_session != Some(event.session) {
            debug!(session = event.session.0, "ignoring event from retired session");
            return;
        }

        match event.kind {
            FeedEventKind::Connected => {
                self.policy.on_connected();
                self.state.on_connection_event(ConnectionStatus::Connected);
            }
            FeedEventKind::Trade(trade) => self.state.on_trade_received(trade, now_unix_ms()),
            FeedEventKind::Disconnected { reason } => {
                if let Some(subscription) = self.subscription.take() {
                    subscription.close().await;
                }
                self.on_feed_failure(&reason);
            }
        }
    }

    fn on_feed_failure(&mut self, reason: &str) {
        if matches!(
            self.state.connection_status(),
            ConnectionStatus::Connected | ConnectionStatus::Connecting
        ) {
            self.state.on_connection_event(ConnectionStatus::Disconnected);
        }

        match self.policy.on_failure() {
            ReconnectDecision::Schedule { attempt, delay } => {
                info!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    reason,
                    "scheduling trade feed reconnect"
                );
                self.state
                    .on_connection_event(ConnectionStatus::Reconnecting(attempt));
                self.reconnect_at = Some(Instant::now() + delay);
            }
            ReconnectDecision::GiveUp { attempts } => {
                error!(attempts, reason, "giving up on trade feed reconnection");
                self.state
                    .on_connection_event(ConnectionStatus::GaveUp(attempts));
            }
            ReconnectDecision::Ignore => {
                debug!(reason, "feed failure after giving up");
            }
        }
    }

    fn retry_connection(&mut self) {
        if !self.policy.reset() {
            debug!(state = ?self.policy.state(), "ignoring retry request");
            return;
        }
        info!("manual trade feed retry");
        self.state.on_connection_event(ConnectionStatus::Connecting);
        self.open_subscription();
    }

    fn open_subscription(&mut self) {
        if self.subscription.is_some() {
            debug!("subscription already active");
            return;
        }

        self.next_session = self.next_session.saturating_add(1);
        let session = SessionId(self.next_session);
        let commands_tx = self.commands_tx.clone();
        let on_event = Arc::new(move |event: FeedEvent| {
            let _ = commands_tx.send(SyncCommand::Feed(event));
        });

        self.subscription = Some(subscription::open(
            Arc::clone(&self.feed),
            self.config.trade_topic.clone(),
            session,
            on_event,
            &self.cancel_token,
        ));
    }

    fn start_metrics_poller(&mut self) {
        let source = Arc::clone(&self.source);
        let commands_tx = self.commands_tx.clone();

        self.metrics_poller = Some(spawn_poller(
            self.config.metrics_poll_interval(),
            self.sequence.clone(),
            &self.cancel_token,
            move || {
                let source = Arc::clone(&source);
                async move { source.fetch_metrics().await }
            },
            move |seq, result| {
                let _ = commands_tx.send(SyncCommand::MetricsPolled { seq, result });
            },
        ));
    }

    fn watch_order_book(&mut self, symbol: String) {
        if self.order_book_pollers.contains_key(&symbol) {
            return;
        }

        let source = Arc::clone(&self.source);
        let commands_tx = self.commands_tx.clone();
        let fetch_symbol = symbol.clone();
        let deliver_symbol = symbol.clone();

        let poller = spawn_poller(
            self.config.order_book_poll_interval(),
            self.sequence.clone(),
            &self.cancel_token,
            move || {
                let source = Arc::clone(&source);
                let symbol = fetch_symbol.clone();
                async move { source.fetch_order_book(&symbol).await }
            },
            move |seq, result| {
                let _ = commands_tx.send(SyncCommand::OrderBookPolled {
                    symbol: deliver_symbol.clone(),
                    seq,
                    result,
                });
            },
        );
        info!(symbol = %symbol, "started order book polling");
        self.order_book_pollers.insert(symbol, poller);
    }

    async fn teardown(&mut self) {
        self.reconnect_at = None;
        if let Some(subscription) = self.subscription.take() {
            subscription.close().await;
        }
        if let Some(poller) = self.metrics_poller.take() {
            poller.stop().await;
        }
        for (_, poller) in std::mem::take(&mut self.order_book_pollers) {
            poller.stop().await;
        }
        debug!("sync coordinator stopped");
    }
}

/// Owner of the dashboard state. Readers take cheap immutable snapshots
/// through `current_state`; every mutation happens on the coordinator task.
pub struct SyncCoordinator {
    commands_tx: UnboundedSender<SyncCommand>,
    published: PublishedSnapshot,
    cancel_token: CancellationToken,
    join_handle: Mutex<Option<JoinHandle<()>>>,
}

impl SyncCoordinator {
    /// Starts the coordinator with the given transports. Must be called from
    /// within a tokio runtime.
    pub fn start(
        config: SyncConfig,
        feed: Arc<dyn FeedTransport>,
        source: Arc<dyn SnapshotSource>,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let state = SyncState::new(config.trade_history_capacity, config.latency_window_capacity);
        let published = Arc::new(RwLock::new(Arc::new(state.snapshot())));
        let cancel_token = CancellationToken::new();
        let policy = ReconnectPolicy::new(config.max_reconnect_attempts, config.reconnect_delay());

        let runtime = SyncRuntime {
            config,
            feed,
            source,
            state,
            published: Arc::clone(&published),
            commands_tx: commands_tx.clone(),
            cancel_token: cancel_token.clone(),
            sequence: PollSequence::default(),
            policy,
            subscription: None,
            next_session: 0,
            reconnect_at: None,
            metrics_poller: None,
            order_book_pollers: BTreeMap::new(),
        };
        let join_handle = tokio::spawn(runtime.run(commands_rx));

        Self {
            commands_tx,
            published,
            cancel_token,
            join_handle: Mutex::new(Some(join_handle)),
        }
    }

    /// Starts the coordinator against the configured matching engine.
    pub fn connect(config: SyncConfig) -> Result<Self, AppError> {
        let feed = Arc::new(StompWebSocketFeed::new(
            config.feed_url.clone(),
            config.handshake_timeout(),
        ));
        let source = Arc::new(HttpSnapshotSource::new(
            config.api_base_url.clone(),
            config.order_book_depth,
            config.request_timeout(),
        )?);
        Ok(Self::start(config, feed, source))
    }

    pub fn current_state(&self) -> Arc<DashboardSnapshot> {
        Arc::clone(&self.published.read())
    }

    pub fn watch_order_book(&self, symbol: &str) -> Result<(), AppError> {
        let symbol = normalize_symbol(symbol)?;
        self.send(SyncCommand::WatchOrderBook(symbol))
    }

    pub fn unwatch_order_book(&self, symbol: &str) -> Result<(), AppError> {
        let symbol = normalize_symbol(symbol)?;
        self.send(SyncCommand::UnwatchOrderBook(symbol))
    }

    /// Explicit retry after reconnection has been given up. Ignored in any
    /// other connection state.
    pub fn retry_connection(&self) -> Result<(), AppError> {
        self.send(SyncCommand::RetryConnection)
    }

    fn send(&self, command: SyncCommand) -> Result<(), AppError> {
        if self.cancel_token.is_cancelled() {
            return Err(AppError::CoordinatorStopped);
        }
        self.commands_tx
            .send(command)
            .map_err(|_| AppError::CoordinatorStopped)
    }

    /// Closes the subscription, stops every poll loop and clears any pending
    /// reconnect. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();
        let join_handle = self.join_handle.lock().await.take();
        if let Some(join_handle) = join_handle {
            let _ = join_handle.await;
        }
    }
}

impl Drop for SyncCoordinator {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
