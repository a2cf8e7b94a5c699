use crate::error::AppError;
use crate::sync::stomp::{StompFrame, CONNECTED, ERROR, MESSAGE, RECEIPT};
use crate::sync::TRADE_SUBSCRIPTION_ID;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

const CLOSE_TIMEOUT_MS: u64 = 1_000;

pub type FeedWsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Establishes subscribed push sessions. Implementations perform the
/// transport connect, the protocol handshake and the topic subscription.
#[async_trait]
pub trait FeedTransport: Send + Sync + 'static {
    async fn open_session(&self, topic: &str) -> Result<Box<dyn FeedSession>, AppError>;
}

/// One live subscription. `next_message` yields message bodies; `None`
/// means the server closed the session.
#[async_trait]
pub trait FeedSession: Send {
    async fn next_message(&mut self) -> Option<Result<String, AppError>>;

    async fn close(&mut self);
}

pub struct StompWebSocketFeed {
    url: String,
    handshake_timeout: Duration,
}

impl StompWebSocketFeed {
    pub fn new(url: String, handshake_timeout: Duration) -> Self {
        Self {
            url,
            handshake_timeout,
        }
    }
}

fn host_from_url(url: &str) -> &str {
    let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let authority = without_scheme.split('/').next().unwrap_or(without_scheme);
    authority
        .rsplit_once(':')
        .map(|(host, _)| host)
        .unwrap_or(authority)
}

async fn connect_feed_stream(url: &str) -> Result<FeedWsStream, AppError> {
    let ws_config = WebSocketConfig {
        max_message_size: Some(16 << 20),
        max_frame_size: Some(4 << 20),
        ..Default::default()
    };

    let (stream, _) = connect_async_with_config(url, Some(ws_config), true).await?;
    Ok(stream)
}

fn decode_message(message: Message) -> Result<Option<StompFrame>, AppError> {
    match message {
        Message::Text(text) => StompFrame::decode(&text),
        Message::Binary(bytes) => {
            let text = String::from_utf8(bytes).map_err(|error| {
                AppError::Protocol(format!("binary frame is not utf-8: {error}"))
            })?;
            StompFrame::decode(&text)
        }
        _ => Ok(None),
    }
}

async fn await_connected(stream: &mut FeedWsStream) -> Result<StompFrame, AppError> {
    while let Some(message) = stream.next().await {
        let message = message?;
        if let Message::Close(_) = message {
            break;
        }
        let Some(frame) = decode_message(message)? else {
            continue;
        };
        match frame.command.as_str() {
            CONNECTED => return Ok(frame),
            ERROR => {
                return Err(AppError::Protocol(format!(
                    "handshake rejected: {}",
                    frame.header("message").unwrap_or("no reason given")
                )))
            }
            other => debug!(command = other, "ignoring frame before CONNECTED"),
        }
    }
    Err(AppError::Protocol(
        "connection closed during handshake".to_string(),
    ))
}

#[async_trait]
impl FeedTransport for StompWebSocketFeed {
    async fn open_session(&self, topic: &str) -> Result<Box<dyn FeedSession>, AppError> {
        let mut stream = connect_feed_stream(&self.url).await?;

        stream
            .send(Message::Text(StompFrame::connect(host_from_url(&self.url)).encode()))
            .await?;
        let connected = tokio::time::timeout(self.handshake_timeout, await_connected(&mut stream))
            .await
            .map_err(|_| AppError::Protocol("handshake timed out".to_string()))??;
        debug!(
            version = connected.header("version").unwrap_or("unknown"),
            "stomp session established"
        );

        stream
            .send(Message::Text(
                StompFrame::subscribe(TRADE_SUBSCRIPTION_ID, topic).encode(),
            ))
            .await?;

        Ok(Box::new(StompSession { stream }))
    }
}

pub struct StompSession {
    stream: FeedWsStream,
}

#[async_trait]
impl FeedSession for StompSession {
    async fn next_message(&mut self) -> Option<Result<String, AppError>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(Message::Close(_)) => return None,
                Ok(message) => message,
                Err(error) => return Some(Err(error.into())),
            };

            let frame = match decode_message(message) {
                Ok(Some(frame)) => frame,
                Ok(None) => continue,
                Err(error) => {
                    warn!(%error, "dropping undecodable stomp frame");
                    continue;
                }
            };

            match frame.command.as_str() {
                MESSAGE => return Some(Ok(frame.body)),
                RECEIPT => debug!(
                    receipt = frame.header("receipt-id").unwrap_or("none"),
                    "ignoring receipt"
                ),
                ERROR => {
                    return Some(Err(AppError::Protocol(format!(
                        "server error frame: {}",
                        frame.header("message").unwrap_or("no reason given")
                    ))))
                }
                other => debug!(command = other, "ignoring stomp frame"),
            }
        }
    }

    async fn close(&mut self) {
        let goodbye = async {
            let _ = self
                .stream
                .send(Message::Text(StompFrame::disconnect().encode()))
                .await;
            let _ = self.stream.close(None).await;
        };
        if tokio::time::timeout(Duration::from_millis(CLOSE_TIMEOUT_MS), goodbye)
            .await
            .is_err()
        {
            debug!("feed close timed out");
        }
    }
}
