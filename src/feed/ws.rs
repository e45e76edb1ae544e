use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream};
use tracing::{info, warn};

use crate::config::FeedConfig;
use crate::constants::events;
use crate::error::FeedError;
use crate::events::{Event, TradeEvent, TradeKind};

use super::traits::{FeedResult, Ingest, PolledItem};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Push channel lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FeedState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
    Reconnecting { attempt: u32 },
    /// Gave up after the configured number of reconnect attempts
    Exhausted,
}

/// Delay before reconnect attempt `attempt` (1-based): base * attempt
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(attempt)
}

/// Result of parsing one inbound text frame
#[derive(Clone, Debug, PartialEq)]
pub enum PushMessage {
    Ack,
    /// `id` is the transaction signature when the frame carries one
    Trade { id: Option<String>, trade: TradeEvent },
    Rejected(String),
    Ignored,
}

fn number(v: Option<&Value>) -> Option<f64> {
    match v? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}

/// Defensive parse of a PumpPortal frame. Anything unexpected is `Ignored`.
pub fn parse_push_message(text: &str, asset: &str) -> PushMessage {
    let Ok(v) = serde_json::from_str::<Value>(text) else {
        return PushMessage::Ignored;
    };

    if let Some(kind) = v.get("txType").and_then(|t| t.as_str()).and_then(TradeKind::parse) {
        if let Some(mint) = v.get("mint").and_then(|m| m.as_str()) {
            if mint != asset {
                return PushMessage::Ignored;
            }
        }
        let Some(quantity) = number(v.get("solAmount")) else {
            return PushMessage::Ignored;
        };
        let actor = v
            .get("traderPublicKey")
            .and_then(|k| k.as_str())
            .unwrap_or("anon")
            .to_string();
        let occurred_at = v
            .get("timestamp")
            .and_then(|t| t.as_i64())
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_else(Utc::now);

        let id = v
            .get("signature")
            .and_then(|s| s.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        return match TradeEvent::new(kind, quantity, actor, occurred_at) {
            Some(trade) => PushMessage::Trade { id, trade },
            None => PushMessage::Ignored,
        };
    }

    if let Some(errors) = v.get("errors") {
        return PushMessage::Rejected(errors.to_string());
    }

    if let Some(message) = v.get("message").and_then(|m| m.as_str()) {
        if message.to_ascii_lowercase().contains("subscribed") {
            return PushMessage::Ack;
        }
    }

    PushMessage::Ignored
}

#[derive(Clone)]
struct StateTracker {
    tx: Arc<watch::Sender<FeedState>>,
    log: Arc<Mutex<Vec<FeedState>>>,
}

impl StateTracker {
    fn set(&self, state: FeedState) {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).push(state);
        self.tx.send_replace(state);
    }
}

/// Handle to a live push subscription. Dropping it stops the feed task.
pub struct FeedSession {
    state: watch::Receiver<FeedState>,
    log: Arc<Mutex<Vec<FeedState>>>,
    task: JoinHandle<()>,
}

impl FeedSession {
    pub fn state(&self) -> FeedState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedState> {
        self.state.clone()
    }

    /// Every state the session passed through, in order
    pub fn transitions(&self) -> Vec<FeedState> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Resolves once reconnection has been given up
    pub async fn wait_exhausted(&self) {
        let mut rx = self.state.clone();
        let _ = rx.wait_for(|s| *s == FeedState::Exhausted).await;
    }
}

impl Drop for FeedSession {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// PumpPortal trade stream with bounded reconnection
#[derive(Clone, Debug)]
pub struct PushFeedAdapter {
    url: String,
    ack_timeout: Duration,
    base_delay: Duration,
    max_attempts: u32,
}

impl PushFeedAdapter {
    pub fn new(config: &FeedConfig) -> Self {
        Self {
            url: config.push_url.clone(),
            ack_timeout: Duration::from_millis(config.ack_timeout_ms),
            base_delay: Duration::from_millis(config.reconnect_base_delay_ms),
            max_attempts: config.max_reconnect_attempts,
        }
    }

    /// Resolves once the subscription is acknowledged, or fails with
    /// [`FeedError::Unavailable`].
    pub async fn connect(&self, asset: &str, ingest: Arc<dyn Ingest>) -> FeedResult<FeedSession> {
        let (tx, rx) = watch::channel(FeedState::Disconnected);
        let tracker = StateTracker {
            tx: Arc::new(tx),
            log: Arc::new(Mutex::new(vec![FeedState::Disconnected])),
        };

        tracker.set(FeedState::Connecting);
        let stream = match self.handshake(asset, ingest.as_ref()).await {
            Ok(stream) => stream,
            Err(e) => {
                tracker.set(FeedState::Disconnected);
                return Err(FeedError::Unavailable { reason: e.to_string() });
            }
        };
        tracker.set(FeedState::Connected);
        info!(event = events::FEED_CONNECTED, "🔌 Connected to trade feed for {}", asset);

        let adapter = self.clone();
        let asset = asset.to_string();
        let log = tracker.log.clone();
        let task = tokio::spawn(async move {
            adapter.supervise(stream, asset, ingest, tracker).await;
        });

        Ok(FeedSession { state: rx, log, task })
    }

    async fn handshake(&self, asset: &str, ingest: &dyn Ingest) -> FeedResult<WsStream> {
        let ms = self.ack_timeout.as_millis() as u64;
        let (mut ws, _) = timeout(self.ack_timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| FeedError::Timeout { what: "feed connect", ms })??;

        let sub = json!({"method": "subscribeTokenTrade", "keys": [asset]});
        ws.send(Message::Text(sub.to_string())).await?;

        timeout(self.ack_timeout, async {
            while let Some(msg) = ws.next().await {
                match msg? {
                    Message::Text(text) => match parse_push_message(&text, asset) {
                        PushMessage::Ack => return Ok(()),
                        // a trade means the subscription is live already
                        PushMessage::Trade { id, trade } => {
                            ingest.ingest_item(PolledItem {
                                id,
                                event: Event::Trade(trade),
                            });
                            return Ok(());
                        }
                        PushMessage::Rejected(reason) => return Err(FeedError::Unavailable { reason }),
                        PushMessage::Ignored => {}
                    },
                    Message::Ping(p) => {
                        ws.send(Message::Pong(p)).await?;
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Err(FeedError::Unavailable {
                reason: "channel closed before subscription ack".to_string(),
            })
        })
        .await
        .map_err(|_| FeedError::Timeout {
            what: "subscription ack",
            ms,
        })??;

        Ok(ws)
    }

    async fn read_until_closed(stream: &mut WsStream, asset: &str, ingest: &dyn Ingest) {
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if let PushMessage::Trade { id, trade } = parse_push_message(&text, asset) {
                        ingest.ingest_item(PolledItem {
                            id,
                            event: Event::Trade(trade),
                        });
                    }
                }
                Ok(Message::Ping(p)) => {
                    let _ = stream.send(Message::Pong(p)).await;
                }
                Ok(Message::Close(_)) => break,
                Err(e) => {
                    warn!("⚠️ Feed read error: {}", e);
                    break;
                }
                _ => {}
            }
        }
    }

    async fn supervise(&self, mut stream: WsStream, asset: String, ingest: Arc<dyn Ingest>, tracker: StateTracker) {
        loop {
            Self::read_until_closed(&mut stream, &asset, ingest.as_ref()).await;
            tracker.set(FeedState::Closed);
            warn!(event = events::FEED_CLOSED, "🔌 Trade feed closed");

            let mut reconnected = None;
            for attempt in 1..=self.max_attempts {
                tracker.set(FeedState::Reconnecting { attempt });
                let delay = backoff_delay(self.base_delay, attempt);
                info!(
                    event = events::FEED_RECONNECTING,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "🔄 Reconnecting trade feed (attempt {}/{})",
                    attempt,
                    self.max_attempts
                );
                tokio::time::sleep(delay).await;

                tracker.set(FeedState::Connecting);
                match self.handshake(&asset, ingest.as_ref()).await {
                    Ok(s) => {
                        reconnected = Some(s);
                        break;
                    }
                    Err(e) => warn!("⚠️ Reconnect attempt {} failed: {}", attempt, e),
                }
            }

            match reconnected {
                Some(s) => {
                    tracker.set(FeedState::Connected);
                    info!(event = events::FEED_CONNECTED, "🔌 Trade feed reconnected");
                    stream = s;
                }
                None => {
                    tracker.set(FeedState::Exhausted);
                    warn!(
                        event = events::FEED_EXHAUSTED,
                        "❌ Trade feed gave up after {} attempts",
                        self.max_attempts
                    );
                    return;
                }
            }
        }
    }
}
