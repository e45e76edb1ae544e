use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeKind {
    Buy,
    Sell,
}

impl TradeKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "buy" => Some(TradeKind::Buy),
            "sell" => Some(TradeKind::Sell),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeKind::Buy => "buy",
            TradeKind::Sell => "sell",
        }
    }
}

impl fmt::Display for TradeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observed execution on the watched asset. Never mutated after creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    pub kind: TradeKind,
    /// Always positive and finite, see [`TradeEvent::new`]
    pub quantity: f64,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

impl TradeEvent {
    /// Returns `None` for non-positive or non-finite quantities.
    pub fn new(kind: TradeKind, quantity: f64, actor: impl Into<String>, occurred_at: DateTime<Utc>) -> Option<Self> {
        if !quantity.is_finite() || quantity <= 0.0 {
            return None;
        }
        Some(Self {
            kind,
            quantity,
            actor: actor.into(),
            occurred_at,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatEvent {
    pub author: String,
    pub text: String,
    pub occurred_at: DateTime<Utc>,
}

impl ChatEvent {
    /// Clips text to `max_chars` characters and rejects blank lines.
    pub fn new(author: impl Into<String>, text: &str, occurred_at: DateTime<Utc>, max_chars: usize) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some(Self {
            author: author.into(),
            text: text.chars().take(max_chars).collect(),
            occurred_at,
        })
    }
}

/// Percent price change over fixed windows
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceChange {
    pub m5: f64,
    pub h1: f64,
    pub h24: f64,
}

/// Latest market figures for the watched asset. Replaced wholesale on refresh.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub address: String,
    pub price: f64,
    pub market_cap: f64,
    pub change: PriceChange,
    pub volume_24h: f64,
    pub liquidity: f64,
    pub fetched_at: DateTime<Utc>,
}

/// Everything that flows through the event bus into the ingestion loop
#[derive(Clone, Debug)]
pub enum Event {
    Trade(TradeEvent),
    Chat(ChatEvent),
    Market(MarketSnapshot),
    /// Periodic timer tick
    Tick,
}

/// Hint handed to the trigger policy describing what the last event changed
#[derive(Clone, Debug)]
pub enum ContextChange {
    Trade(TradeEvent),
    Chat(ChatEvent),
    Market,
    /// `idle` is the time since the last utterance started, `None` if never
    Tick { idle: Option<Duration> },
}

#[derive(Clone, Debug, PartialEq)]
pub enum TriggerKind {
    LargeTrade { side: TradeKind, quantity: f64 },
    Pump { change_pct: f64 },
    Dump { change_pct: f64 },
    ChatActivity,
    Periodic,
}

impl TriggerKind {
    pub fn label(&self) -> String {
        match self {
            TriggerKind::LargeTrade { side, .. } => format!("large-trade:{}", side),
            TriggerKind::Pump { .. } => "pump".to_string(),
            TriggerKind::Dump { .. } => "dump".to_string(),
            TriggerKind::ChatActivity => "chat-activity".to_string(),
            TriggerKind::Periodic => "periodic".to_string(),
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Read-only copy of the rolling context. Trades and chats are oldest first.
#[derive(Clone, Debug, Default)]
pub struct ContextSnapshot {
    pub trades: Vec<TradeEvent>,
    pub chats: Vec<ChatEvent>,
    pub market: Option<MarketSnapshot>,
    pub previous_market: Option<MarketSnapshot>,
}

impl ContextSnapshot {
    pub fn latest_trade(&self) -> Option<&TradeEvent> {
        self.trades.last()
    }

    pub fn latest_chat(&self) -> Option<&ChatEvent> {
        self.chats.last()
    }

    /// Up to `n` trades, newest first
    pub fn recent_trades(&self, n: usize) -> impl Iterator<Item = &TradeEvent> {
        self.trades.iter().rev().take(n)
    }

    /// Up to `n` chat lines, oldest first
    pub fn recent_chats(&self, n: usize) -> &[ChatEvent] {
        let start = self.chats.len().saturating_sub(n);
        &self.chats[start..]
    }
}

/// A labeled decision that a reaction is warranted
#[derive(Clone, Debug)]
pub struct ReactionTrigger {
    pub kind: TriggerKind,
    pub snapshot: ContextSnapshot,
}

impl ReactionTrigger {
    pub fn label(&self) -> String {
        self.kind.label()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    #[default]
    Neutral,
    Bullish,
    Bearish,
    Laughing,
    Skeptical,
    Shocked,
}

impl Emotion {
    /// Unknown tags map to neutral
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "bullish" => Emotion::Bullish,
            "bearish" => Emotion::Bearish,
            "laughing" => Emotion::Laughing,
            "skeptical" => Emotion::Skeptical,
            "shocked" => Emotion::Shocked,
            _ => Emotion::Neutral,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    #[default]
    None,
    BuySignal,
    SellSignal,
    RugWarning,
}

impl Intent {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "buy_signal" => Intent::BuySignal,
            "sell_signal" => Intent::SellSignal,
            "rug_warning" => Intent::RugWarning,
            _ => Intent::None,
        }
    }
}

/// One unit of commentary, owned by the speech serializer until spoken
#[derive(Clone, Debug, PartialEq)]
pub struct SpeechItem {
    pub text: String,
    pub emotion: Emotion,
    /// URL path of rendered audio, filled in by the serializer
    pub audio: Option<String>,
}

impl SpeechItem {
    pub fn new(text: impl Into<String>, emotion: Emotion) -> Self {
        Self {
            text: text.into(),
            emotion,
            audio: None,
        }
    }
}

/// Record pushed to every connected viewer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BroadcastMessage {
    Speak {
        text: String,
        emotion: Emotion,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        audio: Option<String>,
    },
    Emotion {
        emotion: Emotion,
    },
}
