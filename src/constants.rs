//! Application-wide constants and tuning defaults
//!
//! Config sections fall back to these values when a field is missing, so the
//! numbers here describe the behaviour of an out-of-the-box instance.

use std::time::Duration;

/// Rolling context capacities
pub mod context {
    /// Most recent trades kept for commentary
    pub const TRADE_CAPACITY: usize = 20;

    /// Most recent chat lines kept for commentary
    pub const CHAT_CAPACITY: usize = 10;
}

/// Trigger policy thresholds
pub mod triggers {
    /// Quantity (in quote units, e.g. SOL) at or above which a trade is "large"
    pub const LARGE_TRADE_THRESHOLD: f64 = 0.5;

    /// 5m change (percent) at or above which we call a pump
    pub const PUMP_THRESHOLD_PCT: f64 = 15.0;

    /// 5m drop (percent, positive number) at or above which we call a dump
    pub const DUMP_THRESHOLD_PCT: f64 = 15.0;

    /// Minimum move of the 5m change for a snapshot still past the same threshold to count as news
    pub const MIN_CHANGE_DELTA_PCT: f64 = 10.0;

    pub const CHAT_PROBABILITY: f64 = 0.3;
    pub const PERIODIC_PROBABILITY: f64 = 0.2;

    /// Periodic commentary only when we have been quiet this long
    pub const PERIODIC_QUIET_SECS: u64 = 30;
}

/// Decision gateway limits
pub mod gateway {
    pub const MIN_INTERVAL_MS: u64 = 8_000;
    pub const TIMEOUT_MS: u64 = 10_000;

    /// Messages (not exchanges) of collaborator history sent with a request
    pub const HISTORY_LIMIT: usize = 10;

    pub const CONTEXT_TRADES: usize = 5;
    pub const CONTEXT_CHATS: usize = 5;

    /// Generated text longer than this is cut
    pub const MAX_TEXT_CHARS: usize = 200;

    /// Chat lines are clipped to this in the context block
    pub const CHAT_LINE_CHARS: usize = 50;
}

/// Speech pacing
pub mod speech {
    pub const MAX_PENDING: usize = 3;
    pub const PER_WORD_MS: u64 = 200;
    pub const MIN_DURATION_MS: u64 = 3_000;
}

/// Broadcast hub
pub mod hub {
    /// Messages buffered per viewer before the viewer counts as too slow
    pub const VIEWER_BUFFER: usize = 32;
}

/// Feed adapter defaults
pub mod feed {
    use super::*;

    pub const PUSH_URL: &str = "wss://pumpportal.fun/api/data";
    pub const REPLIES_URL: &str = "https://frontend-api.pump.fun/replies";
    pub const TRADES_URL: &str = "https://frontend-api.pump.fun/trades/all";

    pub const ACK_TIMEOUT_MS: u64 = 10_000;

    /// Reconnect delay is base * attempt
    pub const RECONNECT_BASE_DELAY_MS: u64 = 2_000;
    pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

    pub const CHAT_POLL_INTERVAL_SECS: u64 = 15;
    pub const TRADE_POLL_INTERVAL_SECS: u64 = 10;
    pub const POLL_LIMIT: usize = 50;

    /// Seen-id set is trimmed back to SEEN_RETAIN once it passes SEEN_CAPACITY
    pub const SEEN_CAPACITY: usize = 1_000;
    pub const SEEN_RETAIN: usize = 500;

    pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

    pub const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

    /// Chat text beyond this is clipped at ingestion
    pub const MAX_CHAT_CHARS: usize = 500;
}

/// Market data defaults
pub mod audio {
    /// Rendered clips kept on disk per process
    pub const MAX_CLIPS: usize = 50;
}

pub mod market {
    pub const BASE_URL: &str = "https://api.dexscreener.com/tokens/v1";
    pub const CHAIN: &str = "solana";
    pub const REFRESH_INTERVAL_SECS: u64 = 20;
}

/// Scheduler defaults
pub mod schedule {
    pub const PERIODIC_INTERVAL_SECS: u64 = 45;
}

/// Event bus capacity
pub const BUS_CAPACITY: usize = 1_000;

/// Logging event names for structured logging
pub mod events {
    pub const FEED_CONNECTED: &str = "feed_connected";
    pub const FEED_CLOSED: &str = "feed_closed";
    pub const FEED_RECONNECTING: &str = "feed_reconnecting";
    pub const FEED_EXHAUSTED: &str = "feed_exhausted";
    pub const POLL_FALLBACK: &str = "poll_fallback";
    pub const TRIGGER_FIRED: &str = "trigger_fired";
    pub const REACTION_RATE_LIMITED: &str = "reaction_rate_limited";
    pub const REACTION_FALLBACK: &str = "reaction_fallback";
    pub const REACTION_DROPPED: &str = "reaction_dropped";
    pub const UTTERANCE_STARTED: &str = "utterance_started";
    pub const TTS_FAILED: &str = "tts_failed";
    pub const VIEWER_CONNECTED: &str = "viewer_connected";
    pub const VIEWER_PRUNED: &str = "viewer_pruned";
    pub const MARKET_REFRESH_FAILED: &str = "market_refresh_failed";
}
