use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::brain::persona::Persona;
use crate::constants;
use crate::error::EngineError;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub audio_dir: String,
    pub max_audio_clips: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3456".to_string(),
            audio_dir: "./audio".to_string(),
            max_audio_clips: constants::audio::MAX_CLIPS,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub trade_capacity: usize,
    pub chat_capacity: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            trade_capacity: constants::context::TRADE_CAPACITY,
            chat_capacity: constants::context::CHAT_CAPACITY,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    pub large_trade_threshold: f64,
    pub pump_threshold_pct: f64,
    pub dump_threshold_pct: f64,
    /// 0 disables the delta check
    pub min_change_delta_pct: f64,
    pub chat_probability: f64,
    pub periodic_probability: f64,
    pub periodic_quiet_secs: u64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        use constants::triggers::*;
        Self {
            large_trade_threshold: LARGE_TRADE_THRESHOLD,
            pump_threshold_pct: PUMP_THRESHOLD_PCT,
            dump_threshold_pct: DUMP_THRESHOLD_PCT,
            min_change_delta_pct: MIN_CHANGE_DELTA_PCT,
            chat_probability: CHAT_PROBABILITY,
            periodic_probability: PERIODIC_PROBABILITY,
            periodic_quiet_secs: PERIODIC_QUIET_SECS,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub min_interval_ms: u64,
    pub timeout_ms: u64,
    pub history_limit: usize,
    pub context_trades: usize,
    pub context_chats: usize,
    pub max_text_chars: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        use constants::gateway::*;
        Self {
            min_interval_ms: MIN_INTERVAL_MS,
            timeout_ms: TIMEOUT_MS,
            history_limit: HISTORY_LIMIT,
            context_trades: CONTEXT_TRADES,
            context_chats: CONTEXT_CHATS,
            max_text_chars: MAX_TEXT_CHARS,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub max_pending: usize,
    pub per_word_ms: u64,
    pub min_duration_ms: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        use constants::speech::*;
        Self {
            max_pending: MAX_PENDING,
            per_word_ms: PER_WORD_MS,
            min_duration_ms: MIN_DURATION_MS,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub viewer_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            viewer_buffer: constants::hub::VIEWER_BUFFER,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub push_url: String,
    pub ack_timeout_ms: u64,
    pub reconnect_base_delay_ms: u64,
    pub max_reconnect_attempts: u32,
    pub replies_url: String,
    pub trades_url: String,
    pub chat_poll_interval_secs: u64,
    pub trade_poll_interval_secs: u64,
    pub poll_limit: usize,
    pub seen_capacity: usize,
    pub seen_retain: usize,
    pub max_chat_chars: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        use constants::feed::*;
        Self {
            push_url: PUSH_URL.to_string(),
            ack_timeout_ms: ACK_TIMEOUT_MS,
            reconnect_base_delay_ms: RECONNECT_BASE_DELAY_MS,
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
            replies_url: REPLIES_URL.to_string(),
            trades_url: TRADES_URL.to_string(),
            chat_poll_interval_secs: CHAT_POLL_INTERVAL_SECS,
            trade_poll_interval_secs: TRADE_POLL_INTERVAL_SECS,
            poll_limit: POLL_LIMIT,
            seen_capacity: SEEN_CAPACITY,
            seen_retain: SEEN_RETAIN,
            max_chat_chars: MAX_CHAT_CHARS,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub base_url: String,
    pub chain: String,
    pub refresh_interval_secs: u64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            base_url: constants::market::BASE_URL.to_string(),
            chain: constants::market::CHAIN.to_string(),
            refresh_interval_secs: constants::market::REFRESH_INTERVAL_SECS,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub periodic_interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            periodic_interval_secs: constants::schedule::PERIODIC_INTERVAL_SECS,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: String,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: "gpt-4o-mini".to_string(),
            max_tokens: 150,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub voice_id: String,
    pub model_id: String,
    pub stability: f64,
    pub similarity_boost: f64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.elevenlabs.io/v1/text-to-speech".to_string(),
            voice_id: "TxGEqnHWrfWFTfGW9XjX".to_string(),
            model_id: "eleven_multilingual_v2".to_string(),
            stability: 0.4,
            similarity_boost: 0.7,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Watched asset (token mint address)
    pub asset: Option<String>,
    pub random_seed: Option<u64>,

    pub server: ServerConfig,
    pub context: ContextConfig,
    pub triggers: TriggerConfig,
    pub gateway: GatewayConfig,
    pub speech: SpeechConfig,
    pub hub: HubConfig,
    pub feed: FeedConfig,
    pub market: MarketConfig,
    pub schedule: ScheduleConfig,
    pub llm: LlmConfig,
    pub voice: VoiceConfig,
    pub persona: Persona,
}

impl AppConfig {
    /// Reads a YAML file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, EngineError> {
        // Strip BOM if present
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: AppConfig =
            serde_yaml::from_str(content).map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Credentials and the watched asset may come from the environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub(crate) fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("LLM_API_KEY")
            .or_else(|| non_empty("OPENAI_API_KEY"))
            .or_else(|| non_empty("GROQ_API_KEY"))
        {
            self.llm.api_key = Some(key);
        }
        if let Some(url) = non_empty("LLM_BASE_URL") {
            self.llm.base_url = Some(url);
        }
        if let Some(model) = non_empty("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(key) = non_empty("ELEVENLABS_API_KEY") {
            self.voice.api_key = Some(key);
        }
        if let Some(asset) = non_empty("WATCH_ASSET") {
            self.asset = Some(asset);
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.context.trade_capacity == 0 || self.context.chat_capacity == 0 {
            return Err(EngineError::Config("context capacities must be positive".to_string()));
        }
        for (name, p) in [
            ("chat_probability", self.triggers.chat_probability),
            ("periodic_probability", self.triggers.periodic_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(EngineError::Config(format!("{} must be within [0, 1], got {}", name, p)));
            }
        }
        if self.triggers.large_trade_threshold <= 0.0 {
            return Err(EngineError::Config("large_trade_threshold must be positive".to_string()));
        }
        if self.feed.seen_retain > self.feed.seen_capacity {
            return Err(EngineError::Config("feed.seen_retain cannot exceed feed.seen_capacity".to_string()));
        }
        if self.hub.viewer_buffer == 0 {
            return Err(EngineError::Config("hub.viewer_buffer must be positive".to_string()));
        }
        if self.server.max_audio_clips == 0 {
            return Err(EngineError::Config("server.max_audio_clips must be positive".to_string()));
        }
        Ok(())
    }

    /// The configured asset, if any, trimmed
    pub fn watched_asset(&self) -> Option<&str> {
        self.asset.as_deref().map(str::trim).filter(|a| !a.is_empty())
    }
}
