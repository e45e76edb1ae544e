//! Custom error types for the commentary engine
//!
//! Provides structured, typed errors instead of generic Box<dyn Error>

use thiserror::Error;

/// Top-level engine errors. Anything here either stops startup or is
/// reported back through the control surface.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("No asset identifier configured")]
    MissingAsset,

    #[error("Market data unavailable for {asset}: {reason}")]
    MarketData { asset: String, reason: String },

    #[error("Engine is not running")]
    NotRunning,

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tokio_cron_scheduler::JobSchedulerError> for EngineError {
    fn from(err: tokio_cron_scheduler::JobSchedulerError) -> Self {
        EngineError::Scheduler(err.to_string())
    }
}

/// Upstream data source errors (push feed, pull feed, market data)
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Feed unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Timed out after {ms}ms waiting for {what}")]
    Timeout { what: &'static str, ms: u64 },

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl From<tokio_tungstenite::tungstenite::Error> for FeedError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        FeedError::WebSocket(err.to_string())
    }
}

/// Text-generation collaborator errors. Always absorbed by the gateway.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Text generation credentials not configured")]
    MissingCredentials,

    #[error("Text generation timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("Malformed generation output: {0}")]
    Malformed(String),

    #[error("Text generation API error: {0}")]
    Api(String),
}

impl From<async_openai::error::OpenAIError> for GenerationError {
    fn from(err: async_openai::error::OpenAIError) -> Self {
        GenerationError::Api(err.to_string())
    }
}

/// TTS collaborator errors. Always absorbed by the speech serializer.
#[derive(Error, Debug)]
pub enum TtsError {
    #[error("TTS credentials not configured")]
    MissingCredentials,

    #[error("TTS HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("TTS network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Audio write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Speech queue admission errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SpeechError {
    #[error("Speech queue full ({pending}/{max} pending)")]
    QueueFull { pending: usize, max: usize },

    #[error("Refusing to queue empty text")]
    EmptyText,
}
