//! Live commentary engine
//!
//! Watches one on-chain asset, aggregates its trades, chat and market data,
//! decides when a moment deserves a reaction and speaks it through a single
//! persona to every connected viewer.

pub mod api;
pub mod brain;
pub mod bus;
pub mod config;
pub mod constants;
pub mod data;
pub mod error;
pub mod events;
pub mod feed;
pub mod llm;
pub mod random;
pub mod services;
pub mod voice;

// Re-export commonly used types
pub use bus::EventBus;
pub use config::AppConfig;
pub use error::EngineError;
pub use events::{BroadcastMessage, Emotion, Event, SpeechItem};
pub use services::{Collaborators, CommentaryEngine, EngineStatus};

#[cfg(test)]
mod bus_tests;
#[cfg(test)]
mod config_tests;
