use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use crate::brain::fallback::FallbackResponder;
use crate::brain::persona::Persona;
use crate::config::GatewayConfig;
use crate::constants::{self, events};
use crate::error::GenerationError;
use crate::events::{Emotion, Intent, ReactionTrigger, SpeechItem, TriggerKind};
use crate::random::RandomSource;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Clone, Debug)]
pub struct GenerationRequest {
    /// Persona description
    pub system: String,
    /// Prior exchanges, oldest first
    pub history: Vec<(Role, String)>,
    /// Structured context block for this reaction
    pub context: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GenerationResponse {
    pub text: String,
    pub emotion: Emotion,
    pub intent: Intent,
    pub confidence: f64,
}

/// External text-generation collaborator
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, GenerationError>;
}

/// Minimum spacing between accepted reactions
pub struct RateLimiter {
    last_accepted: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_accepted: Mutex::new(None),
            min_interval,
        }
    }

    /// Checks and reserves the slot in one step
    pub fn try_acquire(&self) -> bool {
        let mut last = self.last_accepted.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        if let Some(prev) = *last {
            if now.duration_since(prev) < self.min_interval {
                return false;
            }
        }
        *last = Some(now);
        true
    }

    pub fn reset(&self) {
        *self.last_accepted.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

fn short_id(id: &str) -> String {
    id.chars().take(6).collect()
}

fn clip(text: &str, max: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}

fn signed(pct: f64) -> String {
    format!("{:+.1}%", pct)
}

/// Renders the structured context block sent with every request
pub fn build_context_block(trigger: &ReactionTrigger, config: &GatewayConfig) -> String {
    let snapshot = &trigger.snapshot;
    let mut out = String::new();

    let detail = match &trigger.kind {
        TriggerKind::LargeTrade { quantity, .. } => format!(" ({:.2} SOL)", quantity),
        TriggerKind::Pump { change_pct } | TriggerKind::Dump { change_pct } => {
            format!(" ({} in 5m)", signed(*change_pct))
        }
        TriggerKind::ChatActivity | TriggerKind::Periodic => String::new(),
    };
    let _ = writeln!(out, "EVENT: {}{}", trigger.label(), detail);

    match &snapshot.market {
        Some(m) => {
            let _ = writeln!(
                out,
                "MARKET: ${} | price ${} | mcap ${:.1}k | 5m {} | 1h {} | 24h {} | vol ${:.0}k | liq ${:.0}k",
                m.symbol,
                m.price,
                m.market_cap / 1000.0,
                signed(m.change.m5),
                signed(m.change.h1),
                signed(m.change.h24),
                m.volume_24h / 1000.0,
                m.liquidity / 1000.0
            );
        }
        None => out.push_str("MARKET: unknown\n"),
    }

    if !snapshot.trades.is_empty() {
        out.push_str("RECENT TRADES:\n");
        for t in snapshot.recent_trades(config.context_trades) {
            let _ = writeln!(
                out,
                "- {} {:.2} SOL by {}",
                t.kind.as_str().to_uppercase(),
                t.quantity,
                short_id(&t.actor)
            );
        }
    }

    if !snapshot.chats.is_empty() {
        out.push_str("RECENT CHAT:\n");
        for c in snapshot.recent_chats(config.context_chats) {
            let _ = writeln!(
                out,
                "- {}: {}",
                c.author,
                clip(&c.text, constants::gateway::CHAT_LINE_CHARS)
            );
        }
    }

    out.push_str("React to this.");
    out
}

/// Turns triggers into speech items: rate limit, collaborator call, local
/// fallback. Never retries the collaborator.
pub struct DecisionGateway {
    generator: Option<Arc<dyn TextGenerator>>,
    fallback: FallbackResponder,
    system_prompt: String,
    config: GatewayConfig,
    limiter: RateLimiter,
    history: Mutex<VecDeque<(Role, String)>>,
    /// Bumped by `reset`; a call that started before it does not touch history
    epoch: AtomicU64,
}

impl DecisionGateway {
    pub fn new(
        generator: Option<Arc<dyn TextGenerator>>,
        persona: &Persona,
        rng: Arc<dyn RandomSource>,
        config: GatewayConfig,
    ) -> Self {
        if generator.is_none() {
            info!("🗣️ No text generator configured, using local fallback commentary");
        }
        Self {
            generator,
            fallback: FallbackResponder::new(persona.clone(), rng),
            system_prompt: persona.system_prompt(),
            limiter: RateLimiter::new(Duration::from_millis(config.min_interval_ms)),
            config,
            history: Mutex::new(VecDeque::new()),
            epoch: AtomicU64::new(0),
        }
    }

    /// `None` means the trigger was rate limited and should be dropped.
    pub async fn decide(&self, trigger: &ReactionTrigger) -> Option<SpeechItem> {
        if !self.limiter.try_acquire() {
            debug!(
                event = events::REACTION_RATE_LIMITED,
                trigger = %trigger.label(),
                "⏳ Reaction rate limited"
            );
            return None;
        }

        let epoch = self.epoch.load(Ordering::SeqCst);
        let context = build_context_block(trigger, &self.config);
        match self.generate(&context).await {
            Ok(resp) => {
                if resp.intent != Intent::None {
                    info!("🚩 Collaborator flagged {:?} (confidence {:.2})", resp.intent, resp.confidence);
                }
                let text = clip(&resp.text, self.config.max_text_chars);
                self.remember(epoch, context, text.clone());
                Some(SpeechItem::new(text, resp.emotion))
            }
            Err(e) => {
                warn!(
                    event = events::REACTION_FALLBACK,
                    trigger = %trigger.label(),
                    "🔁 Using fallback commentary: {}",
                    e
                );
                Some(self.fallback.respond(trigger))
            }
        }
    }

    async fn generate(&self, context: &str) -> Result<GenerationResponse, GenerationError> {
        let generator = self.generator.as_ref().ok_or(GenerationError::MissingCredentials)?;
        let request = GenerationRequest {
            system: self.system_prompt.clone(),
            history: self.history().into_iter().collect(),
            context: context.to_string(),
        };

        let ms = self.config.timeout_ms;
        let resp = timeout(Duration::from_millis(ms), generator.generate(request))
            .await
            .map_err(|_| GenerationError::Timeout { ms })??;

        if resp.text.trim().is_empty() {
            return Err(GenerationError::Malformed("empty text".to_string()));
        }
        Ok(resp)
    }

    fn remember(&self, epoch: u64, context: String, reply: String) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!("🗑️ Not remembering a reply from before the last reset");
            return;
        }
        history.push_back((Role::User, context));
        history.push_back((Role::Assistant, reply));
        // whole exchanges only, so the oldest entry is always a User turn
        while history.len() > self.config.history_limit {
            history.pop_front();
            if matches!(history.front(), Some((Role::Assistant, _))) {
                history.pop_front();
            }
        }
    }

    pub fn history(&self) -> VecDeque<(Role, String)> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Forgets conversation history and the rate-limit slot
    pub fn reset(&self) {
        {
            let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
            self.epoch.fetch_add(1, Ordering::SeqCst);
            history.clear();
        }
        self.limiter.reset();
    }

    pub fn has_generator(&self) -> bool {
        self.generator.is_some()
    }
}
