use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::TriggerConfig;
use crate::events::{ContextChange, ContextSnapshot, ReactionTrigger, TradeEvent, TriggerKind};
use crate::random::RandomSource;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MarketZone {
    Pump,
    Dump,
}

/// Decides whether the last change warrants a reaction.
///
/// Rules in priority order, first match wins:
/// 1. large trade (quantity at or above the threshold)
/// 2. pump / dump when a fresh market snapshot is past a threshold, unless
///    the previous one was already past it with a similar figure
/// 3. chat activity, with probability
/// 4. periodic tick after a quiet period, with a lower probability
pub struct TriggerPolicy {
    config: TriggerConfig,
    rng: Arc<dyn RandomSource>,
}

impl TriggerPolicy {
    pub fn new(config: TriggerConfig, rng: Arc<dyn RandomSource>) -> Self {
        Self { config, rng }
    }

    pub fn config(&self) -> &TriggerConfig {
        &self.config
    }

    pub fn evaluate(&self, snapshot: &ContextSnapshot, change: &ContextChange) -> Option<ReactionTrigger> {
        let kind = self
            .large_trade(change)
            .or_else(|| self.market_move(snapshot, change))
            .or_else(|| self.chat_activity(change))
            .or_else(|| self.periodic(change))?;

        debug!("🎯 Trigger matched: {}", kind);
        Some(ReactionTrigger {
            kind,
            snapshot: snapshot.clone(),
        })
    }

    fn large_trade(&self, change: &ContextChange) -> Option<TriggerKind> {
        let ContextChange::Trade(TradeEvent { kind, quantity, .. }) = change else {
            return None;
        };
        (*quantity >= self.config.large_trade_threshold).then_some(TriggerKind::LargeTrade {
            side: *kind,
            quantity: *quantity,
        })
    }

    fn market_move(&self, snapshot: &ContextSnapshot, change: &ContextChange) -> Option<TriggerKind> {
        if !matches!(change, ContextChange::Market) {
            return None;
        }
        let current = snapshot.market.as_ref()?;
        let m5 = current.change.m5;
        let zone = self.zone(m5)?;

        // still past the same threshold and the 5m figure barely moved: a repeat
        if let Some(previous) = &snapshot.previous_market {
            let prev = previous.change.m5;
            if self.zone(prev) == Some(zone) && (m5 - prev).abs() < self.config.min_change_delta_pct {
                return None;
            }
        }

        Some(match zone {
            MarketZone::Pump => TriggerKind::Pump { change_pct: m5 },
            MarketZone::Dump => TriggerKind::Dump { change_pct: m5 },
        })
    }

    fn zone(&self, m5: f64) -> Option<MarketZone> {
        if m5 >= self.config.pump_threshold_pct {
            Some(MarketZone::Pump)
        } else if m5 <= -self.config.dump_threshold_pct {
            Some(MarketZone::Dump)
        } else {
            None
        }
    }

    fn chat_activity(&self, change: &ContextChange) -> Option<TriggerKind> {
        if !matches!(change, ContextChange::Chat(_)) {
            return None;
        }
        self.rng
            .chance(self.config.chat_probability)
            .then_some(TriggerKind::ChatActivity)
    }

    fn periodic(&self, change: &ContextChange) -> Option<TriggerKind> {
        let ContextChange::Tick { idle } = change else {
            return None;
        };
        let quiet = Duration::from_secs(self.config.periodic_quiet_secs);
        if matches!(idle, Some(idle) if *idle < quiet) {
            return None;
        }
        self.rng
            .chance(self.config.periodic_probability)
            .then_some(TriggerKind::Periodic)
    }
}
