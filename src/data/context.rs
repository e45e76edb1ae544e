use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::ContextConfig;
use crate::events::{ChatEvent, ContextChange, ContextSnapshot, Event, MarketSnapshot, TradeEvent};
use crate::feed::traits::Ingest;

/// Bounded rolling state. Sizes never exceed capacity, eviction is FIFO.
#[derive(Clone, Debug)]
pub struct RollingContext {
    trades: VecDeque<TradeEvent>,
    chats: VecDeque<ChatEvent>,
    market: Option<MarketSnapshot>,
    previous_market: Option<MarketSnapshot>,
    trade_capacity: usize,
    chat_capacity: usize,
    total_ingested: u64,
}

impl RollingContext {
    pub fn new(trade_capacity: usize, chat_capacity: usize) -> Self {
        Self {
            trades: VecDeque::with_capacity(trade_capacity),
            chats: VecDeque::with_capacity(chat_capacity),
            market: None,
            previous_market: None,
            trade_capacity,
            chat_capacity,
            total_ingested: 0,
        }
    }

    fn push_bounded<T>(queue: &mut VecDeque<T>, item: T, limit: usize) {
        if limit == 0 {
            return;
        }
        while queue.len() >= limit {
            queue.pop_front();
        }
        queue.push_back(item);
    }

    pub fn push_trade(&mut self, trade: TradeEvent) {
        Self::push_bounded(&mut self.trades, trade, self.trade_capacity);
        self.total_ingested += 1;
    }

    pub fn push_chat(&mut self, chat: ChatEvent) {
        Self::push_bounded(&mut self.chats, chat, self.chat_capacity);
        self.total_ingested += 1;
    }

    /// Current snapshot becomes the previous one
    pub fn replace_market(&mut self, snapshot: MarketSnapshot) {
        self.previous_market = self.market.take();
        self.market = Some(snapshot);
    }

    pub fn trade_count(&self) -> usize {
        self.trades.len()
    }

    pub fn chat_count(&self) -> usize {
        self.chats.len()
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            trades: self.trades.iter().cloned().collect(),
            chats: self.chats.iter().cloned().collect(),
            market: self.market.clone(),
            previous_market: self.previous_market.clone(),
        }
    }
}

/// Counters for the status surface
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ContextCounts {
    pub trades: usize,
    pub chats: usize,
    pub total_ingested: u64,
}

/// Sole owner of the [`RollingContext`]. The lock is only held for the
/// duration of one append or copy, so readers never see a half-applied append.
#[derive(Clone, Debug)]
pub struct ContextAggregator {
    inner: Arc<RwLock<RollingContext>>,
}

impl ContextAggregator {
    pub fn new(config: &ContextConfig) -> Self {
        Self::with_capacity(config.trade_capacity, config.chat_capacity)
    }

    pub fn with_capacity(trade_capacity: usize, chat_capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(RollingContext::new(trade_capacity, chat_capacity))),
        }
    }

    pub fn append_trade(&self, trade: TradeEvent) {
        self.inner.write().unwrap_or_else(PoisonError::into_inner).push_trade(trade);
    }

    pub fn append_chat(&self, chat: ChatEvent) {
        self.inner.write().unwrap_or_else(PoisonError::into_inner).push_chat(chat);
    }

    pub fn update_market(&self, snapshot: MarketSnapshot) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace_market(snapshot);
    }

    /// Applies one bus event and describes the change for the trigger policy.
    /// Ticks do not touch state; the caller supplies the idle time.
    pub fn apply(&self, event: Event) -> ContextChange {
        match event {
            Event::Trade(trade) => {
                self.append_trade(trade.clone());
                ContextChange::Trade(trade)
            }
            Event::Chat(chat) => {
                self.append_chat(chat.clone());
                ContextChange::Chat(chat)
            }
            Event::Market(snapshot) => {
                self.update_market(snapshot);
                ContextChange::Market
            }
            Event::Tick => ContextChange::Tick { idle: None },
        }
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).snapshot()
    }

    pub fn market(&self) -> Option<MarketSnapshot> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).market.clone()
    }

    pub fn counts(&self) -> ContextCounts {
        let ctx = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        ContextCounts {
            trades: ctx.trade_count(),
            chats: ctx.chat_count(),
            total_ingested: ctx.total_ingested,
        }
    }

    /// Drops all events and market state, keeping capacities
    pub fn clear(&self) {
        let mut ctx = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *ctx = RollingContext::new(ctx.trade_capacity, ctx.chat_capacity);
    }
}

impl Ingest for ContextAggregator {
    fn ingest(&self, event: Event) {
        self.apply(event);
    }
}
