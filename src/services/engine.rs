//! The commentary engine: one watched asset, one ingestion loop, one speaker.
//!
//! Every source publishes onto the [`EventBus`]. A single loop applies each
//! event to the context, evaluates the trigger policy on the fresh snapshot
//! and hands any trigger to a reaction task, so trigger evaluation never
//! races with ingestion.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::brain::{DecisionGateway, TextGenerator, TriggerPolicy};
use crate::bus::EventBus;
use crate::config::AppConfig;
use crate::constants::{self, events};
use crate::data::context::ContextAggregator;
use crate::data::market::DexScreenerClient;
use crate::error::EngineError;
use crate::events::{ContextChange, Emotion, Event, SpeechItem};
use crate::feed::{
    shared_seen, Deduplicating, FeedSession, FeedState, MarketDataSource, Poller, PullSource, PumpFunReplies, PumpFunTrades,
    PushFeedAdapter, SharedSeen,
};
use crate::llm::LLMClient;
use crate::random::{RandomSource, SeededRandom, ThreadRandom};
use crate::services::hub::BroadcastHub;
use crate::services::scheduler::Scheduler;
use crate::services::speech::{Origin, SpeechSerializer};
use crate::voice::{AudioStore, ElevenLabsVoice, Voice};

/// External collaborators, injectable for tests
pub struct Collaborators {
    pub generator: Option<Arc<dyn TextGenerator>>,
    pub voice: Option<Arc<dyn Voice>>,
    pub market: Arc<dyn MarketDataSource>,
    /// `None` goes straight to trade polling
    pub push_feed: Option<PushFeedAdapter>,
    pub chat_source: Option<Arc<dyn PullSource>>,
    pub trade_source: Option<Arc<dyn PullSource>>,
    pub rng: Arc<dyn RandomSource>,
}

impl Collaborators {
    /// Production wiring. Missing credentials leave the generator or voice
    /// unset, which runs the engine degraded rather than failing.
    pub fn from_config(config: &AppConfig) -> Self {
        let rng: Arc<dyn RandomSource> = match config.random_seed {
            Some(seed) => {
                info!("🎲 Using seeded randomness ({})", seed);
                Arc::new(SeededRandom::new(seed))
            }
            None => Arc::new(ThreadRandom),
        };

        let generator = LLMClient::from_config(&config.llm).map(|c| Arc::new(c) as Arc<dyn TextGenerator>);
        if generator.is_none() {
            warn!("🧠 No LLM key configured, using canned reactions");
        }

        let store = AudioStore::new(&config.server.audio_dir, &config.persona.name)
            .with_max_clips(config.server.max_audio_clips);
        let voice = ElevenLabsVoice::from_config(&config.voice, store, config.persona.emoji.clone(), &config.persona.name)
            .map(|v| Arc::new(v) as Arc<dyn Voice>);

        Self {
            generator,
            voice,
            market: Arc::new(DexScreenerClient::new(&config.market)),
            push_feed: Some(PushFeedAdapter::new(&config.feed)),
            chat_source: Some(Arc::new(PumpFunReplies::new(&config.feed))),
            trade_source: Some(Arc::new(PumpFunTrades::new(&config.feed))),
            rng,
        }
    }
}

/// Where trades are coming from right now
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestMode {
    Push,
    Polling,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub is_live: bool,
    pub asset: Option<String>,
    pub token: Option<String>,
    pub price: Option<f64>,
    pub mcap: Option<f64>,
    pub recent_trades: usize,
    pub recent_chats: usize,
    pub events_ingested: u64,
    pub queue_length: usize,
    pub speaking: bool,
    pub viewers: usize,
    pub ingest_mode: Option<IngestMode>,
    pub feed_state: Option<FeedState>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_spoken_at: Option<DateTime<Utc>>,
}

/// What the background tasks of one run share
#[derive(Clone)]
struct RunScope {
    asset: String,
    run_id: u64,
    scheduler: Arc<Scheduler>,
    mode: Arc<Mutex<IngestMode>>,
    /// Trade keys seen on either the push feed or the trade poller
    trade_seen: SharedSeen,
}

struct ActiveRun {
    asset: String,
    started_at: DateTime<Utc>,
    scheduler: Arc<Scheduler>,
    feed: Option<FeedSession>,
    mode: Arc<Mutex<IngestMode>>,
}

pub struct CommentaryEngine {
    config: AppConfig,
    bus: EventBus,
    context: ContextAggregator,
    policy: TriggerPolicy,
    gateway: Arc<DecisionGateway>,
    speech: SpeechSerializer,
    hub: BroadcastHub,
    market: Arc<dyn MarketDataSource>,
    push_feed: Option<PushFeedAdapter>,
    chat_source: Option<Arc<dyn PullSource>>,
    trade_source: Option<Arc<dyn PullSource>>,
    /// Bumped on every start and teardown; work tagged with an older id is stale
    run_id: Arc<AtomicU64>,
    run: Mutex<Option<ActiveRun>>,
    control: tokio::sync::Mutex<()>,
}

impl CommentaryEngine {
    pub fn new(config: AppConfig, collaborators: Collaborators) -> Arc<Self> {
        let hub = BroadcastHub::new(config.hub.viewer_buffer);
        let speech = SpeechSerializer::new(config.speech.clone(), collaborators.voice, Arc::new(hub.clone()));
        let gateway = DecisionGateway::new(
            collaborators.generator,
            &config.persona,
            collaborators.rng.clone(),
            config.gateway.clone(),
        );
        let policy = TriggerPolicy::new(config.triggers.clone(), collaborators.rng);

        Arc::new(Self {
            bus: EventBus::new(constants::BUS_CAPACITY),
            context: ContextAggregator::new(&config.context),
            policy,
            gateway: Arc::new(gateway),
            speech,
            hub,
            market: collaborators.market,
            push_feed: collaborators.push_feed,
            chat_source: collaborators.chat_source,
            trade_source: collaborators.trade_source,
            run_id: Arc::new(AtomicU64::new(0)),
            run: Mutex::new(None),
            control: tokio::sync::Mutex::new(()),
            config,
        })
    }

    pub fn from_config(config: AppConfig) -> Arc<Self> {
        let collaborators = Collaborators::from_config(&config);
        Self::new(config, collaborators)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn hub(&self) -> &BroadcastHub {
        &self.hub
    }

    pub fn context(&self) -> &ContextAggregator {
        &self.context
    }

    pub fn gateway(&self) -> &DecisionGateway {
        &self.gateway
    }

    pub fn speech(&self) -> &SpeechSerializer {
        &self.speech
    }

    pub fn is_live(&self) -> bool {
        self.run.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Starts watching `asset`, replacing any current run.
    ///
    /// Fails only when no asset is given or the first market snapshot cannot
    /// be fetched. Every later upstream failure degrades instead.
    pub async fn start(self: &Arc<Self>, asset: &str) -> Result<(), EngineError> {
        let asset = asset.trim();
        if asset.is_empty() {
            return Err(EngineError::MissingAsset);
        }

        let _guard = self.control.lock().await;
        if let Some(previous) = self.take_run() {
            info!("🎯 Switching from {} to {}", previous.asset, asset);
            self.teardown(previous).await;
        }
        self.reset_state();

        let market = self.market.latest(asset).await.map_err(|e| EngineError::MarketData {
            asset: asset.to_string(),
            reason: e.to_string(),
        })?;
        info!(
            "📊 Watching ${} | MCap: ${:.1}k | 5m {:+.1}%",
            market.symbol,
            market.market_cap / 1000.0,
            market.change.m5
        );
        self.context.update_market(market.clone());

        let run_id = self.run_id.fetch_add(1, Ordering::SeqCst) + 1;
        let scheduler = Arc::new(Scheduler::new().await?);
        self.schedule_jobs(asset, &scheduler).await?;
        let feed_config = &self.config.feed;
        let scope = RunScope {
            asset: asset.to_string(),
            run_id,
            scheduler: Arc::clone(&scheduler),
            mode: Arc::new(Mutex::new(IngestMode::Push)),
            trade_seen: shared_seen(feed_config.seen_capacity, feed_config.seen_retain),
        };

        let rx = self.bus.subscribe();
        let engine = Arc::clone(self);
        let loop_scope = scope.clone();
        scheduler.track(tokio::spawn(async move { engine.ingest_loop(rx, loop_scope).await }));
        scheduler.track(self.speech.spawn());

        let opening = SpeechItem::new(self.config.persona.opening(&market.symbol, market.market_cap), Emotion::Bullish);
        if let Err(e) = self.speech.enqueue(opening, Origin::System) {
            warn!("⚠️ Opening line not queued: {}", e);
        }

        let feed = self.connect_feed(&scope).await;
        if let Some(source) = &self.chat_source {
            let poller = Poller::new(
                source.clone(),
                Arc::new(self.bus.clone()),
                feed_config.seen_capacity,
                feed_config.seen_retain,
            );
            self.spawn_poller(poller, feed_config.chat_poll_interval_secs, true, &scope);
        }

        if let Err(e) = scheduler.start().await {
            error!("❌ Scheduler failed to start: {}", e);
            self.run_id.fetch_add(1, Ordering::SeqCst);
            if let Err(e) = scheduler.shutdown().await {
                warn!("⚠️ Scheduler cleanup failed: {}", e);
            }
            return Err(e);
        }

        *self.run.lock().unwrap_or_else(PoisonError::into_inner) = Some(ActiveRun {
            asset: asset.to_string(),
            started_at: Utc::now(),
            scheduler,
            feed,
            mode: scope.mode,
        });
        info!("🔴 Live on {}", asset);
        Ok(())
    }

    /// Switches to another asset. Context, queued speech and collaborator
    /// history of the old asset are discarded.
    pub async fn retarget(self: &Arc<Self>, asset: &str) -> Result<(), EngineError> {
        info!("🎯 Retarget requested: {}", asset.trim());
        self.start(asset).await
    }

    pub async fn stop(&self) -> Result<(), EngineError> {
        let _guard = self.control.lock().await;
        let run = self.take_run().ok_or(EngineError::NotRunning)?;
        let asset = run.asset.clone();
        self.teardown(run).await;
        self.reset_state();
        info!("⏹️ Stopped watching {}", asset);
        Ok(())
    }

    pub fn status(&self) -> EngineStatus {
        let run = self.run.lock().unwrap_or_else(PoisonError::into_inner);
        let market = self.context.market();
        let counts = self.context.counts();

        EngineStatus {
            is_live: run.is_some(),
            asset: run.as_ref().map(|r| r.asset.clone()),
            token: market.as_ref().map(|m| m.symbol.clone()),
            price: market.as_ref().map(|m| m.price),
            mcap: market.as_ref().map(|m| m.market_cap),
            recent_trades: counts.trades,
            recent_chats: counts.chats,
            events_ingested: counts.total_ingested,
            queue_length: self.speech.pending(),
            speaking: self.speech.is_speaking(),
            viewers: self.hub.viewer_count(),
            ingest_mode: run
                .as_ref()
                .map(|r| *r.mode.lock().unwrap_or_else(PoisonError::into_inner)),
            feed_state: run.as_ref().and_then(|r| r.feed.as_ref().map(FeedSession::state)),
            started_at: run.as_ref().map(|r| r.started_at),
            last_spoken_at: self.speech.last_spoken_at(),
        }
    }

    fn take_run(&self) -> Option<ActiveRun> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    async fn teardown(&self, run: ActiveRun) {
        self.run_id.fetch_add(1, Ordering::SeqCst);
        drop(run.feed);
        if let Err(e) = run.scheduler.shutdown().await {
            warn!("⚠️ Scheduler shutdown failed: {}", e);
        }
    }

    fn reset_state(&self) {
        self.context.clear();
        self.speech.reset();
        self.gateway.reset();
    }

    async fn schedule_jobs(&self, asset: &str, scheduler: &Scheduler) -> Result<(), EngineError> {
        let market = self.market.clone();
        let bus = self.bus.clone();
        let watched = asset.to_string();
        scheduler
            .every(
                "market-refresh",
                Duration::from_secs(self.config.market.refresh_interval_secs.max(1)),
                move || {
                    let market = market.clone();
                    let bus = bus.clone();
                    let asset = watched.clone();
                    async move {
                        match market.latest(&asset).await {
                            Ok(snapshot) => {
                                bus.publish(Event::Market(snapshot)).ok();
                            }
                            Err(e) => warn!(event = events::MARKET_REFRESH_FAILED, "📉 Market refresh failed: {}", e),
                        }
                    }
                },
            )
            .await?;

        let bus = self.bus.clone();
        scheduler
            .every(
                "periodic-tick",
                Duration::from_secs(self.config.schedule.periodic_interval_secs.max(1)),
                move || {
                    let bus = bus.clone();
                    async move {
                        bus.publish(Event::Tick).ok();
                    }
                },
            )
            .await
    }

    /// Push feed first. Trade polling takes over when it cannot connect or
    /// once it gives up reconnecting.
    async fn connect_feed(self: &Arc<Self>, scope: &RunScope) -> Option<FeedSession> {
        let Some(adapter) = &self.push_feed else {
            self.fall_back_to_polling(scope, "no push feed configured");
            return None;
        };

        let ingest = Deduplicating::new(scope.trade_seen.clone(), Arc::new(self.bus.clone()));
        match adapter.connect(&scope.asset, Arc::new(ingest)).await {
            Ok(session) => {
                let mut state = session.subscribe();
                let engine = Arc::clone(self);
                let watch_scope = scope.clone();
                scope.scheduler.track(tokio::spawn(async move {
                    let exhausted = state.wait_for(|s| *s == FeedState::Exhausted).await.is_ok();
                    if exhausted {
                        engine.fall_back_to_polling(&watch_scope, "push feed gave up reconnecting");
                    }
                }));
                Some(session)
            }
            Err(e) => {
                self.fall_back_to_polling(scope, &e.to_string());
                None
            }
        }
    }

    fn fall_back_to_polling(&self, scope: &RunScope, reason: &str) {
        if self.run_id.load(Ordering::SeqCst) != scope.run_id {
            return;
        }
        *scope.mode.lock().unwrap_or_else(PoisonError::into_inner) = IngestMode::Polling;
        warn!(event = events::POLL_FALLBACK, "📡 Polling trades instead: {}", reason);
        if let Some(source) = &self.trade_source {
            // pushed signatures are already in trade_seen, so overlap is skipped
            let poller = Poller::with_seen(source.clone(), Arc::new(self.bus.clone()), scope.trade_seen.clone());
            self.spawn_poller(poller, self.config.feed.trade_poll_interval_secs, false, scope);
        }
    }

    /// With `skip_backlog` the first page is only marked as seen
    fn spawn_poller(&self, poller: Poller, every_secs: u64, skip_backlog: bool, scope: &RunScope) {
        let period = Duration::from_secs(every_secs.max(1));
        let current = Arc::clone(&self.run_id);
        let run_id = scope.run_id;
        let asset = scope.asset.clone();
        info!("🔁 Polling {} every {:?}", poller.source_name(), period);

        scope.scheduler.track(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut primed = !skip_backlog;
            loop {
                ticker.tick().await;
                if current.load(Ordering::SeqCst) != run_id {
                    break;
                }
                let result = if primed {
                    poller.poll_once(&asset).await
                } else {
                    poller.prime(&asset).await
                };
                match result {
                    Ok(_) => primed = true,
                    Err(e) => warn!("⚠️ [{}] poll failed: {}", poller.source_name(), e),
                }
            }
        }));
    }

    async fn ingest_loop(self: Arc<Self>, mut rx: broadcast::Receiver<Event>, scope: RunScope) {
        loop {
            match rx.recv().await {
                Ok(event) => self.handle_event(event, &scope),
                Err(RecvError::Lagged(n)) => warn!("⚠️ Ingestion lagged, skipped {} events", n),
                Err(RecvError::Closed) => break,
            }
        }
    }

    /// Applies one event and, if the policy fires, spawns the reaction.
    fn handle_event(&self, event: Event, scope: &RunScope) {
        if let Event::Market(snapshot) = &event {
            // a refresh that was in flight when the asset changed
            if snapshot.address != scope.asset {
                debug!("🗑️ Ignoring market data for {}", snapshot.address);
                return;
            }
        }

        let change = match self.context.apply(event) {
            ContextChange::Tick { .. } => ContextChange::Tick {
                idle: self.speech.idle(),
            },
            other => other,
        };
        if let ContextChange::Trade(trade) = &change {
            debug!("💰 {} {:.3} by {}", trade.kind, trade.quantity, trade.actor);
        }

        let snapshot = self.context.snapshot();
        let Some(trigger) = self.policy.evaluate(&snapshot, &change) else {
            return;
        };
        info!(event = events::TRIGGER_FIRED, trigger = %trigger.label(), "⚡ Trigger: {}", trigger.kind);

        let gateway = Arc::clone(&self.gateway);
        let speech = self.speech.clone();
        let current = Arc::clone(&self.run_id);
        let run_id = scope.run_id;
        scope.scheduler.track(tokio::spawn(async move {
            let Some(item) = gateway.decide(&trigger).await else {
                return;
            };
            if current.load(Ordering::SeqCst) != run_id {
                debug!("🗑️ Discarding reaction from a previous run");
                return;
            }
            match speech.enqueue(item, Origin::Trigger) {
                Ok(depth) => debug!("🗣️ Reaction queued (depth {})", depth),
                Err(e) => info!(event = events::REACTION_DROPPED, trigger = %trigger.label(), "🚮 Reaction dropped: {}", e),
            }
        }));
    }
}
