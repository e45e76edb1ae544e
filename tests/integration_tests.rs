//! Integration tests for the commentary engine.
//! These tests verify that components work together correctly.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use live_commentary::api::{router, AppState};
use live_commentary::config::{AppConfig, FeedConfig, SpeechConfig};
use live_commentary::error::FeedError;
use live_commentary::events::{BroadcastMessage, Emotion, Event, MarketSnapshot, PriceChange, SpeechItem, TradeEvent, TradeKind};
use live_commentary::feed::{FeedResult, FeedState, MarketDataSource, PolledItem, PullSource, PushFeedAdapter};
use live_commentary::random::{FixedRandom, RandomSource};
use live_commentary::services::hub::{BroadcastHub, ViewerConnection};
use live_commentary::services::speech::{Origin, SpeechSerializer};
use live_commentary::services::{Collaborators, CommentaryEngine, IngestMode};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::protocol::Message;

const MINT: &str = "PhiLmint111";

struct StaticMarket {
    fail: bool,
}

#[async_trait]
impl MarketDataSource for StaticMarket {
    async fn latest(&self, asset: &str) -> FeedResult<MarketSnapshot> {
        if self.fail {
            return Err(FeedError::Unavailable {
                reason: "dexscreener down".to_string(),
            });
        }
        Ok(MarketSnapshot {
            symbol: "PHIL".to_string(),
            address: asset.to_string(),
            price: 0.0001,
            market_cap: 55_000.0,
            change: PriceChange {
                m5: 2.0,
                h1: 5.0,
                h24: 12.0,
            },
            volume_24h: 30_000.0,
            liquidity: 10_000.0,
            fetched_at: Utc::now(),
        })
    }
}

/// Serves one fixed page of trades, then empty pages
struct TradePage {
    page: Mutex<Option<Vec<PolledItem>>>,
    calls: AtomicUsize,
}

#[async_trait]
impl PullSource for TradePage {
    fn name(&self) -> &'static str {
        "trade-page"
    }

    async fn fetch_recent(&self, _asset: &str, _cursor: Option<&str>) -> FeedResult<Vec<PolledItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.page.lock().unwrap().take().unwrap_or_default())
    }
}

fn trade(kind: TradeKind, quantity: f64) -> TradeEvent {
    TradeEvent::new(kind, quantity, "WhaleWallet", Utc::now()).unwrap()
}

fn fast_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.speech.min_duration_ms = 50;
    config.speech.per_word_ms = 5;
    config
}

fn degraded(market_fails: bool) -> Collaborators {
    Collaborators {
        generator: None,
        voice: None,
        market: Arc::new(StaticMarket { fail: market_fails }),
        push_feed: None,
        chat_source: None,
        trade_source: None,
        rng: Arc::new(FixedRandom(1.0)),
    }
}

async fn next_speak(viewer: &mut ViewerConnection) -> BroadcastMessage {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), viewer.recv())
            .await
            .expect("viewer starved")
            .expect("viewer closed");
        if matches!(msg, BroadcastMessage::Speak { .. }) {
            return msg;
        }
    }
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..500 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

/// Degraded mode end to end: no generator, no voice, the large trade is still
/// spoken as fallback text and reaches the viewer.
#[tokio::test]
async fn test_large_trade_reaches_viewer_without_collaborators() {
    let engine = CommentaryEngine::new(fast_config(), degraded(false));
    let mut viewer = engine.hub().connect();
    engine.start(MINT).await.unwrap();

    let opening = next_speak(&mut viewer).await;
    assert!(matches!(&opening, BroadcastMessage::Speak { text, .. } if text.contains("$PHIL")));

    engine.bus().publish(Event::Trade(trade(TradeKind::Buy, 1.0))).unwrap();
    match next_speak(&mut viewer).await {
        BroadcastMessage::Speak { text, emotion, audio } => {
            assert!(text.contains("1.00 SOL"), "fallback text: {}", text);
            assert_eq!(emotion, Emotion::Bullish);
            assert!(audio.is_none());
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(
        tokio::time::timeout(Duration::from_secs(1), viewer.recv()).await.unwrap(),
        Some(BroadcastMessage::Emotion {
            emotion: Emotion::Bullish
        })
    );

    engine.stop().await.unwrap();
}

/// Startup is fatal without an asset or without the first market snapshot
#[tokio::test]
async fn test_startup_failures_are_fatal() {
    let engine = CommentaryEngine::new(fast_config(), degraded(false));
    assert!(engine.start("").await.is_err());

    let engine = CommentaryEngine::new(fast_config(), degraded(true));
    let err = engine.start(MINT).await.unwrap_err();
    assert!(err.to_string().contains("dexscreener down"));
    assert!(!engine.status().is_live);
}

/// Accepts one subscription, sends `frames`, then closes. Nothing listens
/// afterwards, so every reconnect attempt fails.
async fn spawn_short_lived_feed(frames: Vec<String>) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        drop(listener);
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        let _subscribe = ws.next().await;
        ws.send(Message::Text(r#"{"message":"Successfully subscribed to keys."}"#.to_string()))
            .await
            .unwrap();
        for frame in frames {
            ws.send(Message::Text(frame)).await.unwrap();
        }
        ws.close(None).await.unwrap();
        while ws.next().await.is_some() {}
    });
    addr
}

fn trade_frame(signature: Option<&str>, sol: f64) -> String {
    let signature = signature.map(|s| format!(r#""signature":"{}","#, s)).unwrap_or_default();
    format!(
        r#"{{{}"txType":"buy","mint":"{}","solAmount":{},"traderPublicKey":"Wallet1234"}}"#,
        signature, MINT, sol
    )
}

fn short_lived_feed_config(addr: std::net::SocketAddr) -> FeedConfig {
    FeedConfig {
        push_url: format!("ws://{}", addr),
        ack_timeout_ms: 2_000,
        reconnect_base_delay_ms: 10,
        max_reconnect_attempts: 3,
        trade_poll_interval_secs: 1,
        ..FeedConfig::default()
    }
}

fn trade_page(items: Vec<PolledItem>) -> Arc<TradePage> {
    Arc::new(TradePage {
        page: Mutex::new(Some(items)),
        calls: AtomicUsize::new(0),
    })
}

/// The push feed delivers three trades, drops, fails to reconnect and the
/// engine carries on by polling without losing what it already aggregated.
#[tokio::test]
async fn test_feed_exhaustion_falls_back_to_polling() {
    let frames = [0.2, 0.6, 1.4].into_iter().map(|sol| trade_frame(None, sol)).collect();
    let feed_config = short_lived_feed_config(spawn_short_lived_feed(frames).await);
    let polled = trade_page(vec![PolledItem {
        id: Some("sig-polled".to_string()),
        event: Event::Trade(trade(TradeKind::Sell, 0.1)),
    }]);

    let mut config = fast_config();
    config.feed = feed_config.clone();
    let mut collaborators = degraded(false);
    collaborators.push_feed = Some(PushFeedAdapter::new(&feed_config));
    collaborators.trade_source = Some(polled.clone() as Arc<dyn PullSource>);

    let engine = CommentaryEngine::new(config, collaborators);
    engine.start(MINT).await.unwrap();

    let engine_ref = engine.clone();
    wait_until(move || engine_ref.status().ingest_mode == Some(IngestMode::Polling)).await;
    let engine_ref = engine.clone();
    wait_until(move || engine_ref.status().recent_trades == 4).await;

    let status = engine.status();
    assert_eq!(status.feed_state, Some(FeedState::Exhausted));
    assert!(status.is_live);
    assert!(polled.calls.load(Ordering::SeqCst) >= 1);

    engine.stop().await.unwrap();
}

/// Trades the push feed already delivered come back on the first poll page
/// after the fallback. They are aggregated and reacted to once.
#[tokio::test]
async fn test_fallback_poll_skips_pushed_trades() {
    let frames = vec![trade_frame(Some("sigA"), 2.0), trade_frame(Some("sigB"), 0.2)];
    let feed_config = short_lived_feed_config(spawn_short_lived_feed(frames).await);
    let polled = trade_page(vec![
        PolledItem {
            id: Some("sigNew".to_string()),
            event: Event::Trade(trade(TradeKind::Sell, 0.1)),
        },
        PolledItem {
            id: Some("sigB".to_string()),
            event: Event::Trade(trade(TradeKind::Buy, 0.2)),
        },
        PolledItem {
            id: Some("sigA".to_string()),
            event: Event::Trade(trade(TradeKind::Buy, 2.0)),
        },
    ]);

    let mut config = fast_config();
    config.feed = feed_config.clone();
    config.gateway.min_interval_ms = 0;
    let mut collaborators = degraded(false);
    collaborators.push_feed = Some(PushFeedAdapter::new(&feed_config));
    collaborators.trade_source = Some(polled.clone() as Arc<dyn PullSource>);

    let engine = CommentaryEngine::new(config, collaborators);
    let mut viewer = engine.hub().connect();
    engine.start(MINT).await.unwrap();

    let engine_ref = engine.clone();
    wait_until(move || engine_ref.status().ingest_mode == Some(IngestMode::Polling)).await;
    let source = polled.clone();
    wait_until(move || source.calls.load(Ordering::SeqCst) >= 2).await;

    assert_eq!(engine.status().recent_trades, 3);
    tokio::time::sleep(Duration::from_millis(500)).await;

    let mut whale_reactions = 0;
    while let Some(msg) = viewer.try_recv() {
        if let BroadcastMessage::Speak { text, .. } = msg {
            if text.contains("2.00") {
                whale_reactions += 1;
            }
        }
    }
    assert_eq!(whale_reactions, 1);
    engine.stop().await.unwrap();
}

/// A viewer that stops reading is dropped, everyone else keeps hearing the
/// speaker at full pace.
#[tokio::test(start_paused = true)]
async fn test_stuck_viewer_does_not_stall_speech() {
    let hub = BroadcastHub::new(4);
    let speech = SpeechSerializer::new(SpeechConfig::default(), None, Arc::new(hub.clone()));
    let _stuck = hub.connect();
    let mut healthy = hub.connect();

    let reader = tokio::spawn(async move {
        let mut heard = Vec::new();
        while heard.len() < 4 {
            if let Some(BroadcastMessage::Speak { text, .. }) = healthy.recv().await {
                heard.push(text);
            }
        }
        heard
    });

    for i in 0..4 {
        speech.enqueue(SpeechItem::new(format!("line {}", i), Emotion::Neutral), Origin::System).unwrap();
    }
    let worker = speech.spawn();

    let heard = tokio::time::timeout(Duration::from_secs(60), reader).await.unwrap().unwrap();
    assert_eq!(heard, vec!["line 0", "line 1", "line 2", "line 3"]);
    assert_eq!(hub.viewer_count(), 1);
    worker.abort();
}

/// The HTTP surface: health, status, control and audio hosting
#[tokio::test]
async fn test_http_surface() {
    let audio_dir = std::env::temp_dir().join(format!("live-commentary-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&audio_dir).unwrap();
    std::fs::write(audio_dir.join("sid-test.mp3"), b"ID3fake").unwrap();

    let engine = CommentaryEngine::new(fast_config(), degraded(false));
    let state = Arc::new(AppState {
        engine: engine.clone(),
        audio_dir: audio_dir.clone(),
    });
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move { axum::serve(listener, router(state)).await });

    let http = reqwest::Client::new();

    let health: serde_json::Value = http.get(format!("{}/health", base)).send().await.unwrap().json().await.unwrap();
    assert_eq!(health["status"], "ok");

    let status: serde_json::Value = http.get(format!("{}/status", base)).send().await.unwrap().json().await.unwrap();
    assert_eq!(status["isLive"], false);

    let resp = http.post(format!("{}/stop", base)).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 409);

    let resp = http
        .post(format!("{}/watch", base))
        .json(&serde_json::json!({"asset": MINT}))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let status: serde_json::Value = http.get(format!("{}/status", base)).send().await.unwrap().json().await.unwrap();
    assert_eq!(status["isLive"], true);
    assert_eq!(status["token"], "PHIL");
    assert_eq!(status["mcap"], 55_000.0);

    let resp = http
        .post(format!("{}/watch", base))
        .json(&serde_json::json!({"asset": "  "}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    let resp = http.get(format!("{}/audio/sid-test.mp3", base)).send().await.unwrap();
    assert_eq!(resp.headers()["content-type"], "audio/mpeg");
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"ID3fake");
    let resp = http.get(format!("{}/audio/missing.mp3", base)).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 404);

    engine.stop().await.ok();
    std::fs::remove_dir_all(&audio_dir).ok();
}

/// Viewers subscribe over server-sent events and receive JSON records
#[tokio::test]
async fn test_sse_stream_delivers_broadcasts() {
    let engine = CommentaryEngine::new(fast_config(), degraded(false));
    let state = Arc::new(AppState {
        engine: engine.clone(),
        audio_dir: std::env::temp_dir(),
    });
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move { axum::serve(listener, router(state)).await });

    let mut resp = reqwest::get(format!("{}/events", base)).await.unwrap();
    assert_eq!(resp.headers()["content-type"], "text/event-stream");
    let hub = engine.hub().clone();
    wait_until(move || hub.viewer_count() == 1).await;

    engine.hub().broadcast(&BroadcastMessage::Speak {
        text: "gm chat".to_string(),
        emotion: Emotion::Laughing,
        audio: None,
    });

    let mut body = String::new();
    while !body.contains("gm chat") {
        let chunk = tokio::time::timeout(Duration::from_secs(5), resp.chunk())
            .await
            .expect("no sse data")
            .unwrap()
            .expect("stream ended");
        body.push_str(&String::from_utf8_lossy(&chunk));
    }
    assert!(body.contains(r#""type":"speak""#));
    assert!(body.contains(r#""emotion":"laughing""#));
}

/// Production wiring without credentials degrades instead of failing
#[tokio::test]
async fn test_collaborators_from_config_without_keys() {
    let config = AppConfig::from_yaml_str("random_seed: 7\n").unwrap();
    let collaborators = Collaborators::from_config(&config);
    assert!(collaborators.generator.is_none());
    assert!(collaborators.voice.is_none());
    assert!(collaborators.push_feed.is_some());
    assert!(collaborators.chat_source.is_some());

    let a = collaborators.rng.next_f64();
    let again = Collaborators::from_config(&config);
    assert_eq!(again.rng.next_f64(), a);
}
