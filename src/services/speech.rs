use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::SpeechConfig;
use crate::constants::events;
use crate::error::SpeechError;
use crate::events::SpeechItem;
use crate::voice::Voice;

/// Who asked for an utterance
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    /// A reaction trigger, subject to backpressure
    Trigger,
    /// The engine itself (opening line), always admitted
    System,
}

/// Receives each utterance as it starts
pub trait SpeechSink: Send + Sync {
    fn on_speak(&self, item: &SpeechItem);
}

/// Estimated speaking time: a fixed time per word with a floor. Playback
/// happens on the viewer side, so there is no real completion signal.
pub fn estimate_duration(text: &str, config: &SpeechConfig) -> Duration {
    let words = text.split_whitespace().count() as u64;
    Duration::from_millis(words.saturating_mul(config.per_word_ms).max(config.min_duration_ms))
}

struct Shared {
    queue: Mutex<VecDeque<SpeechItem>>,
    notify: Notify,
    speaking: AtomicBool,
    last_started: Mutex<Option<(Instant, DateTime<Utc>)>>,
    config: SpeechConfig,
    voice: Option<Arc<dyn Voice>>,
    sink: Arc<dyn SpeechSink>,
}

/// Single speaker: FIFO queue drained one utterance at a time
#[derive(Clone)]
pub struct SpeechSerializer {
    inner: Arc<Shared>,
}

impl SpeechSerializer {
    pub fn new(config: SpeechConfig, voice: Option<Arc<dyn Voice>>, sink: Arc<dyn SpeechSink>) -> Self {
        if voice.is_none() {
            info!("🔇 No voice configured, speaking text-only");
        }
        Self {
            inner: Arc::new(Shared {
                queue: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
                speaking: AtomicBool::new(false),
                last_started: Mutex::new(None),
                config,
                voice,
                sink,
            }),
        }
    }

    /// Queues an item and returns the new queue depth.
    pub fn enqueue(&self, item: SpeechItem, origin: Origin) -> Result<usize, SpeechError> {
        if item.text.trim().is_empty() {
            return Err(SpeechError::EmptyText);
        }

        let depth = {
            let mut queue = self.inner.queue.lock().unwrap_or_else(PoisonError::into_inner);
            let max = self.inner.config.max_pending;
            if origin == Origin::Trigger && queue.len() >= max {
                return Err(SpeechError::QueueFull {
                    pending: queue.len(),
                    max,
                });
            }
            queue.push_back(item);
            queue.len()
        };

        self.inner.notify.notify_one();
        Ok(depth)
    }

    pub fn pending(&self) -> usize {
        self.inner.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_speaking(&self) -> bool {
        self.inner.speaking.load(Ordering::SeqCst)
    }

    pub fn last_spoken_at(&self) -> Option<DateTime<Utc>> {
        self.inner
            .last_started
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map(|(_, wall)| wall)
    }

    /// Time since the last utterance started, `None` if nothing was said yet
    pub fn idle(&self) -> Option<Duration> {
        self.inner
            .last_started
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map(|(at, _)| at.elapsed())
    }

    /// Drops everything still waiting and clears the speaking flag. Call it
    /// after the drain loop has been aborted.
    pub fn reset(&self) {
        self.inner.speaking.store(false, Ordering::SeqCst);
        let dropped = {
            let mut queue = self.inner.queue.lock().unwrap_or_else(PoisonError::into_inner);
            let n = queue.len();
            queue.clear();
            n
        };
        if dropped > 0 {
            debug!("🧹 Dropped {} pending utterances", dropped);
        }
    }

    /// Starts the drain loop. Only one should run at a time.
    pub fn spawn(&self) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                let item = this.next().await;
                this.speak(item).await;
            }
        })
    }

    async fn next(&self) -> SpeechItem {
        loop {
            let popped = self.inner.queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
            if let Some(item) = popped {
                return item;
            }
            self.inner.notify.notified().await;
        }
    }

    async fn speak(&self, mut item: SpeechItem) {
        self.inner.speaking.store(true, Ordering::SeqCst);

        if let Some(voice) = &self.inner.voice {
            match voice.render(&item.text).await {
                Ok(audio) => item.audio = Some(audio),
                Err(e) => warn!(event = events::TTS_FAILED, "🔇 TTS failed, speaking text-only: {}", e),
            }
        }

        let duration = estimate_duration(&item.text, &self.inner.config);
        *self.inner.last_started.lock().unwrap_or_else(PoisonError::into_inner) = Some((Instant::now(), Utc::now()));
        info!(
            event = events::UTTERANCE_STARTED,
            emotion = ?item.emotion,
            duration_ms = duration.as_millis() as u64,
            "🎙️ {}",
            item.text
        );
        self.inner.sink.on_speak(&item);

        tokio::time::sleep(duration).await;
        self.inner.speaking.store(false, Ordering::SeqCst);
    }
}
