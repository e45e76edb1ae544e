//! Text-to-speech collaborator and rendered-audio storage

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::VoiceConfig;
use crate::constants;
use crate::error::TtsError;

/// Renders text to audio and returns a reference viewers can fetch
#[async_trait]
pub trait Voice: Send + Sync {
    async fn render(&self, text: &str) -> Result<String, TtsError>;
}

/// Prepares text for synthesis: strips the persona glyph, de-capitalizes an
/// all-caps persona name and collapses whitespace.
pub fn spoken_text(text: &str, emoji: Option<&str>, name: &str) -> String {
    let mut out = text.to_string();
    if let Some(glyph) = emoji.filter(|g| !g.is_empty()) {
        out = out.replace(glyph, "");
    }
    let shouting = name.to_uppercase();
    if !name.is_empty() && shouting != name {
        out = out.replace(&shouting, name);
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Writes rendered clips to the audio directory served at `/audio/`.
/// Keeps at most `max_clips` of its own clips, deleting the oldest.
#[derive(Clone, Debug)]
pub struct AudioStore {
    dir: PathBuf,
    prefix: String,
    max_clips: usize,
    written: Arc<Mutex<VecDeque<PathBuf>>>,
}

impl AudioStore {
    pub fn new(dir: impl Into<PathBuf>, prefix: &str) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.to_lowercase(),
            max_clips: constants::audio::MAX_CLIPS,
            written: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn with_max_clips(mut self, max_clips: usize) -> Self {
        self.max_clips = max_clips.max(1);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the URL path of the stored clip
    pub async fn save(&self, bytes: &[u8]) -> Result<String, TtsError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let file = format!("{}-{}.mp3", self.prefix, Uuid::new_v4());
        let path = self.dir.join(&file);
        tokio::fs::write(&path, bytes).await?;

        let expired: Vec<PathBuf> = {
            let mut written = self.written.lock().unwrap_or_else(PoisonError::into_inner);
            written.push_back(path);
            let excess = written.len().saturating_sub(self.max_clips);
            written.drain(..excess).collect()
        };
        for old in expired {
            // a viewer that is this far behind was pruned long ago
            if let Err(e) = tokio::fs::remove_file(&old).await {
                warn!("⚠️ Could not delete old clip {}: {}", old.display(), e);
            }
        }
        Ok(format!("/audio/{}", file))
    }
}

/// ElevenLabs text-to-speech over REST
pub struct ElevenLabsVoice {
    client: Client,
    api_key: String,
    config: VoiceConfig,
    store: AudioStore,
    emoji: Option<String>,
    name: String,
}

impl ElevenLabsVoice {
    /// `None` when no API key is configured (text-only mode)
    pub fn from_config(config: &VoiceConfig, store: AudioStore, emoji: Option<String>, name: &str) -> Option<Self> {
        let api_key = config.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())?;
        let client = Client::builder()
            .timeout(constants::feed::HTTP_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Some(Self {
            client,
            api_key: api_key.to_string(),
            config: config.clone(),
            store,
            emoji,
            name: name.to_string(),
        })
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, TtsError> {
        if self.api_key.is_empty() {
            return Err(TtsError::MissingCredentials);
        }
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), self.config.voice_id);
        let body = json!({
            "text": text,
            "model_id": self.config.model_id,
            "voice_settings": {
                "stability": self.config.stability,
                "similarity_boost": self.config.similarity_boost,
            }
        });

        let resp = self
            .client
            .post(&url)
            .header("Accept", "audio/mpeg")
            .header("xi-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TtsError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

#[async_trait]
impl Voice for ElevenLabsVoice {
    async fn render(&self, text: &str) -> Result<String, TtsError> {
        let text = spoken_text(text, self.emoji.as_deref(), &self.name);
        let bytes = self.synthesize(&text).await?;
        debug!("🔊 Synthesized {} bytes of audio", bytes.len());
        self.store.save(&bytes).await
    }
}
