use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info};
use uuid::Uuid;

use crate::constants::events;
use crate::events::{BroadcastMessage, SpeechItem};
use crate::services::speech::SpeechSink;

type Viewers = Arc<DashMap<Uuid, mpsc::Sender<BroadcastMessage>>>;

/// One live viewer channel. Dropping it disconnects the viewer.
pub struct ViewerConnection {
    pub id: Uuid,
    rx: mpsc::Receiver<BroadcastMessage>,
    viewers: Viewers,
}

impl ViewerConnection {
    pub async fn recv(&mut self) -> Option<BroadcastMessage> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<BroadcastMessage> {
        self.rx.try_recv().ok()
    }
}

impl Drop for ViewerConnection {
    fn drop(&mut self) {
        if self.viewers.remove(&self.id).is_some() {
            debug!("👋 Viewer {} disconnected", self.id);
        }
    }
}

/// Fan-out of broadcast records to every connected viewer. Never blocks on
/// a viewer: a failed write removes it.
#[derive(Clone)]
pub struct BroadcastHub {
    viewers: Viewers,
    buffer: usize,
}

impl BroadcastHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            viewers: Arc::new(DashMap::new()),
            buffer: buffer.max(1),
        }
    }

    pub fn connect(&self) -> ViewerConnection {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = Uuid::new_v4();
        self.viewers.insert(id, tx);
        info!(
            event = events::VIEWER_CONNECTED,
            viewers = self.viewers.len(),
            "📺 Viewer {} connected",
            id
        );
        ViewerConnection {
            id,
            rx,
            viewers: self.viewers.clone(),
        }
    }

    pub fn disconnect(&self, id: &Uuid) -> bool {
        self.viewers.remove(id).is_some()
    }

    pub fn viewer_count(&self) -> usize {
        self.viewers.len()
    }

    /// Sends to every viewer and returns how many accepted the message.
    pub fn broadcast(&self, msg: &BroadcastMessage) -> usize {
        let mut failed = Vec::new();
        let mut delivered = 0;

        for entry in self.viewers.iter() {
            match entry.value().try_send(msg.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => failed.push((*entry.key(), "too slow")),
                Err(TrySendError::Closed(_)) => failed.push((*entry.key(), "gone")),
            }
        }

        // removal after iteration: DashMap shards are still read-locked above
        for (id, reason) in failed {
            self.viewers.remove(&id);
            info!(event = events::VIEWER_PRUNED, "✂️ Pruned viewer {} ({})", id, reason);
        }
        delivered
    }
}

impl SpeechSink for BroadcastHub {
    fn on_speak(&self, item: &SpeechItem) {
        self.broadcast(&BroadcastMessage::Speak {
            text: item.text.clone(),
            emotion: item.emotion,
            audio: item.audio.clone(),
        });
        self.broadcast(&BroadcastMessage::Emotion { emotion: item.emotion });
    }
}
