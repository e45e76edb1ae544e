use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::events::Event;

use super::traits::{FeedResult, Ingest, PolledItem, PullSource};

/// Bounded set of already-delivered item keys. Once it grows past
/// `capacity` the oldest keys are evicted until `retain` remain.
#[derive(Debug)]
pub struct SeenSet {
    order: VecDeque<String>,
    keys: HashSet<String>,
    capacity: usize,
    retain: usize,
}

impl SeenSet {
    pub fn new(capacity: usize, retain: usize) -> Self {
        Self {
            order: VecDeque::new(),
            keys: HashSet::new(),
            capacity,
            retain: retain.min(capacity),
        }
    }

    /// Returns true if the key was not seen before
    pub fn insert(&mut self, key: String) -> bool {
        if self.keys.contains(&key) {
            return false;
        }
        self.keys.insert(key.clone());
        self.order.push_back(key);

        if self.keys.len() > self.capacity {
            while self.order.len() > self.retain {
                if let Some(old) = self.order.pop_front() {
                    self.keys.remove(&old);
                }
            }
        }
        true
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// One seen-set shared by every source of the same item kind
pub type SharedSeen = Arc<Mutex<SeenSet>>;

pub fn shared_seen(capacity: usize, retain: usize) -> SharedSeen {
    Arc::new(Mutex::new(SeenSet::new(capacity, retain)))
}

/// Forwards keyed items only the first time their key shows up. Items
/// without a key (plain `ingest`) pass straight through.
pub struct Deduplicating {
    seen: SharedSeen,
    inner: Arc<dyn Ingest>,
}

impl Deduplicating {
    pub fn new(seen: SharedSeen, inner: Arc<dyn Ingest>) -> Self {
        Self { seen, inner }
    }
}

impl Ingest for Deduplicating {
    fn ingest(&self, event: Event) {
        self.inner.ingest(event);
    }

    fn ingest_item(&self, item: PolledItem) {
        let fresh = self
            .seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(item_key(&item));
        if fresh {
            self.inner.ingest(item.event);
        }
    }
}

fn occurred_at(event: &Event) -> Option<DateTime<Utc>> {
    match event {
        Event::Trade(t) => Some(t.occurred_at),
        Event::Chat(c) => Some(c.occurred_at),
        _ => None,
    }
}

/// De-duplication key: provider id, or a composite of the item's fields
pub fn item_key(item: &PolledItem) -> String {
    if let Some(id) = item.id.as_deref().filter(|id| !id.is_empty()) {
        return id.to_string();
    }
    match &item.event {
        Event::Trade(t) => format!(
            "trade|{}|{}|{}|{}",
            t.actor,
            t.occurred_at.timestamp_millis(),
            t.kind,
            t.quantity
        ),
        Event::Chat(c) => format!("chat|{}|{}|{}", c.author, c.occurred_at.timestamp_millis(), c.text),
        Event::Market(m) => format!("market|{}|{}", m.address, m.fetched_at.timestamp_millis()),
        Event::Tick => "tick".to_string(),
    }
}

/// Sorts oldest first regardless of the provider's order
pub fn normalize_order(items: &mut [PolledItem]) {
    items.sort_by_key(|item| occurred_at(&item.event));
}

/// Pull-based ingestion against one [`PullSource`]
pub struct Poller {
    source: Arc<dyn PullSource>,
    ingest: Arc<dyn Ingest>,
    seen: SharedSeen,
    cursor: Mutex<Option<String>>,
}

impl Poller {
    pub fn new(source: Arc<dyn PullSource>, ingest: Arc<dyn Ingest>, seen_capacity: usize, seen_retain: usize) -> Self {
        Self::with_seen(source, ingest, shared_seen(seen_capacity, seen_retain))
    }

    /// Shares `seen` with another source, so an item already delivered
    /// elsewhere is not ingested again
    pub fn with_seen(source: Arc<dyn PullSource>, ingest: Arc<dyn Ingest>, seen: SharedSeen) -> Self {
        Self {
            source,
            ingest,
            seen,
            cursor: Mutex::new(None),
        }
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    /// Fetches once and ingests unseen items oldest first. Returns how many
    /// were new.
    pub async fn poll_once(&self, asset: &str) -> FeedResult<usize> {
        let fresh = self.fetch_unseen(asset).await?;
        let count = fresh.len();
        for event in fresh {
            self.ingest.ingest(event);
        }
        if count > 0 {
            debug!("📥 [{}] {} new items", self.source.name(), count);
        }
        Ok(count)
    }

    /// Marks the current page as seen without ingesting it, so the first
    /// real poll only delivers what arrives afterwards
    pub async fn prime(&self, asset: &str) -> FeedResult<usize> {
        let skipped = self.fetch_unseen(asset).await?.len();
        info!("⏭️ [{}] Skipped {} items of backlog", self.source.name(), skipped);
        Ok(skipped)
    }

    async fn fetch_unseen(&self, asset: &str) -> FeedResult<Vec<Event>> {
        let cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let mut items = self.source.fetch_recent(asset, cursor.as_deref()).await?;
        normalize_order(&mut items);

        if let Some(id) = items.iter().rev().find_map(|i| i.id.clone()) {
            *self.cursor.lock().unwrap_or_else(PoisonError::into_inner) = Some(id);
        }
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(items
            .into_iter()
            .filter(|item| seen.insert(item_key(item)))
            .map(|item| item.event)
            .collect())
    }

    pub fn seen_count(&self) -> usize {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
