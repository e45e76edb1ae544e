use async_trait::async_trait;

use crate::error::FeedError;
use crate::events::{Event, MarketSnapshot};

pub type FeedResult<T> = Result<T, FeedError>;

/// Sink for normalized feed events. Must not block.
pub trait Ingest: Send + Sync {
    fn ingest(&self, event: Event);

    /// Same as `ingest`, but keeps the provider id for sinks that de-duplicate
    fn ingest_item(&self, item: PolledItem) {
        self.ingest(item.event);
    }
}

/// One feed item with the provider's id, if it sent one
#[derive(Clone, Debug)]
pub struct PolledItem {
    /// Provider identifier, if the provider has one
    pub id: Option<String>,
    /// `Event::Trade` or `Event::Chat`
    pub event: Event,
}

/// Stateless "list recent items since cursor" operation
#[async_trait]
pub trait PullSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns a bounded list in whatever order the provider uses.
    async fn fetch_recent(&self, asset: &str, cursor: Option<&str>) -> FeedResult<Vec<PolledItem>>;
}

/// Pull-only market data for the watched asset
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn latest(&self, asset: &str) -> FeedResult<MarketSnapshot>;
}
