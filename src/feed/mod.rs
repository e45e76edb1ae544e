//! Feed adapters: push trade stream with reconnection, plus pull sources
//! for chat and for trades when the push channel is gone.

pub mod poll;
pub mod pumpfun;
pub mod traits;
pub mod ws;


pub use poll::{shared_seen, Deduplicating, Poller, SharedSeen};
pub use pumpfun::{PumpFunReplies, PumpFunTrades};
pub use traits::{FeedResult, Ingest, MarketDataSource, PolledItem, PullSource};
pub use ws::{FeedSession, FeedState, PushFeedAdapter};
