//! Live unread-message counts over a real-time document feed.

pub mod aggregator;
pub mod feed;
pub mod memory;

pub use aggregator::{AggregatorState, UnreadAggregator, UnreadHandle};
pub use feed::{ChangeFeed, FeedError, FeedResult, MatchQuery, MessageQuery, Subscription};
pub use memory::MemoryFeed;
