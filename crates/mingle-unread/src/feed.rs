use mingle_types::{Match, Message, ParticipantSlot};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FeedError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("feed unavailable: {0}")]
    Unavailable(String),
}

pub type FeedResult<T> = Result<T, FeedError>;

/// Matches where `user_id` sits in `slot`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchQuery {
    pub slot: ParticipantSlot,
    pub user_id: String,
}

impl MatchQuery {
    pub fn new(slot: ParticipantSlot, user_id: impl Into<String>) -> Self {
        Self {
            slot,
            user_id: user_id.into(),
        }
    }

    pub fn matches(&self, m: &Match) -> bool {
        m.participant(self.slot) == self.user_id
    }
}

/// Messages belonging to any of `match_ids`. Backends cap the size of the
/// id list, so callers build these through [`MessageQuery::batches`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageQuery {
    pub match_ids: Vec<String>,
}

impl MessageQuery {
    /// Split `match_ids` into queries of at most `batch_size` ids each.
    pub fn batches(match_ids: &[String], batch_size: usize) -> Vec<MessageQuery> {
        match_ids
            .chunks(batch_size.max(1))
            .map(|chunk| MessageQuery {
                match_ids: chunk.to_vec(),
            })
            .collect()
    }

    pub fn matches(&self, msg: &Message) -> bool {
        self.match_ids.iter().any(|id| *id == msg.match_id)
    }
}

/// Live query result stream. Every item is a full snapshot of the result
/// set or an error. Dropping the subscription unsubscribes.
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<FeedResult<T>>,
}

impl<T> Subscription<T> {
    /// A subscription and the sender a feed pushes snapshots into.
    pub fn channel() -> (mpsc::UnboundedSender<FeedResult<T>>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }

    pub async fn next(&mut self) -> Option<FeedResult<T>> {
        self.rx.recv().await
    }

    pub fn into_stream(self) -> UnboundedReceiverStream<FeedResult<T>> {
        UnboundedReceiverStream::new(self.rx)
    }
}

/// A document store with live queries.
///
/// Implementations deliver the current result set right after subscribing
/// and a fresh snapshot whenever it changes.
pub trait ChangeFeed: Send + Sync + 'static {
    fn watch_matches(&self, query: MatchQuery) -> Subscription<Vec<Match>>;

    fn watch_messages(&self, query: MessageQuery) -> Subscription<Vec<Message>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batches_respect_size() {
        let ids: Vec<String> = (0..23).map(|i| format!("m{}", i)).collect();
        let batches = MessageQuery::batches(&ids, 10);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].match_ids.len(), 10);
        assert_eq!(batches[2].match_ids, vec!["m20", "m21", "m22"]);

        assert!(MessageQuery::batches(&[], 10).is_empty());
    }

    #[tokio::test]
    async fn dropping_subscription_closes_sender() {
        let (tx, mut sub) = Subscription::<Vec<Message>>::channel();
        tx.send(Ok(vec![])).unwrap();
        assert_eq!(sub.next().await, Some(Ok(vec![])));
        drop(sub);
        assert!(tx.is_closed());
    }
}
