use std::sync::{Mutex, MutexGuard};

use mingle_types::{Match, Message};
use tokio::sync::mpsc;
use tracing::debug;

use crate::feed::{ChangeFeed, FeedError, FeedResult, MatchQuery, MessageQuery, Subscription};

type Watcher<Q, T> = (Q, mpsc::UnboundedSender<FeedResult<Vec<T>>>);

/// In-process [`ChangeFeed`]. Every mutation re-runs the live queries it
/// touches and pushes new snapshots; closed subscribers are pruned.
#[derive(Default)]
pub struct MemoryFeed {
    inner: Mutex<FeedState>,
}

#[derive(Default)]
struct FeedState {
    matches: Vec<Match>,
    messages: Vec<Message>,
    match_watchers: Vec<Watcher<MatchQuery, Match>>,
    message_watchers: Vec<Watcher<MessageQuery, Message>>,
}

impl FeedState {
    fn match_snapshot(&self, query: &MatchQuery) -> Vec<Match> {
        self.matches.iter().filter(|m| query.matches(m)).cloned().collect()
    }

    fn message_snapshot(&self, query: &MessageQuery) -> Vec<Message> {
        self.messages.iter().filter(|m| query.matches(m)).cloned().collect()
    }

    fn notify_matches(&mut self, touched: &[&Match]) {
        self.match_watchers.retain(|(_, tx)| !tx.is_closed());
        for (query, tx) in &self.match_watchers {
            if touched.iter().any(|m| query.matches(m)) {
                let _ = tx.send(Ok(self.match_snapshot(query)));
            }
        }
    }

    fn notify_messages(&mut self, match_id: &str) {
        self.message_watchers.retain(|(_, tx)| !tx.is_closed());
        for (query, tx) in &self.message_watchers {
            if query.match_ids.iter().any(|id| id == match_id) {
                let _ = tx.send(Ok(self.message_snapshot(query)));
            }
        }
    }
}

impl MemoryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FeedState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert or replace a match by id.
    pub fn upsert_match(&self, m: Match) {
        let mut state = self.state();
        let previous = match state.matches.iter().position(|existing| existing.id == m.id) {
            Some(idx) => Some(std::mem::replace(&mut state.matches[idx], m.clone())),
            None => {
                state.matches.push(m.clone());
                None
            }
        };
        debug!(match_id = %m.id, "Feed: match upserted");
        let touched: Vec<&Match> = previous.iter().chain(std::iter::once(&m)).collect();
        state.notify_matches(&touched);
    }

    pub fn remove_match(&self, match_id: &str) {
        let mut state = self.state();
        let Some(idx) = state.matches.iter().position(|m| m.id == match_id) else {
            return;
        };
        let removed = state.matches.remove(idx);
        debug!(match_id, "Feed: match removed");
        state.notify_matches(&[&removed]);
    }

    pub fn add_message(&self, msg: Message) {
        let mut state = self.state();
        let match_id = msg.match_id.clone();
        state.messages.push(msg);
        state.notify_messages(&match_id);
    }

    /// Mark every message in `match_id` as read by `user_id`.
    pub fn mark_read(&self, match_id: &str, user_id: &str) {
        let mut state = self.state();
        let mut changed = false;
        for msg in state.messages.iter_mut().filter(|m| m.match_id == match_id) {
            if msg.is_unread_for(user_id) {
                msg.read_by.push(user_id.to_string());
                changed = true;
            }
        }
        if changed {
            state.notify_messages(match_id);
        }
    }

    /// Push `err` to every live match subscription.
    pub fn fail_match_watchers(&self, err: FeedError) {
        let state = self.state();
        for (_, tx) in &state.match_watchers {
            let _ = tx.send(Err(err.clone()));
        }
    }

    /// Push `err` to every live message subscription.
    pub fn fail_message_watchers(&self, err: FeedError) {
        let state = self.state();
        for (_, tx) in &state.message_watchers {
            let _ = tx.send(Err(err.clone()));
        }
    }

    pub fn live_match_subscriptions(&self) -> usize {
        let state = self.state();
        state.match_watchers.iter().filter(|(_, tx)| !tx.is_closed()).count()
    }

    pub fn live_message_subscriptions(&self) -> usize {
        let state = self.state();
        state.message_watchers.iter().filter(|(_, tx)| !tx.is_closed()).count()
    }
}

impl ChangeFeed for MemoryFeed {
    fn watch_matches(&self, query: MatchQuery) -> Subscription<Vec<Match>> {
        let (tx, sub) = Subscription::channel();
        let mut state = self.state();
        let _ = tx.send(Ok(state.match_snapshot(&query)));
        state.match_watchers.push((query, tx));
        sub
    }

    fn watch_messages(&self, query: MessageQuery) -> Subscription<Vec<Message>> {
        let (tx, sub) = Subscription::channel();
        let mut state = self.state();
        let _ = tx.send(Ok(state.message_snapshot(&query)));
        state.message_watchers.push((query, tx));
        sub
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mingle_types::ParticipantSlot;

    fn pair(id: &str, a: &str, b: &str) -> Match {
        Match {
            id: id.into(),
            user1_id: a.into(),
            user2_id: b.into(),
            created_at: Utc::now(),
            venue_id: None,
        }
    }

    fn message(match_id: &str, sender: &str) -> Message {
        Message {
            id: format!("{}-{}", match_id, sender),
            match_id: match_id.into(),
            sender_id: sender.into(),
            text: "hello".into(),
            created_at: Utc::now(),
            read_by: vec![sender.into()],
        }
    }

    #[tokio::test]
    async fn subscribe_delivers_current_then_changes() {
        let feed = MemoryFeed::new();
        feed.upsert_match(pair("m1", "alice", "bob"));

        let mut sub = feed.watch_matches(MatchQuery::new(ParticipantSlot::First, "alice"));
        let first = sub.next().await.unwrap().unwrap();
        assert_eq!(first.len(), 1);

        feed.upsert_match(pair("m2", "alice", "carol"));
        let second = sub.next().await.unwrap().unwrap();
        assert_eq!(second.len(), 2);
    }

    #[tokio::test]
    async fn unrelated_changes_are_not_pushed() {
        let feed = MemoryFeed::new();
        let mut sub = feed.watch_messages(MessageQuery { match_ids: vec!["m1".into()] });
        assert_eq!(sub.next().await.unwrap().unwrap().len(), 0);

        feed.add_message(message("m9", "bob"));
        feed.add_message(message("m1", "bob"));
        let snapshot = sub.next().await.unwrap().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].match_id, "m1");
    }

    #[tokio::test]
    async fn mark_read_pushes_update() {
        let feed = MemoryFeed::new();
        feed.add_message(message("m1", "bob"));
        let mut sub = feed.watch_messages(MessageQuery { match_ids: vec!["m1".into()] });
        let before = sub.next().await.unwrap().unwrap();
        assert!(before[0].is_unread_for("alice"));

        feed.mark_read("m1", "alice");
        let after = sub.next().await.unwrap().unwrap();
        assert!(!after[0].is_unread_for("alice"));
    }

    #[test]
    fn dropped_subscriptions_are_not_live() {
        let feed = MemoryFeed::new();
        let sub = feed.watch_matches(MatchQuery::new(ParticipantSlot::Second, "bob"));
        assert_eq!(feed.live_match_subscriptions(), 1);
        drop(sub);
        assert_eq!(feed.live_match_subscriptions(), 0);
    }
}
