use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use mingle_types::{Match, MatchPolicy, Message, ParticipantSlot, UnreadCounts};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_stream::StreamExt;
use tokio_stream::StreamMap;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

use crate::feed::{ChangeFeed, FeedResult, MatchQuery, MessageQuery};

/// Lifecycle of one aggregator task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorState {
    /// Created, no subscriptions yet.
    Idle,
    /// Match and message subscriptions are live.
    Subscribed,
    /// Message batches were replaced after a match change and at least one
    /// new batch has not reported yet. Emissions are held until it does.
    Rebuilding,
    /// All subscriptions dropped. Terminal.
    TornDown,
}

/// Owner's side of a running aggregator. Dropping it tears the task down.
pub struct UnreadHandle {
    shutdown: Option<oneshot::Sender<()>>,
    state: watch::Receiver<AggregatorState>,
    task: Option<JoinHandle<()>>,
}

impl UnreadHandle {
    pub fn state(&self) -> AggregatorState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<AggregatorState> {
        self.state.clone()
    }

    /// Drop both match subscriptions, every message batch and any pending
    /// debounce, then wait for the task to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Unread aggregator task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for UnreadHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Live per-match unread counts for one user.
///
/// Watches the user's matches from both participant slots, keeps batched
/// message subscriptions over the resulting match ids, and emits the merged
/// counts after a trailing debounce.
pub struct UnreadAggregator;

impl UnreadAggregator {
    pub fn spawn(
        feed: Arc<dyn ChangeFeed>,
        user_id: impl Into<String>,
        policy: &MatchPolicy,
    ) -> (UnreadHandle, mpsc::UnboundedReceiver<UnreadCounts>) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (state_tx, state_rx) = watch::channel(AggregatorState::Idle);

        let worker = Worker {
            feed,
            user_id: user_id.into(),
            batch_size: policy.unread_batch_size,
            debounce: policy.unread_debounce,
            state: state_tx,
            out: out_tx,
            slot_ids: HashMap::new(),
            batches: StreamMap::new(),
            batch_ids: HashMap::new(),
            awaiting: HashSet::new(),
            counts: BTreeMap::new(),
            flush_at: None,
        };
        let task = tokio::spawn(worker.run(shutdown_rx));

        let handle = UnreadHandle {
            shutdown: Some(shutdown_tx),
            state: state_rx,
            task: Some(task),
        };
        (handle, out_rx)
    }
}

type Snapshots<T> = UnboundedReceiverStream<FeedResult<Vec<T>>>;

struct Worker {
    feed: Arc<dyn ChangeFeed>,
    user_id: String,
    batch_size: usize,
    debounce: Duration,
    state: watch::Sender<AggregatorState>,
    out: mpsc::UnboundedSender<UnreadCounts>,

    /// Latest match ids seen from each slot subscription.
    slot_ids: HashMap<ParticipantSlot, BTreeSet<String>>,
    /// Live message batch subscriptions, keyed by batch index.
    batches: StreamMap<usize, Snapshots<Message>>,
    batch_ids: HashMap<usize, Vec<String>>,
    /// Batches subscribed by the last rebuild that have not delivered anything yet.
    awaiting: HashSet<usize>,
    counts: BTreeMap<String, u32>,
    /// Trailing debounce deadline; `None` when nothing is pending.
    flush_at: Option<Instant>,
}

impl Worker {
    async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        let mut first: Snapshots<Match> = self
            .feed
            .watch_matches(MatchQuery::new(ParticipantSlot::First, self.user_id.clone()))
            .into_stream();
        let mut second: Snapshots<Match> = self
            .feed
            .watch_matches(MatchQuery::new(ParticipantSlot::Second, self.user_id.clone()))
            .into_stream();
        let (mut first_open, mut second_open) = (true, true);

        self.set_state(AggregatorState::Subscribed);
        info!(user_id = %self.user_id, "Unread aggregator started");

        loop {
            let flush_at = self.flush_at;
            let flush_ready = flush_at.is_some() && self.awaiting.is_empty();

            tokio::select! {
                _ = &mut shutdown => break,

                event = first.next(), if first_open => match event {
                    Some(event) => self.on_matches(ParticipantSlot::First, event),
                    None => {
                        debug!(user_id = %self.user_id, "user1Id match feed closed");
                        first_open = false;
                    }
                },

                event = second.next(), if second_open => match event {
                    Some(event) => self.on_matches(ParticipantSlot::Second, event),
                    None => {
                        debug!(user_id = %self.user_id, "user2Id match feed closed");
                        second_open = false;
                    }
                },

                Some((batch, event)) = self.batches.next(), if !self.batches.is_empty() => {
                    self.on_messages(batch, event);
                }

                _ = sleep_until(flush_at.unwrap_or_else(Instant::now)), if flush_ready => {
                    self.flush();
                }
            }
        }

        // Teardown: dropping the streams unsubscribes from the feed.
        drop(first);
        drop(second);
        self.batches.clear();
        self.batch_ids.clear();
        self.awaiting.clear();
        self.flush_at = None;
        self.set_state(AggregatorState::TornDown);
        info!(user_id = %self.user_id, "Unread aggregator torn down");
    }

    fn set_state(&self, next: AggregatorState) {
        self.state.send_replace(next);
    }

    fn on_matches(&mut self, slot: ParticipantSlot, event: FeedResult<Vec<Match>>) {
        match event {
            Ok(matches) => {
                let ids: BTreeSet<String> = matches.into_iter().map(|m| m.id).collect();
                debug!(
                    user_id = %self.user_id,
                    field = slot.field_name(),
                    "Match snapshot with {} matches",
                    ids.len()
                );
                self.slot_ids.insert(slot, ids);
                self.rebuild();
            }
            Err(e) => {
                warn!(
                    user_id = %self.user_id,
                    field = slot.field_name(),
                    "Match subscription error, keeping previous state: {}",
                    e
                );
            }
        }
    }

    /// Replace every message batch subscription with fresh ones over the
    /// current match id set. Stays `Rebuilding` until each new batch reports.
    fn rebuild(&mut self) {
        self.set_state(AggregatorState::Rebuilding);

        let match_ids: BTreeSet<String> = self.slot_ids.values().flatten().cloned().collect();

        self.batches.clear();
        self.batch_ids.clear();
        self.awaiting.clear();
        self.counts.retain(|id, _| match_ids.contains(id));
        for id in &match_ids {
            self.counts.entry(id.clone()).or_insert(0);
        }

        let ids: Vec<String> = match_ids.into_iter().collect();
        for (idx, query) in MessageQuery::batches(&ids, self.batch_size)
            .into_iter()
            .enumerate()
        {
            self.batch_ids.insert(idx, query.match_ids.clone());
            self.awaiting.insert(idx);
            let sub = self.feed.watch_messages(query);
            self.batches.insert(idx, sub.into_stream());
        }

        debug!(
            user_id = %self.user_id,
            "Resubscribed {} matches across {} batches",
            ids.len(),
            self.batches.len()
        );
        self.schedule_flush();
        self.settle();
    }

    /// Leave `Rebuilding` once no new batch is outstanding.
    fn settle(&mut self) {
        if self.awaiting.is_empty() && *self.state.borrow() == AggregatorState::Rebuilding {
            self.set_state(AggregatorState::Subscribed);
        }
    }

    fn on_messages(&mut self, batch: usize, event: FeedResult<Vec<Message>>) {
        let first_report = self.awaiting.remove(&batch);
        let messages = match event {
            Ok(messages) => messages,
            Err(e) => {
                warn!(
                    user_id = %self.user_id,
                    batch,
                    "Message batch subscription error, keeping stale counts: {}",
                    e
                );
                if first_report {
                    self.settle();
                }
                return;
            }
        };
        let Some(ids) = self.batch_ids.get(&batch) else {
            return;
        };

        let mut fresh: HashMap<&str, u32> = ids.iter().map(|id| (id.as_str(), 0)).collect();
        for msg in &messages {
            if !msg.is_unread_for(&self.user_id) {
                continue;
            }
            if let Some(count) = fresh.get_mut(msg.match_id.as_str()) {
                *count += 1;
            }
        }
        for (id, count) in fresh {
            self.counts.insert(id.to_string(), count);
        }

        self.schedule_flush();
        self.settle();
    }

    fn schedule_flush(&mut self) {
        self.flush_at = Some(Instant::now() + self.debounce);
    }

    fn flush(&mut self) {
        self.flush_at = None;
        let counts: UnreadCounts = self
            .counts
            .iter()
            .map(|(id, count)| (id.clone(), *count))
            .collect();
        debug!(user_id = %self.user_id, "Unread total {}", counts.total());
        if self.out.send(counts).is_err() {
            debug!(user_id = %self.user_id, "Unread receiver dropped");
        }
    }
}
