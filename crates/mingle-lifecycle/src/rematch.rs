use std::sync::Arc;

use chrono::{DateTime, Utc};
use mingle_db::{KeyValueStore, keys};
use mingle_types::MatchPolicy;
use tracing::{debug, warn};

use crate::counter::{self, CounterRead};
use crate::decision::Decision;

/// Per-match revival counter. No premium bypass.
pub struct RematchTracker {
    store: Arc<dyn KeyValueStore>,
    limit: u32,
}

impl RematchTracker {
    pub fn new(store: Arc<dyn KeyValueStore>, policy: &MatchPolicy) -> Self {
        Self {
            store,
            limit: policy.rematch_limit,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn count(&self, match_id: &str) -> u32 {
        counter::read(self.store.as_ref(), &keys::rematch(match_id)).value()
    }

    pub fn check_rematch(&self, match_id: &str) -> Decision {
        match counter::read(self.store.as_ref(), &keys::rematch(match_id)) {
            CounterRead::Known(n) if n < self.limit => Decision::Allowed,
            CounterRead::Known(_) => Decision::Denied,
            CounterRead::Indeterminate => Decision::IndeterminateDefaultedToAllowed,
        }
    }

    pub fn can_rematch(&self, match_id: &str) -> bool {
        self.check_rematch(match_id).is_allowed()
    }

    pub fn has_rematched(&self, match_id: &str) -> bool {
        self.count(match_id) > 0
    }

    pub fn increment(&self, match_id: &str) {
        if let Some(n) = counter::increment(self.store.as_ref(), &keys::rematch(match_id)) {
            debug!(match_id, "Rematch count now {}", n);
        }
    }

    /// Remember when the match was revived; its window restarts there.
    pub fn record_reconnect(&self, match_id: &str, at: DateTime<Utc>) {
        if let Err(e) = self.store.set(&keys::rematched_at(match_id), &at.to_rfc3339()) {
            warn!(match_id, "Failed to record reconnect time: {}", e);
        }
    }

    pub fn reconnected_at(&self, match_id: &str) -> Option<DateTime<Utc>> {
        let key = keys::rematched_at(match_id);
        let raw = match self.store.get(&key) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(match_id, "Failed to read reconnect time: {}", e);
                return None;
            }
        };
        match DateTime::parse_from_rfc3339(raw.trim()) {
            Ok(at) => Some(at.with_timezone(&Utc)),
            Err(e) => {
                warn!(match_id, "Corrupt reconnect time {:?}: {}", raw, e);
                None
            }
        }
    }

    /// Deletes the counter and reconnect time. Test and admin tooling only.
    pub fn reset(&self, match_id: &str) {
        counter::reset(self.store.as_ref(), &keys::rematch(match_id));
        counter::reset(self.store.as_ref(), &keys::rematched_at(match_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mingle_db::MemoryStore;

    fn tracker(store: Arc<MemoryStore>) -> RematchTracker {
        RematchTracker::new(store, &MatchPolicy::default())
    }

    #[test]
    fn one_rematch_allowed() {
        let rematch = tracker(Arc::new(MemoryStore::new()));
        assert_eq!(rematch.count("m1"), 0);
        assert!(rematch.can_rematch("m1"));
        assert!(!rematch.has_rematched("m1"));

        rematch.increment("m1");

        assert_eq!(rematch.count("m1"), 1);
        assert_eq!(rematch.check_rematch("m1"), Decision::Denied);
        assert!(!rematch.can_rematch("m1"));
        assert!(rematch.has_rematched("m1"));
        assert!(rematch.can_rematch("m2"));
    }

    #[test]
    fn uses_shared_key() {
        let store = Arc::new(MemoryStore::new());
        let rematch = tracker(store.clone());
        rematch.increment("m7");
        assert_eq!(store.get("mingle:rematch:m7").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn reconnect_time_round_trips() {
        let rematch = tracker(Arc::new(MemoryStore::new()));
        assert_eq!(rematch.reconnected_at("m1"), None);

        let at = DateTime::parse_from_rfc3339("2026-03-01T12:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        rematch.record_reconnect("m1", at);
        assert_eq!(rematch.reconnected_at("m1"), Some(at));

        rematch.reset("m1");
        assert_eq!(rematch.reconnected_at("m1"), None);
    }

    #[test]
    fn storage_failure_fails_open() {
        let store = Arc::new(MemoryStore::new());
        let rematch = tracker(store.clone());
        rematch.increment("m1");
        store.set_offline(true);

        assert_eq!(
            rematch.check_rematch("m1"),
            Decision::IndeterminateDefaultedToAllowed
        );
        assert!(!rematch.has_rematched("m1"));
        assert_eq!(rematch.reconnected_at("m1"), None);
    }

    #[test]
    fn corrupt_reconnect_time_is_ignored() {
        let store = Arc::new(MemoryStore::new());
        store.set(&keys::rematched_at("m1"), "yesterday").unwrap();
        assert_eq!(tracker(store).reconnected_at("m1"), None);
    }
}
