use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mingle_db::KeyValueStore;
use mingle_types::{Match, MatchPolicy, Message};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{RematchError, SendError};
use crate::expiry::{ExpiryCalculator, format_remaining};
use crate::premium::PremiumLookup;
use crate::quota::QuotaTracker;
use crate::rematch::RematchTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStatus {
    Active { remaining: Duration },
    Expired,
}

impl MatchStatus {
    pub fn is_expired(self) -> bool {
        matches!(self, Self::Expired)
    }

    /// Badge text for match lists and chat headers.
    pub fn label(self) -> String {
        match self {
            Self::Active { remaining } => format_remaining(remaining),
            Self::Expired => "Expired".to_string(),
        }
    }
}

/// The checks a chat screen runs before it lets a participant act on a match.
pub struct MatchLifecycle {
    expiry: ExpiryCalculator,
    quota: QuotaTracker,
    rematch: RematchTracker,
}

impl MatchLifecycle {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        premium: Arc<dyn PremiumLookup>,
        policy: &MatchPolicy,
    ) -> Self {
        Self {
            expiry: ExpiryCalculator::from_policy(policy),
            quota: QuotaTracker::new(store.clone(), premium, policy),
            rematch: RematchTracker::new(store, policy),
        }
    }

    pub fn expiry(&self) -> &ExpiryCalculator {
        &self.expiry
    }

    pub fn quota(&self) -> &QuotaTracker {
        &self.quota
    }

    pub fn rematch(&self) -> &RematchTracker {
        &self.rematch
    }

    /// Start of the current active window: creation, or the last reconnect.
    pub fn window_start(&self, m: &Match) -> DateTime<Utc> {
        match self.rematch.reconnected_at(&m.id) {
            Some(at) if at > m.created_at => at,
            _ => m.created_at,
        }
    }

    pub fn status(&self, m: &Match, now: DateTime<Utc>) -> MatchStatus {
        let start = self.window_start(m);
        if self.expiry.is_expired(start, now) {
            MatchStatus::Expired
        } else {
            MatchStatus::Active {
                remaining: self.expiry.remaining(start, now),
            }
        }
    }

    /// Build the message `sender_id` wants to post, charging their quota.
    ///
    /// The counter is only incremented when a message is returned, so the
    /// caller persisting that message keeps the two in step.
    pub fn send_message(
        &self,
        m: &Match,
        sender_id: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Message, SendError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SendError::EmptyMessage);
        }
        if !m.is_participant(sender_id) {
            return Err(SendError::NotParticipant {
                match_id: m.id.clone(),
                user_id: sender_id.to_string(),
            });
        }
        if self.status(m, now).is_expired() {
            return Err(SendError::MatchExpired(m.id.clone()));
        }

        let decision = self.quota.try_consume(&m.id, sender_id);
        if !decision.is_allowed() {
            return Err(SendError::QuotaExhausted {
                match_id: m.id.clone(),
                limit: self.quota.limit(),
            });
        }
        if !decision.is_determinate() {
            warn!(match_id = %m.id, sender_id, "Quota unknown, allowing send");
        }

        Ok(Message {
            id: Uuid::new_v4().to_string(),
            match_id: m.id.clone(),
            sender_id: sender_id.to_string(),
            text: text.to_string(),
            created_at: now,
            read_by: vec![sender_id.to_string()],
        })
    }

    /// Revive an expired match, at most `rematch_limit` times.
    pub fn reconnect(&self, m: &Match, user_id: &str, now: DateTime<Utc>) -> Result<(), RematchError> {
        if !m.is_participant(user_id) {
            return Err(RematchError::NotParticipant {
                match_id: m.id.clone(),
                user_id: user_id.to_string(),
            });
        }
        if !self.status(m, now).is_expired() {
            return Err(RematchError::StillActive(m.id.clone()));
        }
        if !self.rematch.can_rematch(&m.id) {
            return Err(RematchError::LimitReached {
                match_id: m.id.clone(),
                limit: self.rematch.limit(),
            });
        }

        self.rematch.increment(&m.id);
        self.rematch.record_reconnect(&m.id, now);
        info!(match_id = %m.id, user_id, "Match reconnected");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::premium::{NoPremium, StaticPremium};
    use chrono::TimeDelta;
    use mingle_db::{MemoryStore, keys};

    fn sample_match(created_at: DateTime<Utc>) -> Match {
        Match {
            id: "m1".into(),
            user1_id: "alice".into(),
            user2_id: "bob".into(),
            created_at,
            venue_id: Some("cafe-42".into()),
        }
    }

    fn lifecycle(store: Arc<MemoryStore>) -> MatchLifecycle {
        MatchLifecycle::new(store, Arc::new(NoPremium), &MatchPolicy::default())
    }

    #[test]
    fn status_and_label() {
        let life = lifecycle(Arc::new(MemoryStore::new()));
        let now = Utc::now();

        let m = sample_match(now - TimeDelta::hours(2) - TimeDelta::minutes(15));
        let status = life.status(&m, now);
        assert_eq!(
            status,
            MatchStatus::Active { remaining: Duration::from_secs(21 * 3600 + 45 * 60) }
        );
        assert_eq!(status.label(), "21h 45m remaining");

        let old = sample_match(now - TimeDelta::hours(30));
        assert_eq!(life.status(&old, now), MatchStatus::Expired);
        assert_eq!(life.status(&old, now).label(), "Expired");
    }

    #[test]
    fn send_builds_message_and_charges_quota() {
        let life = lifecycle(Arc::new(MemoryStore::new()));
        let now = Utc::now();
        let m = sample_match(now);

        let msg = life.send_message(&m, "alice", "  hey there ", now).unwrap();
        assert_eq!(msg.match_id, "m1");
        assert_eq!(msg.text, "hey there");
        assert_eq!(msg.read_by, vec!["alice".to_string()]);
        assert!(msg.is_unread_for("bob"));
        assert_eq!(life.quota().count("m1", "alice"), 1);
        assert_eq!(life.quota().count("m1", "bob"), 0);
    }

    #[test]
    fn send_rejections_do_not_charge() {
        let life = lifecycle(Arc::new(MemoryStore::new()));
        let now = Utc::now();
        let m = sample_match(now);

        assert_eq!(life.send_message(&m, "alice", "   ", now), Err(SendError::EmptyMessage));
        assert!(matches!(
            life.send_message(&m, "mallory", "hi", now),
            Err(SendError::NotParticipant { .. })
        ));

        let old = sample_match(now - TimeDelta::hours(24));
        assert_eq!(
            life.send_message(&old, "alice", "hi", now),
            Err(SendError::MatchExpired("m1".into()))
        );
        assert_eq!(life.quota().count("m1", "alice"), 0);
    }

    #[test]
    fn quota_exhaustion_blocks_send() {
        let life = lifecycle(Arc::new(MemoryStore::new()));
        let now = Utc::now();
        let m = sample_match(now);

        for i in 0..10 {
            life.send_message(&m, "bob", &format!("msg {}", i), now).unwrap();
        }
        assert_eq!(
            life.send_message(&m, "bob", "one more", now),
            Err(SendError::QuotaExhausted { match_id: "m1".into(), limit: 10 })
        );
        // the other participant has their own allowance
        assert!(life.send_message(&m, "alice", "hi", now).is_ok());
    }

    #[test]
    fn concurrent_senders_cannot_overshoot() {
        let store = Arc::new(MemoryStore::new());
        store.set(&keys::message_count("m1", "bob"), "9").unwrap();
        let life = lifecycle(store);
        let now = Utc::now();
        let m = sample_match(now);

        let results: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| life.send_message(&m, "bob", "last one", now)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(life.quota().count("m1", "bob"), 10);
    }

    #[test]
    fn premium_sender_is_not_capped() {
        let store = Arc::new(MemoryStore::new());
        let life = MatchLifecycle::new(
            store,
            Arc::new(StaticPremium::new(["alice"])),
            &MatchPolicy::default(),
        );
        let now = Utc::now();
        let m = sample_match(now);
        for _ in 0..15 {
            life.send_message(&m, "alice", "again", now).unwrap();
        }
        assert_eq!(life.quota().count("m1", "alice"), 15);
    }

    #[test]
    fn offline_store_still_sends() {
        let store = Arc::new(MemoryStore::new());
        let life = lifecycle(store.clone());
        let now = Utc::now();
        let m = sample_match(now);
        store.set_offline(true);
        assert!(life.send_message(&m, "alice", "hi", now).is_ok());
    }

    #[test]
    fn reconnect_restarts_window_once() {
        let life = lifecycle(Arc::new(MemoryStore::new()));
        let now = Utc::now();
        let m = sample_match(now - TimeDelta::hours(26));

        assert_eq!(life.status(&m, now), MatchStatus::Expired);
        life.reconnect(&m, "bob", now).unwrap();
        assert!(life.rematch().has_rematched("m1"));
        assert_eq!(life.window_start(&m), life.rematch().reconnected_at("m1").unwrap());
        assert_eq!(
            life.status(&m, now),
            MatchStatus::Active { remaining: Duration::from_secs(24 * 3600) }
        );
        assert!(life.send_message(&m, "bob", "back again", now).is_ok());

        let later = now + TimeDelta::hours(25);
        assert_eq!(life.status(&m, later), MatchStatus::Expired);
        assert_eq!(
            life.reconnect(&m, "alice", later),
            Err(RematchError::LimitReached { match_id: "m1".into(), limit: 1 })
        );
    }

    #[test]
    fn reconnect_requires_expired_match_and_participant() {
        let life = lifecycle(Arc::new(MemoryStore::new()));
        let now = Utc::now();
        let fresh = sample_match(now);
        assert_eq!(
            life.reconnect(&fresh, "alice", now),
            Err(RematchError::StillActive("m1".into()))
        );

        let old = sample_match(now - TimeDelta::hours(48));
        assert!(matches!(
            life.reconnect(&old, "mallory", now),
            Err(RematchError::NotParticipant { .. })
        ));
        assert_eq!(life.rematch().count("m1"), 0);
    }
}
