use std::sync::Arc;

use mingle_db::{KeyValueStore, keys};
use mingle_types::{MatchPolicy, Quota};
use tracing::debug;

use crate::counter::{self, Claim, CounterRead};
use crate::decision::Decision;
use crate::premium::{self, PremiumLookup};

/// Per-(match, user) message counter checked before every send.
pub struct QuotaTracker {
    store: Arc<dyn KeyValueStore>,
    premium: Arc<dyn PremiumLookup>,
    limit: u32,
}

impl QuotaTracker {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        premium: Arc<dyn PremiumLookup>,
        policy: &MatchPolicy,
    ) -> Self {
        Self {
            store,
            premium,
            limit: policy.message_limit,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Messages sent so far; 0 when absent or unreadable.
    pub fn count(&self, match_id: &str, user_id: &str) -> u32 {
        counter::read(self.store.as_ref(), &keys::message_count(match_id, user_id)).value()
    }

    pub fn increment(&self, match_id: &str, user_id: &str) {
        if let Some(n) = counter::increment(self.store.as_ref(), &keys::message_count(match_id, user_id)) {
            debug!(match_id, user_id, "Message count now {}", n);
        }
    }

    pub fn check_send(&self, match_id: &str, user_id: &str) -> Decision {
        if premium::is_premium(self.premium.as_ref(), user_id) {
            return Decision::Allowed;
        }

        match counter::read(self.store.as_ref(), &keys::message_count(match_id, user_id)) {
            CounterRead::Known(n) if n < self.limit => Decision::Allowed,
            CounterRead::Known(_) => Decision::Denied,
            CounterRead::Indeterminate => Decision::IndeterminateDefaultedToAllowed,
        }
    }

    /// Check and charge one message in a single step. Unlike
    /// [`check_send`](Self::check_send) followed by [`increment`](Self::increment),
    /// concurrent senders cannot both take the last slot.
    pub fn try_consume(&self, match_id: &str, user_id: &str) -> Decision {
        if premium::is_premium(self.premium.as_ref(), user_id) {
            self.increment(match_id, user_id);
            return Decision::Allowed;
        }

        let key = keys::message_count(match_id, user_id);
        match counter::claim_below(self.store.as_ref(), &key, self.limit) {
            Claim::Claimed(n) => {
                debug!(match_id, user_id, "Message count now {}", n);
                Decision::Allowed
            }
            Claim::AtLimit => Decision::Denied,
            Claim::Indeterminate => Decision::IndeterminateDefaultedToAllowed,
        }
    }

    pub fn can_send(&self, match_id: &str, user_id: &str) -> bool {
        self.check_send(match_id, user_id).is_allowed()
    }

    pub fn remaining(&self, match_id: &str, user_id: &str) -> Quota {
        if premium::is_premium(self.premium.as_ref(), user_id) {
            return Quota::Unlimited;
        }
        Quota::Limited(self.limit.saturating_sub(self.count(match_id, user_id)))
    }

    /// Deletes the counter. Test and admin tooling only.
    pub fn reset(&self, match_id: &str, user_id: &str) {
        counter::reset(self.store.as_ref(), &keys::message_count(match_id, user_id));
    }
}
