//! Decimal counters in the key-value store, shared by both trackers.

use mingle_db::KeyValueStore;
use tracing::{debug, warn};

/// Upper bound on compare-and-swap retries under contention.
const MAX_CAS_ATTEMPTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CounterRead {
    Known(u32),
    /// Store failed or held garbage. Callers treat the value as zero.
    Indeterminate,
}

impl CounterRead {
    pub(crate) fn value(self) -> u32 {
        match self {
            Self::Known(n) => n,
            Self::Indeterminate => 0,
        }
    }
}

pub(crate) fn read(store: &dyn KeyValueStore, key: &str) -> CounterRead {
    match store.get(key) {
        Ok(None) => CounterRead::Known(0),
        Ok(Some(raw)) => match raw.trim().parse::<u32>() {
            Ok(n) => CounterRead::Known(n),
            Err(_) => {
                warn!(key, "Corrupt counter value {:?}, reading as 0", raw);
                CounterRead::Indeterminate
            }
        },
        Err(e) => {
            warn!(key, "Counter read failed, reading as 0: {}", e);
            CounterRead::Indeterminate
        }
    }
}

/// Add one to the counter at `key`, retrying on concurrent writers.
/// Returns the new value, or `None` if the write was abandoned.
pub(crate) fn increment(store: &dyn KeyValueStore, key: &str) -> Option<u32> {
    for _ in 0..MAX_CAS_ATTEMPTS {
        let current = match store.get(key) {
            Ok(current) => current,
            Err(e) => {
                warn!(key, "Counter increment skipped, read failed: {}", e);
                return None;
            }
        };

        let next = match current.as_deref().map(|raw| raw.trim().parse::<u32>()) {
            None => 1,
            Some(Ok(n)) => n.saturating_add(1),
            Some(Err(_)) => {
                warn!(key, "Overwriting corrupt counter value {:?}", current);
                1
            }
        };

        match store.compare_and_swap(key, current.as_deref(), &next.to_string()) {
            Ok(true) => return Some(next),
            Ok(false) => debug!(key, "Counter changed underneath us, retrying"),
            Err(e) => {
                warn!(key, "Counter increment skipped, write failed: {}", e);
                return None;
            }
        }
    }

    warn!(key, "Counter increment abandoned after {} contended attempts", MAX_CAS_ATTEMPTS);
    None
}

/// Outcome of [`claim_below`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Claim {
    /// Counter moved from `n - 1` to `n`.
    Claimed(u32),
    /// Counter already at or past the limit; left untouched.
    AtLimit,
    /// Store failed, held garbage, or stayed contended. Nothing reliable was recorded.
    Indeterminate,
}

/// Add one to the counter at `key` only while it is below `limit`.
/// The check and the write are a single compare-and-swap, so concurrent
/// callers can never push the counter past `limit`.
pub(crate) fn claim_below(store: &dyn KeyValueStore, key: &str, limit: u32) -> Claim {
    for _ in 0..MAX_CAS_ATTEMPTS {
        let current = match store.get(key) {
            Ok(current) => current,
            Err(e) => {
                warn!(key, "Counter claim unchecked, read failed: {}", e);
                return Claim::Indeterminate;
            }
        };

        let (next, outcome) = match current.as_deref().map(|raw| raw.trim().parse::<u32>()) {
            None => (1, Claim::Claimed(1)),
            Some(Ok(n)) if n >= limit => return Claim::AtLimit,
            Some(Ok(n)) => (n + 1, Claim::Claimed(n + 1)),
            Some(Err(_)) => {
                warn!(key, "Overwriting corrupt counter value {:?}", current);
                (1, Claim::Indeterminate)
            }
        };

        match store.compare_and_swap(key, current.as_deref(), &next.to_string()) {
            Ok(true) => return outcome,
            Ok(false) => debug!(key, "Counter changed underneath us, retrying"),
            Err(e) => {
                warn!(key, "Counter claim unrecorded, write failed: {}", e);
                return Claim::Indeterminate;
            }
        }
    }

    warn!(key, "Counter claim abandoned after {} contended attempts", MAX_CAS_ATTEMPTS);
    Claim::Indeterminate
}

pub(crate) fn reset(store: &dyn KeyValueStore, key: &str) {
    if let Err(e) = store.remove(key) {
        warn!(key, "Counter reset failed: {}", e);
    }
}
