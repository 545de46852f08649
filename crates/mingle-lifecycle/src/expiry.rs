use std::time::Duration;

use chrono::{DateTime, Utc};

use mingle_types::MatchPolicy;

/// Pure expiry math over a fixed window. Holds no state besides the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryCalculator {
    window: Duration,
}

impl ExpiryCalculator {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn from_policy(policy: &MatchPolicy) -> Self {
        Self::new(policy.match_expiry)
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Expired once the full window has elapsed. Reaching the window exactly
    /// counts as expired, so `remaining` is zero precisely when this is true.
    pub fn is_expired(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        elapsed(created_at, now) >= self.window
    }

    /// Window minus elapsed time, floored at zero. A `created_at` in the
    /// future (clock skew) yields the full window.
    pub fn remaining(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
        self.window.saturating_sub(elapsed(created_at, now))
    }

    pub fn is_expired_now(&self, created_at: DateTime<Utc>) -> bool {
        self.is_expired(created_at, Utc::now())
    }

    pub fn remaining_now(&self, created_at: DateTime<Utc>) -> Duration {
        self.remaining(created_at, Utc::now())
    }
}

fn elapsed(created_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - created_at).to_std().unwrap_or(Duration::ZERO)
}

/// `"{h}h {m}m remaining"` from one hour up, `"{m}m remaining"` below.
/// Partial minutes are dropped.
pub fn format_remaining(remaining: Duration) -> String {
    let total_minutes = remaining.as_secs() / 60;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;

    if hours >= 1 {
        format!("{}h {}m remaining", hours, minutes)
    } else {
        format!("{}m remaining", minutes)
    }
}
