use std::time::Duration;

use thiserror::Error;
use tracing::info;

/// Default match lifetime: 24 hours from creation.
pub const DEFAULT_MATCH_EXPIRY: Duration = Duration::from_secs(24 * 60 * 60);

/// Default messages one participant may send per match.
pub const DEFAULT_MESSAGE_LIMIT: u32 = 10;

/// Default number of times an expired match may be revived.
pub const DEFAULT_REMATCH_LIMIT: u32 = 1;

/// Integer reported for unlimited quotas where callers need a number.
pub const UNLIMITED_SENTINEL: u32 = 999;

/// Trailing debounce applied to unread-count emissions.
pub const DEFAULT_UNREAD_DEBOUNCE: Duration = Duration::from_millis(500);

/// Max match ids per message query (backend `in` filter limit).
pub const DEFAULT_UNREAD_BATCH_SIZE: usize = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}: cannot parse {value:?}")]
    Unparsable { key: &'static str, value: String },
    #[error("{key}: must be greater than zero")]
    Zero { key: &'static str },
    #[error("{key}: {value} is out of range")]
    OutOfRange { key: &'static str, value: u64 },
}

/// The one place match lifecycle policy lives. Trackers, the lifecycle
/// facade and the unread aggregator all read their limits from here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchPolicy {
    pub match_expiry: Duration,
    pub message_limit: u32,
    pub rematch_limit: u32,
    pub unlimited_sentinel: u32,
    pub unread_debounce: Duration,
    pub unread_batch_size: usize,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            match_expiry: DEFAULT_MATCH_EXPIRY,
            message_limit: DEFAULT_MESSAGE_LIMIT,
            rematch_limit: DEFAULT_REMATCH_LIMIT,
            unlimited_sentinel: UNLIMITED_SENTINEL,
            unread_debounce: DEFAULT_UNREAD_DEBOUNCE,
            unread_batch_size: DEFAULT_UNREAD_BATCH_SIZE,
        }
    }
}

/// Remaining or total allowance. Premium identities are `Unlimited`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quota {
    Limited(u32),
    Unlimited,
}

impl Quota {
    /// Collapse to an integer, reporting `sentinel` for `Unlimited`.
    pub fn count_or(self, sentinel: u32) -> u32 {
        match self {
            Self::Limited(n) => n,
            Self::Unlimited => sentinel,
        }
    }

    pub fn is_exhausted(self) -> bool {
        matches!(self, Self::Limited(0))
    }
}

impl MatchPolicy {
    /// Read overrides from the process environment. Unset keys keep defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`MatchPolicy::from_env`] with an injectable lookup.
    ///
    /// Recognized keys: `MINGLE_MATCH_EXPIRY_MINUTES`, `MINGLE_MESSAGE_LIMIT`,
    /// `MINGLE_REMATCH_LIMIT`, `MINGLE_UNREAD_DEBOUNCE_MS`, `MINGLE_UNREAD_BATCH_SIZE`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut policy = Self::default();

        if let Some(minutes) = parse_key::<u64, _>(&lookup, "MINGLE_MATCH_EXPIRY_MINUTES")? {
            let secs = minutes.checked_mul(60).ok_or(ConfigError::OutOfRange {
                key: "MINGLE_MATCH_EXPIRY_MINUTES",
                value: minutes,
            })?;
            policy.match_expiry = Duration::from_secs(secs);
        }
        if let Some(limit) = parse_key(&lookup, "MINGLE_MESSAGE_LIMIT")? {
            policy.message_limit = limit;
        }
        if let Some(limit) = parse_key(&lookup, "MINGLE_REMATCH_LIMIT")? {
            policy.rematch_limit = limit;
        }
        if let Some(ms) = parse_key::<u64, _>(&lookup, "MINGLE_UNREAD_DEBOUNCE_MS")? {
            policy.unread_debounce = Duration::from_millis(ms);
        }
        if let Some(size) = parse_key(&lookup, "MINGLE_UNREAD_BATCH_SIZE")? {
            policy.unread_batch_size = size;
        }

        policy.validate()?;
        info!(
            "Match policy: expiry={}m messages={} rematches={} debounce={}ms batch={}",
            policy.match_expiry.as_secs() / 60,
            policy.message_limit,
            policy.rematch_limit,
            policy.unread_debounce.as_millis(),
            policy.unread_batch_size,
        );
        Ok(policy)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.match_expiry.is_zero() {
            return Err(ConfigError::Zero { key: "MINGLE_MATCH_EXPIRY_MINUTES" });
        }
        if self.message_limit == 0 {
            return Err(ConfigError::Zero { key: "MINGLE_MESSAGE_LIMIT" });
        }
        if self.rematch_limit == 0 {
            return Err(ConfigError::Zero { key: "MINGLE_REMATCH_LIMIT" });
        }
        if self.unread_debounce.is_zero() {
            return Err(ConfigError::Zero { key: "MINGLE_UNREAD_DEBOUNCE_MS" });
        }
        if self.unread_batch_size == 0 {
            return Err(ConfigError::Zero { key: "MINGLE_UNREAD_BATCH_SIZE" });
        }
        Ok(())
    }

    /// Per-match send allowance for a user of the given tier.
    pub fn message_limit_for(&self, premium: bool) -> Quota {
        if premium {
            Quota::Unlimited
        } else {
            Quota::Limited(self.message_limit)
        }
    }
}

fn parse_key<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::Unparsable { key, value: raw })
}
