use std::collections::HashSet;

use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionTier {
    Free,
    Premium,
}

#[derive(Debug, Error)]
pub enum PremiumError {
    #[error("subscription lookup failed: {0}")]
    Lookup(String),
}

/// Source of a user's subscription tier. Treated as best-effort.
pub trait PremiumLookup: Send + Sync {
    fn tier(&self, user_id: &str) -> Result<SubscriptionTier, PremiumError>;
}

/// Everyone is on the free tier.
pub struct NoPremium;

impl PremiumLookup for NoPremium {
    fn tier(&self, _user_id: &str) -> Result<SubscriptionTier, PremiumError> {
        Ok(SubscriptionTier::Free)
    }
}

/// Fixed set of premium user ids.
#[derive(Debug, Default)]
pub struct StaticPremium {
    premium: HashSet<String>,
}

impl StaticPremium {
    pub fn new<I, S>(user_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            premium: user_ids.into_iter().map(Into::into).collect(),
        }
    }
}

impl PremiumLookup for StaticPremium {
    fn tier(&self, user_id: &str) -> Result<SubscriptionTier, PremiumError> {
        if self.premium.contains(user_id) {
            Ok(SubscriptionTier::Premium)
        } else {
            Ok(SubscriptionTier::Free)
        }
    }
}

/// Lookup failures count as "not premium".
pub(crate) fn is_premium(lookup: &dyn PremiumLookup, user_id: &str) -> bool {
    match lookup.tier(user_id) {
        Ok(tier) => tier == SubscriptionTier::Premium,
        Err(e) => {
            warn!(user_id, "Premium lookup failed, treating as free: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;

    impl PremiumLookup for Broken {
        fn tier(&self, _user_id: &str) -> Result<SubscriptionTier, PremiumError> {
            Err(PremiumError::Lookup("backend offline".into()))
        }
    }

    #[test]
    fn static_lookup() {
        let lookup = StaticPremium::new(["gold"]);
        assert!(is_premium(&lookup, "gold"));
        assert!(!is_premium(&lookup, "basic"));
        assert!(!is_premium(&NoPremium, "gold"));
    }

    #[test]
    fn failure_is_not_premium() {
        assert!(!is_premium(&Broken, "anyone"));
    }
}
