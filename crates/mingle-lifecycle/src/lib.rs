//! Match lifecycle bookkeeping: expiry windows, per-participant message
//! quotas and the one-time rematch allowance.
//!
//! Every tracker reads its limits from [`mingle_types::MatchPolicy`] and its
//! state from an injected [`mingle_db::KeyValueStore`]. Storage failures
//! never block a user: reads degrade to zero and checks report
//! [`Decision::IndeterminateDefaultedToAllowed`].

mod counter;
pub mod decision;
pub mod error;
pub mod expiry;
pub mod lifecycle;
pub mod premium;
pub mod quota;
pub mod rematch;

pub use decision::Decision;
pub use error::{RematchError, SendError};
pub use expiry::{ExpiryCalculator, format_remaining};
pub use lifecycle::{MatchLifecycle, MatchStatus};
pub use premium::{NoPremium, PremiumError, PremiumLookup, StaticPremium, SubscriptionTier};
pub use quota::QuotaTracker;
pub use rematch::RematchTracker;
