use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which side of a match a user sits on. The backend indexes matches by
/// `user1_id` and `user2_id` separately, so queries are per-slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParticipantSlot {
    First,
    Second,
}

impl ParticipantSlot {
    pub const ALL: [ParticipantSlot; 2] = [ParticipantSlot::First, ParticipantSlot::Second];

    pub fn field_name(self) -> &'static str {
        match self {
            Self::First => "user1Id",
            Self::Second => "user2Id",
        }
    }
}

/// A mutual-like pairing. Expiry is derived from `created_at`, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: String,
    pub user1_id: String,
    pub user2_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue_id: Option<String>,
}

impl Match {
    pub fn participant(&self, slot: ParticipantSlot) -> &str {
        match slot {
            ParticipantSlot::First => &self.user1_id,
            ParticipantSlot::Second => &self.user2_id,
        }
    }

    pub fn slot_of(&self, user_id: &str) -> Option<ParticipantSlot> {
        ParticipantSlot::ALL
            .into_iter()
            .find(|slot| self.participant(*slot) == user_id)
    }

    pub fn is_participant(&self, user_id: &str) -> bool {
        self.slot_of(user_id).is_some()
    }

    /// The participant that is not `user_id`, if `user_id` belongs to this match.
    pub fn other_participant(&self, user_id: &str) -> Option<&str> {
        match self.slot_of(user_id)? {
            ParticipantSlot::First => Some(&self.user2_id),
            ParticipantSlot::Second => Some(&self.user1_id),
        }
    }
}

/// A chat message. Belongs to exactly one match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub match_id: String,
    pub sender_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read_by: Vec<String>,
}

impl Message {
    pub fn is_unread_for(&self, user_id: &str) -> bool {
        !self.read_by.iter().any(|reader| reader == user_id)
    }
}

/// Per-match unread message counts for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnreadCounts(BTreeMap<String, u32>);

impl UnreadCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, match_id: &str) -> Option<u32> {
        self.0.get(match_id).copied()
    }

    pub fn insert(&mut self, match_id: impl Into<String>, count: u32) {
        self.0.insert(match_id.into(), count);
    }

    /// Sum across all matches, used for the badge counter.
    pub fn total(&self) -> u32 {
        self.0.values().sum()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.0.iter().map(|(id, count)| (id.as_str(), *count))
    }
}

impl<S: Into<String>> FromIterator<(S, u32)> for UnreadCounts {
    fn from_iter<I: IntoIterator<Item = (S, u32)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(id, count)| (id.into(), count)).collect())
    }
}
