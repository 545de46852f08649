pub mod models;
pub mod policy;

pub use models::{Match, Message, ParticipantSlot, UnreadCounts};
pub use policy::{ConfigError, MatchPolicy, Quota};
