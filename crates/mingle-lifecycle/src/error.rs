use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("message text is empty")]
    EmptyMessage,
    #[error("{user_id} is not a participant of match {match_id}")]
    NotParticipant { match_id: String, user_id: String },
    #[error("match {0} has expired")]
    MatchExpired(String),
    #[error("message limit of {limit} reached in match {match_id}")]
    QuotaExhausted { match_id: String, limit: u32 },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RematchError {
    #[error("{user_id} is not a participant of match {match_id}")]
    NotParticipant { match_id: String, user_id: String },
    #[error("match {0} is still active")]
    StillActive(String),
    #[error("rematch limit of {limit} reached for match {match_id}")]
    LimitReached { match_id: String, limit: u32 },
}
