//! Persisted key namespace. These strings are shared with existing clients,
//! so their shape must not change.

pub const PREFIX: &str = "mingle";

/// `mingle:messageCount:{matchId}:{userId}` -> decimal count.
pub fn message_count(match_id: &str, user_id: &str) -> String {
    format!("{PREFIX}:messageCount:{match_id}:{user_id}")
}

/// `mingle:rematch:{matchId}` -> decimal count.
pub fn rematch(match_id: &str) -> String {
    format!("{PREFIX}:rematch:{match_id}")
}

/// `mingle:rematchedAt:{matchId}` -> RFC 3339 timestamp of the last reconnect.
pub fn rematched_at(match_id: &str) -> String {
    format!("{PREFIX}:rematchedAt:{match_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_shapes() {
        assert_eq!(message_count("m1", "u9"), "mingle:messageCount:m1:u9");
        assert_eq!(rematch("m1"), "mingle:rematch:m1");
        assert_eq!(rematched_at("m1"), "mingle:rematchedAt:m1");
    }
}
