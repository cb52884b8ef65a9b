//! Shared-store key schema (`spec.md` §6).

pub fn user_entry(user_id: &str) -> String {
    format!("user:{user_id}")
}

pub fn queue_cat_diff(category: &str, difficulty: &str) -> String {
    format!("queue:{category}:{difficulty}")
}

pub fn queue_cat(category: &str) -> String {
    format!("queue:{category}")
}

pub const QUEUE_ALL: &str = "queue:all";

pub fn pending_match(match_id: &str) -> String {
    format!("pending_match:{match_id}")
}

pub fn handshake(match_id: &str, user_id: &str) -> String {
    format!("handshake:{match_id}:{user_id}")
}

pub fn room(match_id: &str) -> String {
    format!("room:{match_id}")
}

pub fn user_room(user_id: &str) -> String {
    format!("user_room:{user_id}")
}

pub fn user_history_partners(user_id: &str) -> String {
    format!("user_history:{user_id}:partners")
}

/// Not in `spec.md`'s explicit key schema table (`UserRating` has no
/// listed key there); named to follow the same `noun:<id>` convention
/// as every other entry in that table.
pub fn user_rating(user_id: &str) -> String {
    format!("user_rating:{user_id}")
}

pub fn user_message_channel(user_id: &str) -> String {
    format!("user:{user_id}:message")
}

pub const USER_MESSAGE_PATTERN: &str = "user:*:message";
pub const CHANNEL_MATCHES: &str = "matches";
pub const CHANNEL_ROOM_UPDATES: &str = "room_updates";
pub const CHANNEL_SESSION_ENDED: &str = "session_ended";
