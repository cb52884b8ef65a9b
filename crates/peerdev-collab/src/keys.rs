//! Shared-store key/channel schema this crate touches. Mirrors
//! `peerdev-matchmaker::keys`'s conventions (`spec.md` §6) rather than
//! depending on that crate, since neither subsystem needs the other's
//! queue/handshake keys.

pub fn room(match_id: &str) -> String {
    format!("room:{match_id}")
}

pub fn user_room(user_id: &str) -> String {
    format!("user_room:{user_id}")
}

pub const CHANNEL_MATCHES: &str = "matches";
pub const CHANNEL_ROOM_UPDATES: &str = "room_updates";
pub const CHANNEL_SESSION_ENDED: &str = "session_ended";
