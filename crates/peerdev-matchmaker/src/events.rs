//! Events the matchmaker pushes to a user's `user:<userId>:message`
//! topic, consumed by the gateway's `/match/ws` connection for that
//! user (`spec.md` §4.3, §6).

use peerdev_protocol::Frame;

pub mod kind {
    pub const MATCH_PENDING: &str = "match_pending";
    pub const MATCH_CONFIRMED: &str = "match_confirmed";
    pub const TIMEOUT: &str = "timeout";
    pub const REQUEUED: &str = "requeued";
}

pub fn match_pending(match_id: &str) -> Frame {
    Frame::new(kind::MATCH_PENDING, serde_json::json!({ "matchId": match_id }))
}

pub fn match_confirmed(match_id: &str, token: &str) -> Frame {
    Frame::new(
        kind::MATCH_CONFIRMED,
        serde_json::json!({ "matchId": match_id, "token": token }),
    )
}

pub fn timeout() -> Frame {
    Frame::new(kind::TIMEOUT, serde_json::Value::Null)
}

pub fn requeued() -> Frame {
    Frame::new(kind::REQUEUED, serde_json::Value::Null)
}
