//! Wire types shared across the matchmaker and collaboration subsystems:
//! the WebSocket frame envelope, the shared-store pub/sub event payloads,
//! and the small set of domain value types (`Difficulty`, `RoomInfo`) that
//! cross a process boundary and therefore need a single canonical shape.
//!
//! Frame envelope:
//! - Client and server exchange `{type, data}` documents over the
//!   collaboration WebSocket. `data`'s shape depends on `type`; the
//!   receiver looks up `type` first and only then decodes `data`.

use serde::{Deserialize, Serialize};

pub mod token;

pub mod error_codes {
    pub const VERSION_MISMATCH: &str = "version_mismatch";
    pub const INVALID_RANGE: &str = "invalid_range";
    pub const TRANSFORM_TOO_LONG: &str = "transform_too_long";
    pub const OT_ERROR: &str = "ot_error";
    pub const ROOM_FULL: &str = "room_full";
    pub const SANDBOX_UNAVAILABLE: &str = "sandbox_unavailable";
    pub const UNSUPPORTED_LANGUAGE: &str = "unsupported_language";
    pub const SANDBOX_ERROR: &str = "sandbox_error";
}

pub mod frame_type {
    pub const INIT: &str = "init";
    pub const DOC: &str = "doc";
    pub const EDIT: &str = "edit";
    pub const CURSOR: &str = "cursor";
    pub const CHAT: &str = "chat";
    pub const LANGUAGE: &str = "language";
    pub const RUN: &str = "run";
    pub const RUN_RESET: &str = "run_reset";
    pub const STDOUT: &str = "stdout";
    pub const STDERR: &str = "stderr";
    pub const EXIT: &str = "exit";
    pub const ERROR: &str = "error";
    pub const ROOM_UPDATED: &str = "room_updated";
}

/// A single WebSocket envelope: `{"type": ..., "data": ...}`.
///
/// `data`'s shape is determined by `type`; callers decode it with
/// [`Frame::data_as`] once they've matched on `r#type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub r#type: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Frame {
    pub fn new(r#type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            r#type: r#type.into(),
            data,
        }
    }

    pub fn error(kind: &str) -> Self {
        Self::new(frame_type::ERROR, serde_json::json!({ "kind": kind }))
    }

    /// Decode `data` into `T`, tying deserialization errors to the frame's
    /// declared type for easier debugging.
    pub fn data_as<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.clone())
    }
}

// ── Difficulty ───────────────────────────────────────────────────────────────

/// Ordered question-difficulty tier. Ordering backs the "mid-tier wins
/// ties" averaging rule in the matchmaker's stage-2/3 pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    fn rank(self) -> i32 {
        match self {
            Difficulty::Easy => 0,
            Difficulty::Medium => 1,
            Difficulty::Hard => 2,
        }
    }

    fn from_rank(rank: i32) -> Self {
        match rank {
            r if r <= 0 => Difficulty::Easy,
            1 => Difficulty::Medium,
            _ => Difficulty::Hard,
        }
    }

    /// Average two difficulties, truncating toward the lower tier.
    /// A tie returns the shared tier unchanged.
    #[must_use]
    pub fn average(a: Difficulty, b: Difficulty) -> Difficulty {
        Difficulty::from_rank((a.rank() + b.rank()) / 2)
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        };
        f.write_str(s)
    }
}

// ── Room info ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Active,
    Ended,
}

/// Confirmed-match record, mirrored in the shared store under
/// `room:<matchId>` and published on the `matches` / `room_updates`
/// channels. Field order is fixed deliberately: `spec.md` §9 flags that
/// some source variants swap `user1`/`user2` or vary field order across
/// versions; this shape is the single canonical one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub match_id: String,
    pub user1: String,
    pub user2: String,
    pub category: String,
    pub difficulty: Difficulty,
    pub status: RoomStatus,
    pub token1: String,
    pub token2: String,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<serde_json::Value>,
    pub rerolls_remaining: u32,
}

impl RoomInfo {
    /// The two participant ids, in storage order.
    #[must_use]
    pub fn participants(&self) -> [&str; 2] {
        [&self.user1, &self.user2]
    }

    #[must_use]
    pub fn other_user<'a>(&'a self, user_id: &str) -> Option<&'a str> {
        if self.user1 == user_id {
            Some(&self.user2)
        } else if self.user2 == user_id {
            Some(&self.user1)
        } else {
            None
        }
    }

    #[must_use]
    pub fn token_for(&self, user_id: &str) -> Option<&str> {
        if self.user1 == user_id {
            Some(&self.token1)
        } else if self.user2 == user_id {
            Some(&self.token2)
        } else {
            None
        }
    }
}

/// Published on `room_updates` whenever any instance mutates a `RoomInfo`
/// (currently: reroll). Other instances re-broadcast to their local
/// participants and ignore events carrying their own `instance_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomUpdatedEvent {
    pub r#type: String,
    pub instance_id: String,
    pub match_id: String,
    pub room_info: RoomInfo,
}

impl RoomUpdatedEvent {
    #[must_use]
    pub fn new(instance_id: impl Into<String>, room_info: RoomInfo) -> Self {
        Self {
            r#type: "room_updated".into(),
            instance_id: instance_id.into(),
            match_id: room_info.match_id.clone(),
            room_info,
        }
    }
}

/// Published on `session_ended` by the session lifecycle controller;
/// consumed by the matchmaker to clean up `UserRoom`/`RoomInfo` and (out
/// of this crate's scope) by history persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEndedEvent {
    pub match_id: String,
    pub user1: String,
    pub user2: String,
    pub question_id: Option<String>,
    pub language: String,
    pub final_code: String,
    pub started_at: i64,
    pub ended_at: i64,
    pub duration_seconds: i64,
    pub rerolls_used: u32,
}

// ── Room token claims ────────────────────────────────────────────────────────

/// Decoded contents of a room token, after signature verification.
/// Binds a `matchId` to the `userId` it was issued for (`spec.md` §6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomTokenClaims {
    pub match_id: String,
    pub user_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_average_tie() {
        assert_eq!(
            Difficulty::average(Difficulty::Medium, Difficulty::Medium),
            Difficulty::Medium
        );
    }

    #[test]
    fn difficulty_average_adjacent() {
        assert_eq!(
            Difficulty::average(Difficulty::Easy, Difficulty::Medium),
            Difficulty::Easy
        );
        assert_eq!(
            Difficulty::average(Difficulty::Medium, Difficulty::Hard),
            Difficulty::Medium
        );
    }

    #[test]
    fn difficulty_average_extremes() {
        assert_eq!(
            Difficulty::average(Difficulty::Easy, Difficulty::Hard),
            Difficulty::Medium
        );
    }

    #[test]
    fn room_info_other_user() {
        let info = RoomInfo {
            match_id: "m1".into(),
            user1: "alice".into(),
            user2: "bob".into(),
            category: "arrays".into(),
            difficulty: Difficulty::Easy,
            status: RoomStatus::Active,
            token1: "t1".into(),
            token2: "t2".into(),
            created_at: 0,
            question: None,
            rerolls_remaining: 1,
        };
        assert_eq!(info.other_user("alice"), Some("bob"));
        assert_eq!(info.other_user("bob"), Some("alice"));
        assert_eq!(info.other_user("carol"), None);
        assert_eq!(info.token_for("alice"), Some("t1"));
    }

    #[test]
    fn frame_roundtrip() {
        let f = Frame::new("doc", serde_json::json!({"text": "x", "version": 1}));
        let s = serde_json::to_string(&f).unwrap();
        let back: Frame = serde_json::from_str(&s).unwrap();
        assert_eq!(back.r#type, "doc");
        assert_eq!(back.data["version"], 1);
    }
}
