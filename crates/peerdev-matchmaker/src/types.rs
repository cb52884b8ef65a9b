use peerdev_protocol::Difficulty;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub user_id: String,
    pub category: String,
    pub difficulty: Difficulty,
    pub joined_at: i64,
    pub stage: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRating {
    pub user_id: String,
    pub rating: f64,
    pub sessions_completed: u64,
    pub last_update: i64,
}

impl UserRating {
    pub fn default_for(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            rating: 1500.0,
            sessions_completed: 0,
            last_update: 0,
        }
    }
}

/// A user's own queue preferences at the moment of pairing, carried
/// along so a rejected/expired handshake can re-queue them unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginalPrefs {
    pub user_id: String,
    pub category: String,
    pub difficulty: Difficulty,
    pub joined_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMatch {
    pub match_id: String,
    pub user1: String,
    pub user2: String,
    pub category: String,
    pub difficulty: Difficulty,
    pub per_user_original_prefs: [OriginalPrefs; 2],
    pub token1: String,
    pub token2: String,
    pub created_at: i64,
    pub expires_at: i64,
}

impl PendingMatch {
    pub fn prefs_for<'a>(&'a self, user_id: &str) -> Option<&'a OriginalPrefs> {
        self.per_user_original_prefs
            .iter()
            .find(|p| p.user_id == user_id)
    }

    pub fn is_party(&self, user_id: &str) -> bool {
        self.user1 == user_id || self.user2 == user_id
    }

    pub fn other_user<'a>(&'a self, user_id: &str) -> Option<&'a str> {
        if self.user1 == user_id {
            Some(&self.user2)
        } else if self.user2 == user_id {
            Some(&self.user1)
        } else {
            None
        }
    }

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

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandshakeState {
    Pending,
    Accepted,
}

impl HandshakeState {
    pub fn as_str(self) -> &'static str {
        match self {
            HandshakeState::Pending => "pending",
            HandshakeState::Accepted => "accepted",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(HandshakeState::Pending),
            "accepted" => Some(HandshakeState::Accepted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub in_room: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl CheckResult {
    pub fn not_in_room() -> Self {
        Self {
            in_room: false,
            room_id: None,
            category: None,
            difficulty: None,
            token: None,
        }
    }
}
