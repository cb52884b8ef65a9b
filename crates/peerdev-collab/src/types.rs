//! In-memory-only entities owned by a room's hosting instance
//! (`spec.md` §3 Ownership): `DocState`, `Edit`, run history frames.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocState {
    pub text: String,
    pub version: i64,
}

impl DocState {
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            version: 0,
        }
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// A client-submitted edit, decoded from an `edit` frame's `data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edit {
    pub base_version: i64,
    pub range_start: usize,
    pub range_end: usize,
    pub insert_text: String,
}

/// Who a `room::Outgoing` frame should be delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    /// Only the client whose frame produced this output.
    Sender,
    /// Every other current participant.
    Peers,
    /// Every current participant, including the sender.
    All,
}

#[derive(Debug, Clone)]
pub struct Outgoing {
    pub recipient: Recipient,
    pub frame: peerdev_protocol::Frame,
}

impl Outgoing {
    pub fn new(recipient: Recipient, frame: peerdev_protocol::Frame) -> Self {
        Self { recipient, frame }
    }
}
