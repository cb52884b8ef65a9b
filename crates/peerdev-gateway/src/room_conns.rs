//! Per-instance registry of live `/ws/session/{id}` connections
//! (`spec.md` §3 Ownership), used to deliver a `CollabService` call's
//! `Outgoing` results to the right WebSocket(s).
//!
//! Grounded on `crates/gateway/src/state.rs`'s connection registry and
//! `crates/gateway/src/broadcast.rs`'s per-client send loop, specialised
//! to a room's (at most two) participants instead of every connected
//! client.

use peerdev_collab::{Outgoing, Recipient};
use peerdev_protocol::{Frame, RoomInfo, frame_type};
use std::collections::HashMap;
use tokio::sync::{Mutex, mpsc};

/// The WS frame a `room_updated` event becomes on the wire, shared by
/// the reroll handler's local broadcast and the cross-instance
/// `room_updates` subscriber so both construct the same shape
/// (`spec.md` §4.4, §6).
pub fn room_updated_frame(info: &RoomInfo) -> Frame {
    Frame::new(frame_type::ROOM_UPDATED, serde_json::json!({ "roomInfo": info }))
}

#[derive(Default)]
pub struct RoomConnections {
    rooms: Mutex<HashMap<String, HashMap<String, mpsc::UnboundedSender<String>>>>,
}

impl RoomConnections {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, match_id: &str, user_id: &str, sender: mpsc::UnboundedSender<String>) {
        self.rooms
            .lock()
            .await
            .entry(match_id.to_string())
            .or_default()
            .insert(user_id.to_string(), sender);
    }

    pub async fn unregister(&self, match_id: &str, user_id: &str) {
        let mut rooms = self.rooms.lock().await;
        if let Some(conns) = rooms.get_mut(match_id) {
            conns.remove(user_id);
            if conns.is_empty() {
                rooms.remove(match_id);
            }
        }
    }

    /// Deliver frames produced by one participant's inbound frame,
    /// routing each to its `Recipient` (`spec.md` §4.4).
    pub async fn deliver(&self, match_id: &str, sender_user_id: &str, outgoing: &[Outgoing]) {
        let rooms = self.rooms.lock().await;
        let Some(conns) = rooms.get(match_id) else {
            return;
        };
        for item in outgoing {
            let Ok(json) = serde_json::to_string(&item.frame) else {
                continue;
            };
            match item.recipient {
                Recipient::Sender => {
                    if let Some(tx) = conns.get(sender_user_id) {
                        let _ = tx.send(json);
                    }
                }
                Recipient::Peers => {
                    for (user_id, tx) in conns.iter() {
                        if user_id != sender_user_id {
                            let _ = tx.send(json.clone());
                        }
                    }
                }
                Recipient::All => {
                    for tx in conns.values() {
                        let _ = tx.send(json.clone());
                    }
                }
            }
        }
    }

    /// Broadcast a single frame to every local connection in a room,
    /// used to relay a `room_updated` event published by another
    /// instance (`spec.md` §6).
    pub async fn broadcast(&self, match_id: &str, frame: &Frame) {
        let rooms = self.rooms.lock().await;
        let Some(conns) = rooms.get(match_id) else {
            return;
        };
        let Ok(json) = serde_json::to_string(frame) else {
            return;
        };
        for tx in conns.values() {
            let _ = tx.send(json.clone());
        }
    }
}
