//! Shared application state threaded through every axum handler.

use crate::bus::MessagingBus;
use crate::room_conns::RoomConnections;
use peerdev_collab::CollabService;
use peerdev_matchmaker::MatchmakerService;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub matchmaker: Arc<MatchmakerService>,
    pub collab: Arc<CollabService>,
    pub bus: Arc<MessagingBus>,
    pub room_conns: Arc<RoomConnections>,
}
