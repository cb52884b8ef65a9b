//! The HTTP/WebSocket transport for the matchmaker and collaboration
//! subsystems (`spec.md` §6, out of scope for `spec.md` itself but
//! required for a runnable system per `SPEC_FULL.md` §6).

pub mod bus;
pub mod collab_ws;
pub mod errors;
pub mod match_routes;
pub mod match_ws;
pub mod room_conns;
pub mod room_routes;
pub mod server;
pub mod state;

pub use bus::MessagingBus;
pub use room_conns::{RoomConnections, room_updated_frame};
pub use server::build_router;
pub use state::AppState;
