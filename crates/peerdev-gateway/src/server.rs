//! Router construction and the tower-http middleware stack
//! (`SPEC_FULL.md` §6), scaled down from `crates/gateway/src/server.rs`'s
//! full stack to the layers this workspace's `tower-http` features
//! enable: tracing, request ids, and CORS.

use crate::collab_ws;
use crate::match_routes;
use crate::match_ws;
use crate::room_routes;
use crate::state::AppState;
use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/match/join", post(match_routes::join))
        .route("/match/cancel", post(match_routes::cancel))
        .route("/match/check", get(match_routes::check))
        .route("/match/handshake", post(match_routes::handshake))
        .route("/match/done", post(match_routes::done))
        .route("/match/ws", get(match_ws::upgrade))
        .route("/match/session-feedback", post(match_routes::session_feedback))
        .route("/room/{matchId}", get(room_routes::get_room))
        .route("/room/{matchId}/reroll", post(room_routes::reroll))
        .route("/ws/session/{id}", get(collab_ws::upgrade))
        .with_state(state);

    apply_middleware_stack(router)
}

/// Layer order (outermost → innermost for requests), mirroring
/// `crates/gateway/src/server.rs::apply_middleware_stack`'s ordering
/// minus the layers this workspace's `tower-http` feature set doesn't
/// enable (compression, body limit, security response headers, panic
/// catching): request-id generation, then trace, then CORS, then
/// request-id propagation to the response.
fn apply_middleware_stack(router: Router) -> Router {
    router
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}
