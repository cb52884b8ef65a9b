//! `GET /ws/session/{id}?token=…`: the collaboration room's WebSocket
//! connection (`spec.md` §4.4, §6). Pre-upgrade, verifies the bearer
//! token binds to `id`; post-upgrade, joins the room, dispatches each
//! inbound frame to `CollabService::handle_frame`, and tears the
//! participant down on disconnect.
//!
//! Grounded on `crates/gateway/src/ws.rs`'s handshake-then-loop shape.

use crate::errors::ws_error_kind;
use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::SinkExt;
use futures::stream::StreamExt;
use peerdev_protocol::Frame;
use serde::Deserialize;
use tokio::sync::mpsc;

#[derive(Debug, Deserialize)]
pub struct SessionWsQuery {
    pub token: String,
}

pub async fn upgrade(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
    Query(query): Query<SessionWsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let user_id = match state.collab.authorize(&query.token, &match_id) {
        Ok(user_id) => user_id,
        Err(error) => {
            tracing::warn!(%error, match_id = %match_id, "collab ws: authorization failed");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };
    ws.on_upgrade(move |socket| handle_connection(socket, state, match_id, user_id))
}

async fn handle_connection(socket: WebSocket, state: AppState, match_id: String, user_id: String) {
    if let Err(error) = state.collab.join(&match_id, &user_id).await {
        tracing::warn!(%error, match_id = %match_id, user_id = %user_id, "collab ws: join failed");
        let mut socket = socket;
        // `error.message()` IS the short machine-readable code here
        // (e.g. `room_full`), matching how `Room` builds its own error
        // frames directly from `error_codes::*` constants.
        let frame = Frame::error(error.message());
        if let Ok(json) = serde_json::to_string(&frame) {
            let _ = socket.send(Message::Text(json.into())).await;
        }
        let _ = socket.close().await;
        return;
    }

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    state.room_conns.register(&match_id, &user_id, tx).await;

    let write_handle = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_tx.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = ws_rx.next().await {
        let text = match msg {
            Ok(Message::Text(t)) => t.to_string(),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(error) => {
                tracing::debug!(%error, match_id = %match_id, user_id = %user_id, "collab ws: read error");
                break;
            }
        };
        let frame: Frame = match serde_json::from_str(&text) {
            Ok(f) => f,
            Err(error) => {
                tracing::warn!(%error, match_id = %match_id, "collab ws: invalid frame");
                continue;
            }
        };
        match state.collab.handle_frame(&match_id, frame).await {
            Ok(outgoing) => state.room_conns.deliver(&match_id, &user_id, &outgoing).await,
            Err(error) => {
                tracing::warn!(%error, match_id = %match_id, user_id = %user_id, "collab ws: frame handling failed");
                let error_frame = peerdev_collab::Outgoing::new(
                    peerdev_collab::Recipient::Sender,
                    Frame::error(ws_error_kind(error.kind)),
                );
                state.room_conns.deliver(&match_id, &user_id, &[error_frame]).await;
            }
        }
    }

    state.room_conns.unregister(&match_id, &user_id).await;
    if let Err(error) = state.collab.leave(&match_id, &user_id).await {
        tracing::warn!(%error, match_id = %match_id, user_id = %user_id, "collab ws: leave failed");
    }
    write_handle.abort();
}
