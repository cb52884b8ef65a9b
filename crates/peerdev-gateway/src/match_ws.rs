//! `GET /match/ws?userId=…`: the matchmaker's push channel for a single
//! user (`match_pending`, `match_confirmed`, `timeout`, `requeued`
//! events — `spec.md` §4.2, §4.3).
//!
//! Grounded on `crates/gateway/src/ws.rs`'s split-socket / write-loop-task
//! shape; there is no handshake phase here since the connecting user is
//! already known from the query string.

use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::Response;
use futures::SinkExt;
use futures::stream::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchWsQuery {
    pub user_id: String,
}

pub async fn upgrade(
    State(state): State<AppState>,
    Query(query): Query<MatchWsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, state, query.user_id))
}

async fn handle_connection(socket: WebSocket, state: AppState, user_id: String) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    state.bus.register(&user_id, tx).await;

    let write_user_id = user_id.clone();
    let write_handle = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_tx.send(Message::Text(msg.into())).await.is_err() {
                tracing::debug!(user_id = %write_user_id, "match ws: write loop closed");
                break;
            }
        }
    });

    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(error) => {
                tracing::debug!(%error, user_id = %user_id, "match ws: read error");
                break;
            }
        }
    }

    state.bus.unregister(&user_id).await;
    write_handle.abort();
    tracing::info!(user_id = %user_id, "match ws: connection closed");
}
