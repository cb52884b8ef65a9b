//! `spec.md` §6 "Matchmaking HTTP surface": join/cancel/check queue
//! membership, the accept/reject handshake, session teardown, and
//! rating feedback.

use crate::errors::ApiError;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use peerdev_common::Kind;
use peerdev_matchmaker::types::CheckResult;
use peerdev_protocol::Difficulty;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub user_id: String,
    pub category: String,
    pub difficulty: Difficulty,
}

#[derive(Debug, Serialize)]
pub struct OkInfo {
    pub ok: bool,
    pub info: String,
}

pub async fn join(State(state): State<AppState>, Json(req): Json<JoinRequest>) -> Result<Json<OkInfo>, ApiError> {
    state.matchmaker.join(&req.user_id, &req.category, req.difficulty).await?;
    Ok(Json(OkInfo { ok: true, info: "queued".into() }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub user_id: String,
}

pub async fn cancel(State(state): State<AppState>, Json(req): Json<CancelRequest>) -> Result<Json<OkInfo>, ApiError> {
    state.matchmaker.cancel(&req.user_id).await.map_err(|e| {
        if e.kind == Kind::Conflict {
            ApiError::with_status(e, StatusCode::NOT_FOUND)
        } else {
            ApiError::from(e)
        }
    })?;
    Ok(Json(OkInfo { ok: true, info: "cancelled".into() }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckQuery {
    pub user_id: String,
}

pub async fn check(State(state): State<AppState>, Query(q): Query<CheckQuery>) -> Result<Json<CheckResult>, ApiError> {
    Ok(Json(state.matchmaker.check(&q.user_id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeRequest {
    pub user_id: String,
    pub match_id: String,
    pub accept: bool,
}

pub async fn handshake(State(state): State<AppState>, Json(req): Json<HandshakeRequest>) -> Result<Json<OkInfo>, ApiError> {
    let result = if req.accept {
        state.matchmaker.handle_accept(&req.match_id, &req.user_id).await
    } else {
        state.matchmaker.handle_reject(&req.match_id, &req.user_id).await
    };
    result.map_err(|e| match e.kind {
        Kind::Conflict => ApiError::with_status(e, StatusCode::NOT_FOUND),
        Kind::Authz => ApiError::with_status(e, StatusCode::FORBIDDEN),
        _ => ApiError::from(e),
    })?;
    Ok(Json(OkInfo { ok: true, info: if req.accept { "accepted" } else { "rejected" }.into() }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoneRequest {
    pub user_id: String,
}

/// `/match/done` has no dedicated service method: the matchmaker only
/// tracks queue/handshake state, and ending a session is the
/// collaboration service's responsibility. This composes `check` (to
/// find the caller's room) with `CollabService::end_session`.
pub async fn done(State(state): State<AppState>, Json(req): Json<DoneRequest>) -> Result<Json<OkInfo>, ApiError> {
    let check = state.matchmaker.check(&req.user_id).await?;
    if !check.in_room {
        return Err(ApiError::with_status(
            peerdev_common::Error::conflict("not in room"),
            StatusCode::NOT_FOUND,
        ));
    }
    let room_id = check.room_id.ok_or_else(|| {
        ApiError::with_status(peerdev_common::Error::internal("missing roomId"), StatusCode::INTERNAL_SERVER_ERROR)
    })?;
    state.collab.end_session(&room_id).await?;
    Ok(Json(OkInfo { ok: true, info: "done".into() }))
}

pub async fn session_feedback(
    State(state): State<AppState>,
    Json(metrics): Json<serde_json::Value>,
) -> Result<Json<Vec<peerdev_service_traits::RatingUpdate>>, ApiError> {
    Ok(Json(state.matchmaker.session_feedback(metrics).await?))
}
