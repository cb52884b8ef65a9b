//! `GET /room/{matchId}` and `POST /room/{matchId}/reroll` (`spec.md` §6).
//! Both require a verified bearer token binding the caller to `matchId`.

use crate::errors::ApiError;
use crate::room_conns::room_updated_frame;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use peerdev_protocol::RoomInfo;

fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::with_status(peerdev_common::Error::authz("missing bearer token"), StatusCode::UNAUTHORIZED))
}

pub async fn get_room(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<RoomInfo>, ApiError> {
    let token = bearer_token(&headers)?;
    state.collab.authorize(token, &match_id)?;
    Ok(Json(state.collab.get_room_info(&match_id).await?))
}

/// `spec.md` §4.4: a reroll broadcasts the updated `RoomInfo` to the
/// room (handled here, locally, since `CollabService::reroll` only
/// publishes the cross-instance `room_updated` event and the
/// subscriber relaying that event ignores its own instance's
/// publications — see Scenario 6).
pub async fn reroll(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<RoomInfo>, ApiError> {
    let token = bearer_token(&headers)?;
    let user_id = state.collab.authorize(token, &match_id)?;
    let info = state.collab.reroll(&match_id, &user_id).await?;
    state.room_conns.broadcast(&match_id, &room_updated_frame(&info)).await;
    Ok(Json(info))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MessagingBus;
    use crate::room_conns::RoomConnections;
    use peerdev_collab::CollabService;
    use peerdev_protocol::{Difficulty, RoomStatus, RoomTokenClaims, token};
    use peerdev_sandbox::NoSandbox;
    use peerdev_service_traits::NoopQuestionBankService;
    use peerdev_store::{FakeStore, Store};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    const SECRET: &[u8] = b"test-secret";

    async fn state_with_room(match_id: &str, user1: &str, user2: &str) -> AppState {
        let store = Arc::new(FakeStore::new());
        let info = RoomInfo {
            match_id: match_id.to_string(),
            user1: user1.to_string(),
            user2: user2.to_string(),
            category: "arrays".to_string(),
            difficulty: Difficulty::Easy,
            status: RoomStatus::Active,
            token1: String::new(),
            token2: String::new(),
            created_at: 0,
            question: None,
            rerolls_remaining: 1,
        };
        store
            .set_with_ttl(&peerdev_collab::keys::room(match_id), &serde_json::to_string(&info).unwrap(), Duration::from_secs(3600))
            .await
            .unwrap();

        let collab = CollabService::new(
            store.clone(),
            Arc::new(NoSandbox),
            Arc::new(NoopQuestionBankService),
            HashMap::new(),
            SECRET.to_vec(),
            "instance-a".to_string(),
            Duration::from_secs(30),
        );
        let matchmaker = Arc::new(peerdev_matchmaker::MatchmakerService::new(
            store.clone(),
            Arc::new(peerdev_service_traits::NoopUserRatingService),
            Arc::new(peerdev_service_traits::NoopHistoryPersistenceService),
            SECRET.to_vec(),
            Duration::from_secs(30),
            peerdev_config::StageThresholds { stage1_secs: 100, stage2_secs: 200, stage3_secs: 300 },
        ));
        AppState {
            matchmaker,
            collab,
            bus: MessagingBus::new(store.clone()),
            room_conns: Arc::new(RoomConnections::new()),
        }
    }

    fn headers_with_bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, format!("Bearer {token}").parse().unwrap());
        headers
    }

    /// `spec.md` §6: `GET /room/{matchId}` with a valid bearer token for
    /// one of the two participants returns the room's info.
    #[tokio::test]
    async fn get_room_with_valid_token_succeeds() {
        let state = state_with_room("m1", "alice", "bob").await;
        let token = token::issue(SECRET, &RoomTokenClaims { match_id: "m1".into(), user_id: "alice".into() }).unwrap();

        let info = get_room(State(state), Path("m1".to_string()), headers_with_bearer(&token)).await.unwrap();
        assert_eq!(info.0.user1, "alice");
        assert_eq!(info.0.user2, "bob");
    }

    /// `spec.md` §6: missing `Authorization` header is a 401.
    #[tokio::test]
    async fn get_room_without_bearer_header_is_unauthorized() {
        let state = state_with_room("m1", "alice", "bob").await;
        let err = get_room(State(state), Path("m1".to_string()), HeaderMap::new()).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    /// A token valid for a different `matchId` must not authorize this
    /// room (`CollabService::authorize`'s binding check).
    #[tokio::test]
    async fn get_room_with_token_for_another_match_is_unauthorized() {
        let state = state_with_room("m1", "alice", "bob").await;
        let token = token::issue(SECRET, &RoomTokenClaims { match_id: "other".into(), user_id: "alice".into() }).unwrap();
        let err = get_room(State(state), Path("m1".to_string()), headers_with_bearer(&token)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    /// `spec.md` §8 Scenario 6: the non-rerolling participant connected
    /// to this same instance must receive the `room_updated` frame too,
    /// not just peer instances via the cross-instance publish.
    #[tokio::test]
    async fn reroll_delivers_room_updated_to_the_other_local_participant() {
        let state = state_with_room("m1", "alice", "bob").await;
        let (tx_bob, mut rx_bob) = tokio::sync::mpsc::unbounded_channel();
        state.room_conns.register("m1", "bob", tx_bob).await;

        let token = token::issue(SECRET, &RoomTokenClaims { match_id: "m1".into(), user_id: "alice".into() }).unwrap();
        reroll(State(state), Path("m1".to_string()), headers_with_bearer(&token)).await.unwrap();

        let delivered = rx_bob.try_recv().unwrap();
        assert!(delivered.contains("room_updated"));
        assert!(delivered.contains("roomInfo"));
    }
}
