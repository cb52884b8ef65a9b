//! Collaboration room: the OT document buffer, the room actor, its
//! cross-instance hub, the grace-timer lifecycle, and the service that
//! ties them to the shared store and sandbox (`spec.md` §4.4–§4.6).

pub mod hub;
pub mod keys;
pub mod lifecycle;
mod ot;
mod room;
mod service;
pub mod types;

pub use hub::RoomHub;
pub use lifecycle::GraceTimers;
pub use ot::{OtBuffer, OtError};
pub use room::{Room, RoomError, DEFAULT_LANGUAGE};
pub use service::CollabService;
pub use types::{DocState, Edit, Outgoing, Recipient};

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use peerdev_protocol::{frame_type, token, Difficulty, Frame, RoomInfo, RoomStatus, RoomTokenClaims};
    use peerdev_sandbox::{ExecEvent, ExecResult, Language, Limits, Sandbox, SandboxError};
    use peerdev_service_traits::NoopQuestionBankService;
    use peerdev_store::{FakeStore, Store};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    struct StubSandbox;

    #[async_trait]
    impl Sandbox for StubSandbox {
        fn backend_name(&self) -> &'static str {
            "stub"
        }

        async fn ensure_ready(&self) -> std::result::Result<(), SandboxError> {
            Ok(())
        }

        async fn execute(&self, _language: Language, _code: &str, _limits: Limits) -> std::result::Result<ExecResult, SandboxError> {
            Ok(ExecResult {
                stdout: "42\n".into(),
                stderr: String::new(),
                exit_code: 0,
                timed_out: false,
                events: vec![ExecEvent::Stdout("42\n".into())],
            })
        }
    }

    async fn seeded_service() -> (Arc<CollabService>, Arc<FakeStore>, String, String) {
        let store = Arc::new(FakeStore::new());
        let secret = b"itest-secret".to_vec();
        let match_id = "m-itest".to_string();
        let token1 = token::issue(
            &secret,
            &RoomTokenClaims {
                match_id: match_id.clone(),
                user_id: "alice".into(),
            },
        )
        .unwrap();
        let token2 = token::issue(
            &secret,
            &RoomTokenClaims {
                match_id: match_id.clone(),
                user_id: "bob".into(),
            },
        )
        .unwrap();
        let info = RoomInfo {
            match_id: match_id.clone(),
            user1: "alice".into(),
            user2: "bob".into(),
            category: "arrays".into(),
            difficulty: Difficulty::Easy,
            status: RoomStatus::Active,
            token1: token1.clone(),
            token2,
            created_at: 0,
            question: None,
            rerolls_remaining: 1,
        };
        store
            .set_with_ttl(&keys::room(&match_id), &serde_json::to_string(&info).unwrap(), Duration::from_secs(3600))
            .await
            .unwrap();
        let templates = HashMap::from([("python".to_string(), "pass".to_string())]);
        let service = CollabService::new(
            store.clone(),
            Arc::new(StubSandbox),
            Arc::new(NoopQuestionBankService),
            templates,
            secret,
            "instance-itest".into(),
            Duration::from_secs(30),
        );
        (service, store, match_id, token1)
    }

    /// `spec.md` §8 Scenario 2: an edit is applied, acknowledged to its
    /// sender, and broadcast to the peer.
    #[tokio::test]
    async fn scenario_edit_is_acked_and_broadcast() {
        let (service, _store, match_id, token1) = seeded_service().await;
        let user_id = service.authorize(&token1, &match_id).unwrap();
        assert_eq!(user_id, "alice");
        service.join(&match_id, "alice").await.unwrap();
        service.join(&match_id, "bob").await.unwrap();

        let init_out = service
            .handle_frame(&match_id, Frame::new(frame_type::INIT, serde_json::Value::Null))
            .await
            .unwrap();
        assert_eq!(init_out[0].frame.r#type, frame_type::INIT);

        let edit = Edit {
            base_version: 1,
            range_start: 0,
            range_end: 4,
            insert_text: "print(1)".into(),
        };
        let out = service
            .handle_frame(&match_id, Frame::new(frame_type::EDIT, serde_json::to_value(&edit).unwrap()))
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|o| o.frame.r#type == frame_type::DOC));
    }

    /// `spec.md` §8 Scenario 3: an edit submitted against a stale
    /// `base_version` is rejected with a `version_mismatch` error frame
    /// instead of corrupting the document.
    #[tokio::test]
    async fn scenario_stale_base_version_is_rejected() {
        let (service, _store, match_id, _token1) = seeded_service().await;
        service.join(&match_id, "alice").await.unwrap();
        service
            .handle_frame(&match_id, Frame::new(frame_type::INIT, serde_json::Value::Null))
            .await
            .unwrap();

        let edit = Edit {
            base_version: 999,
            range_start: 0,
            range_end: 0,
            insert_text: "x".into(),
        };
        let out = service
            .handle_frame(&match_id, Frame::new(frame_type::EDIT, serde_json::to_value(&edit).unwrap()))
            .await
            .unwrap();
        assert_eq!(out[0].frame.r#type, frame_type::ERROR);
        assert_eq!(out[0].frame.data["kind"], "version_mismatch");
    }

    /// `spec.md` §8 Scenario 4: a third distinct connection to a room
    /// already at capacity is refused with `room_full`.
    #[tokio::test]
    async fn scenario_third_connection_is_room_full() {
        let (service, _store, match_id, _token1) = seeded_service().await;
        service.join(&match_id, "alice").await.unwrap();
        service.join(&match_id, "bob").await.unwrap();
        let err = service.join(&match_id, "carol").await.unwrap_err();
        assert_eq!(err.kind, peerdev_common::Kind::Authz);
    }

    /// `spec.md` §8 Scenario 6: a reroll swaps in a fresh question and
    /// decrements the room's counter to zero.
    #[tokio::test]
    async fn scenario_reroll_then_second_reroll_is_refused() {
        let (service, _store, match_id, _token1) = seeded_service().await;
        let updated = service.reroll(&match_id, "alice").await.unwrap();
        assert_eq!(updated.rerolls_remaining, 0);
        assert!(service.reroll(&match_id, "alice").await.is_err());
    }
}
