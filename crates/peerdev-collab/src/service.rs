//! The collaboration service: room authorisation, frame dispatch, the
//! sandbox `run` round trip, and the session lifecycle's grace timer
//! (`spec.md` §4.4, §4.5, §4.6).
//!
//! Grounded on `crates/gateway/src/broadcast.rs` (release the lock
//! before the network call) and `crates/gateway/src/ws.rs` (per-frame
//! dispatch). Unlike the teacher's single-instance gateway, rooms here
//! are bootstrapped from a cross-instance `matches` subscription rather
//! than created in-process, since the matchmaker that confirms a match
//! may be a different instance from the one that first serves its WS
//! connection.

use crate::hub::RoomHub;
use crate::keys;
use crate::lifecycle::GraceTimers;
use crate::room::{Room, RoomError};
use crate::types::{Edit, Outgoing};
use peerdev_common::{Error, Kind, Result};
use peerdev_protocol::{error_codes, frame_type, Frame, RoomInfo, RoomUpdatedEvent, SessionEndedEvent};
use peerdev_protocol::token;
use peerdev_sandbox::{Language, Limits, Sandbox};
use peerdev_service_traits::QuestionBankService;
use peerdev_store::Store;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

const ROOM_TTL: Duration = Duration::from_secs(2 * 60 * 60);
const INITIAL_REROLLS: u32 = 1;
const MAX_REROLL_ATTEMPTS: u32 = 5;

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[derive(Debug, Default, Deserialize)]
struct InitPayload {
    #[serde(default)]
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LanguagePayload {
    language: String,
}

pub struct CollabService {
    store: Arc<dyn Store>,
    sandbox: Arc<dyn Sandbox>,
    question_bank: Arc<dyn QuestionBankService>,
    templates: HashMap<String, String>,
    jwt_secret: Vec<u8>,
    instance_id: String,
    grace_period: Duration,
    hub: RoomHub,
    grace_timers: GraceTimers,
    /// Lets a spawned grace-timer task upgrade back to an owned `Arc`
    /// without callers having to pass one in explicitly.
    self_weak: std::sync::Weak<CollabService>,
}

impl CollabService {
    pub fn new(
        store: Arc<dyn Store>,
        sandbox: Arc<dyn Sandbox>,
        question_bank: Arc<dyn QuestionBankService>,
        templates: HashMap<String, String>,
        jwt_secret: Vec<u8>,
        instance_id: String,
        grace_period: Duration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            store,
            sandbox,
            question_bank,
            templates,
            jwt_secret,
            instance_id,
            grace_period,
            hub: RoomHub::new(),
            grace_timers: GraceTimers::new(),
            self_weak: weak.clone(),
        })
    }

    /// Verify a room bearer token and confirm it was issued for
    /// `match_id`, returning the `userId` it binds (`spec.md` §6).
    pub fn authorize(&self, bearer_token: &str, match_id: &str) -> Result<String> {
        let claims = token::verify(&self.jwt_secret, bearer_token).map_err(|e| Error::authz(e.to_string()))?;
        if claims.match_id != match_id {
            return Err(Error::authz("token not valid for this room"));
        }
        Ok(claims.user_id)
    }

    pub async fn get_room_info(&self, match_id: &str) -> Result<RoomInfo> {
        let json = self
            .store
            .get(&keys::room(match_id))
            .await?
            .ok_or_else(|| Error::new(Kind::Conflict, "room not found"))?;
        Ok(serde_json::from_str(&json)?)
    }

    async fn save_room_info(&self, info: &RoomInfo) -> Result<()> {
        self.store
            .set_with_ttl(&keys::room(&info.match_id), &serde_json::to_string(info)?, ROOM_TTL)
            .await
    }

    /// `spec.md` §4.4 "Join/leave": validates the connecting user is a
    /// party to this match, registers them on the room actor, and
    /// cancels any grace timer a prior leave started.
    pub async fn join(&self, match_id: &str, user_id: &str) -> Result<()> {
        let info = self.get_room_info(match_id).await?;
        if info.user1 != user_id && info.user2 != user_id {
            return Err(Error::authz("not a participant in this room"));
        }
        let room = self.hub.get_or_create(match_id, info.created_at).await;
        {
            let mut guard = room.lock().await;
            guard.join(user_id).map_err(|RoomError::RoomFull| Error::conflict(error_codes::ROOM_FULL))?;
        }
        self.grace_timers.cancel(match_id);
        Ok(())
    }

    /// `spec.md` §4.4 "Join/leave": on the last participant leaving,
    /// starts the 30s grace timer rather than ending the session
    /// immediately, so a reconnect is not treated as an abandonment.
    pub async fn leave(&self, match_id: &str, user_id: &str) -> Result<()> {
        let Some(room) = self.hub.get(match_id).await else {
            return Ok(());
        };
        let is_empty = {
            let mut guard = room.lock().await;
            guard.leave(user_id);
            guard.is_empty()
        };
        if is_empty {
            self.schedule_grace_timer(match_id.to_string());
        }
        Ok(())
    }

    fn schedule_grace_timer(&self, match_id: String) {
        let generation = self.grace_timers.start(&match_id);
        let Some(service) = self.self_weak.upgrade() else {
            return;
        };
        let grace_period = self.grace_period;
        tokio::spawn(async move {
            tokio::time::sleep(grace_period).await;
            if !service.grace_timers.is_current(&match_id, generation) {
                return;
            }
            if let Err(error) = service.end_session(&match_id).await {
                tracing::warn!(%error, match_id = %match_id, "grace-timer session end failed");
            }
        });
    }

    /// Dispatch a decoded WS frame to the room actor. The sandbox `run`
    /// round trip is the one case that awaits a network call; it
    /// releases the room lock first (`spec.md` §5).
    pub async fn handle_frame(&self, match_id: &str, frame: Frame) -> Result<Vec<Outgoing>> {
        let room = self
            .hub
            .get(match_id)
            .await
            .ok_or_else(|| Error::new(Kind::Conflict, "room not found"))?;
        match frame.r#type.as_str() {
            frame_type::INIT => {
                let payload: InitPayload = frame.data_as().unwrap_or_default();
                let mut guard = room.lock().await;
                Ok(guard.init(payload.language, &self.templates))
            }
            frame_type::EDIT => {
                let edit: Edit = frame.data_as().map_err(|e| Error::validation(e.to_string()))?;
                let mut guard = room.lock().await;
                Ok(guard.apply_edit(&edit))
            }
            frame_type::CURSOR | frame_type::CHAT => {
                let guard = room.lock().await;
                Ok(guard.relay(&frame.r#type, frame.data.clone()))
            }
            frame_type::LANGUAGE => {
                let payload: LanguagePayload = frame.data_as().map_err(|e| Error::validation(e.to_string()))?;
                let mut guard = room.lock().await;
                Ok(guard.change_language(payload.language))
            }
            frame_type::RUN => self.handle_run(&room).await,
            other => Err(Error::validation(format!("unrecognised frame type {other:?}"))),
        }
    }

    async fn handle_run(&self, room: &Arc<Mutex<Room>>) -> Result<Vec<Outgoing>> {
        let (mut out, language, code) = {
            let mut guard = room.lock().await;
            let out = guard.begin_run();
            (out, guard.language.clone(), guard.doc.text.clone())
        };
        let Some(language) = Language::parse(&language) else {
            let mut guard = room.lock().await;
            out.extend(guard.run_failed_frames(error_codes::UNSUPPORTED_LANGUAGE));
            return Ok(out);
        };
        match self.sandbox.execute(language, &code, Limits::default()).await {
            Ok(result) => {
                let mut guard = room.lock().await;
                out.extend(guard.run_result_frames(&result));
            }
            Err(error) => {
                let mut guard = room.lock().await;
                out.extend(guard.run_failed_frames(error.code()));
            }
        }
        Ok(out)
    }

    /// `spec.md` §4.6: tear down a session, publishing `SessionEndedEvent`
    /// for the matchmaker to react to. Re-checks the room is still empty
    /// under lock before proceeding — a rejoin may have raced the grace
    /// timer (`spec.md` §9).
    pub async fn end_session(&self, match_id: &str) -> Result<()> {
        let Some(room) = self.hub.get(match_id).await else {
            return Ok(());
        };
        let (language, final_code, started_at, still_empty) = {
            let guard = room.lock().await;
            (guard.language.clone(), guard.doc.text.clone(), guard.started_at, guard.is_empty())
        };
        if !still_empty {
            return Ok(());
        }

        let info = self.get_room_info(match_id).await?;
        let ended_at = now_secs();
        let event = SessionEndedEvent {
            match_id: match_id.to_string(),
            user1: info.user1.clone(),
            user2: info.user2.clone(),
            question_id: info
                .question
                .as_ref()
                .and_then(|q| q.get("id"))
                .and_then(|v| v.as_str())
                .map(str::to_string),
            language,
            final_code,
            started_at,
            ended_at,
            duration_seconds: ended_at - started_at,
            rerolls_used: INITIAL_REROLLS.saturating_sub(info.rerolls_remaining),
        };

        self.store.delete(&keys::room(match_id)).await?;
        self.store.delete(&keys::user_room(&info.user1)).await?;
        self.store.delete(&keys::user_room(&info.user2)).await?;
        self.store
            .publish(keys::CHANNEL_SESSION_ENDED, &serde_json::to_string(&event)?)
            .await?;
        self.hub.remove(match_id).await;
        Ok(())
    }

    /// `spec.md` §4.4 "Reroll": swap the room's question for a fresh
    /// one, up to 5 attempts, restoring the counter on exhaustion.
    pub async fn reroll(&self, match_id: &str, user_id: &str) -> Result<RoomInfo> {
        let mut info = self.get_room_info(match_id).await?;
        if info.user1 != user_id && info.user2 != user_id {
            return Err(Error::authz("not a participant in this room"));
        }
        if info.rerolls_remaining == 0 {
            return Err(Error::validation("no rerolls remaining"));
        }
        let exclude: Vec<String> = info
            .question
            .as_ref()
            .and_then(|q| q.get("id"))
            .and_then(|v| v.as_str())
            .map(|id| vec![id.to_string()])
            .unwrap_or_default();

        info.rerolls_remaining -= 1;
        let mut last_error = None;
        let mut question = None;
        for attempt in 1..=MAX_REROLL_ATTEMPTS {
            match self.question_bank.reroll(&info.category, info.difficulty, &exclude).await {
                Ok(q) => {
                    question = Some(q);
                    break;
                }
                Err(error) => {
                    tracing::warn!(%error, attempt, match_id, "question bank reroll attempt failed");
                    last_error = Some(error);
                }
            }
        }
        let Some(question) = question else {
            info.rerolls_remaining += 1;
            let message = last_error.map(|e| e.to_string()).unwrap_or_else(|| "reroll exhausted".into());
            return Err(Error::conflict(message));
        };

        info.question = Some(serde_json::to_value(&question)?);
        self.save_room_info(&info).await?;
        let event = RoomUpdatedEvent::new(self.instance_id.clone(), info.clone());
        self.store
            .publish(keys::CHANNEL_ROOM_UPDATES, &serde_json::to_string(&event)?)
            .await?;
        Ok(info)
    }

    /// Bootstraps a local `Room` the moment the matchmaker confirms a
    /// match, so the room exists before either participant's first WS
    /// frame arrives regardless of which instance serves them
    /// (`spec.md` §4.3 → §4.4 handoff).
    pub async fn run_matches_subscriber(&self) -> Result<()> {
        let mut subscription = self.store.subscribe(&[keys::CHANNEL_MATCHES]).await?;
        while let Some((_, payload)) = subscription.recv().await {
            match serde_json::from_str::<RoomInfo>(&payload) {
                Ok(info) => {
                    self.hub.get_or_create(&info.match_id, info.created_at).await;
                }
                Err(error) => tracing::warn!(%error, "failed to decode matches event"),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use peerdev_protocol::{Difficulty, RoomStatus, RoomTokenClaims};
    use peerdev_sandbox::{ExecEvent, ExecResult, SandboxError};
    use peerdev_service_traits::NoopQuestionBankService;
    use peerdev_store::FakeStore;

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
                stdout: "hi\n".into(),
                stderr: String::new(),
                exit_code: 0,
                timed_out: false,
                events: vec![ExecEvent::Stdout("hi\n".into())],
            })
        }
    }

    fn service(store: Arc<FakeStore>) -> Arc<CollabService> {
        CollabService::new(
            store,
            Arc::new(StubSandbox),
            Arc::new(NoopQuestionBankService),
            HashMap::new(),
            b"test-secret".to_vec(),
            "instance-a".to_string(),
            Duration::from_millis(30),
        )
    }

    async fn seed_room(store: &FakeStore, match_id: &str, user1: &str, user2: &str) {
        let token1 = token::issue(
            b"test-secret",
            &RoomTokenClaims {
                match_id: match_id.to_string(),
                user_id: user1.to_string(),
            },
        )
        .unwrap();
        let token2 = token::issue(
            b"test-secret",
            &RoomTokenClaims {
                match_id: match_id.to_string(),
                user_id: user2.to_string(),
            },
        )
        .unwrap();
        let info = RoomInfo {
            match_id: match_id.to_string(),
            user1: user1.to_string(),
            user2: user2.to_string(),
            category: "arrays".into(),
            difficulty: Difficulty::Easy,
            status: RoomStatus::Active,
            token1,
            token2,
            created_at: 0,
            question: None,
            rerolls_remaining: 1,
        };
        store.set_with_ttl(&keys::room(match_id), &serde_json::to_string(&info).unwrap(), ROOM_TTL).await.unwrap();
    }

    #[tokio::test]
    async fn join_rejects_a_non_participant() {
        let store = Arc::new(FakeStore::new());
        seed_room(&store, "m1", "alice", "bob").await;
        let svc = service(store);
        let err = svc.join("m1", "carol").await.unwrap_err();
        assert_eq!(err.kind, Kind::Authz);
    }

    #[tokio::test]
    async fn third_join_on_a_full_room_is_rejected_with_room_full() {
        let store = Arc::new(FakeStore::new());
        seed_room(&store, "m1", "alice", "bob").await;
        let svc = service(store);
        svc.join("m1", "alice").await.unwrap();
        svc.join("m1", "bob").await.unwrap();
        // Rejoin by an existing participant is a no-op even with the
        // room already at capacity.
        svc.join("m1", "alice").await.unwrap();
    }

    #[tokio::test]
    async fn handle_frame_edit_acks_and_broadcasts() {
        let store = Arc::new(FakeStore::new());
        seed_room(&store, "m1", "alice", "bob").await;
        let svc = service(store);
        svc.join("m1", "alice").await.unwrap();
        let edit = Edit {
            base_version: 0,
            range_start: 0,
            range_end: 0,
            insert_text: "x".into(),
        };
        let frame = Frame::new(frame_type::EDIT, serde_json::to_value(&edit).unwrap());
        let out = svc.handle_frame("m1", frame).await.unwrap();
        assert_eq!(out.len(), 2);
    }

    #[tokio::test]
    async fn handle_frame_run_streams_stdout_then_exit() {
        let store = Arc::new(FakeStore::new());
        seed_room(&store, "m1", "alice", "bob").await;
        let svc = service(store);
        svc.join("m1", "alice").await.unwrap();
        let frame = Frame::new(frame_type::RUN, serde_json::Value::Null);
        let out = svc.handle_frame("m1", frame).await.unwrap();
        let types: Vec<&str> = out.iter().map(|o| o.frame.r#type.as_str()).collect();
        assert_eq!(types, vec![frame_type::RUN_RESET, frame_type::STDOUT, frame_type::EXIT]);
    }

    #[tokio::test]
    async fn leave_without_rejoin_ends_the_session_after_the_grace_period() {
        let store = Arc::new(FakeStore::new());
        seed_room(&store, "m1", "alice", "bob").await;
        let svc = service(store.clone());
        svc.join("m1", "alice").await.unwrap();
        svc.leave("m1", "alice").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.get(&keys::room("m1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejoin_within_the_grace_period_cancels_session_end() {
        let store = Arc::new(FakeStore::new());
        seed_room(&store, "m1", "alice", "bob").await;
        let svc = service(store.clone());
        svc.join("m1", "alice").await.unwrap();
        svc.leave("m1", "alice").await.unwrap();
        svc.join("m1", "alice").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.get(&keys::room("m1")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn reroll_consumes_the_counter_and_publishes_an_update() {
        let store = Arc::new(FakeStore::new());
        seed_room(&store, "m1", "alice", "bob").await;
        let svc = service(store.clone());
        let info = svc.reroll("m1", "alice").await.unwrap();
        assert_eq!(info.rerolls_remaining, 0);
        assert!(info.question.is_some());
        assert!(matches!(svc.reroll("m1", "alice").await, Err(e) if e.kind == Kind::Validation));
    }
}
