//! The matchmaker service: queues, the per-user stage machine, pair
//! search, the handshake, and finalisation (`spec.md` §4.3).
//!
//! Grounded on `moltis`'s `crates/gateway/src/pairing.rs` for the
//! pending-request/approve/reject/evict-expired shape, generalised from
//! a single pending device pairing to many concurrent pending matches
//! searched for across shared-store queues.

use crate::events;
use crate::keys;
use crate::pairing::{self, PairSearch};
use crate::types::{CheckResult, HandshakeState, OriginalPrefs, PendingMatch, QueueEntry};
use peerdev_common::{Error, Kind, Result};
use peerdev_config::StageThresholds;
use peerdev_protocol::{Difficulty, RoomInfo, RoomStatus, RoomTokenClaims, SessionEndedEvent, token};
use peerdev_service_traits::{HistoryPersistenceService, RatingUpdate, UserRatingService};
use peerdev_store::Store;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const ROOM_TTL: Duration = Duration::from_secs(2 * 60 * 60);
const HISTORY_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const DEFAULT_RATING: f64 = 1500.0;

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

fn parse_difficulty(raw: &str) -> Result<Difficulty> {
    match raw {
        "easy" => Ok(Difficulty::Easy),
        "medium" => Ok(Difficulty::Medium),
        "hard" => Ok(Difficulty::Hard),
        other => Err(Error::validation(format!("unknown difficulty {other:?}"))),
    }
}

fn field<'a>(fields: &'a [(String, String)], name: &str) -> Option<&'a str> {
    fields.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
}

fn parse_queue_entry(user_id: &str, fields: &[(String, String)]) -> Result<QueueEntry> {
    let category = field(fields, "category")
        .ok_or_else(|| Error::internal("queue entry missing category"))?
        .to_string();
    let difficulty = parse_difficulty(
        field(fields, "difficulty").ok_or_else(|| Error::internal("queue entry missing difficulty"))?,
    )?;
    let joined_at = field(fields, "joined_at")
        .ok_or_else(|| Error::internal("queue entry missing joined_at"))?
        .parse::<i64>()
        .map_err(|e| Error::internal(format!("bad joined_at: {e}")))?;
    let stage = field(fields, "stage")
        .ok_or_else(|| Error::internal("queue entry missing stage"))?
        .parse::<u8>()
        .map_err(|e| Error::internal(format!("bad stage: {e}")))?;
    Ok(QueueEntry {
        user_id: user_id.to_string(),
        category,
        difficulty,
        joined_at,
        stage,
    })
}

pub struct MatchmakerService {
    store: Arc<dyn Store>,
    rating_service: Arc<dyn UserRatingService>,
    history: Arc<dyn HistoryPersistenceService>,
    jwt_secret: Vec<u8>,
    handshake_timeout: Duration,
    thresholds: StageThresholds,
}

impl MatchmakerService {
    pub fn new(
        store: Arc<dyn Store>,
        rating_service: Arc<dyn UserRatingService>,
        history: Arc<dyn HistoryPersistenceService>,
        jwt_secret: Vec<u8>,
        handshake_timeout: Duration,
        thresholds: StageThresholds,
    ) -> Self {
        Self {
            store,
            rating_service,
            history,
            jwt_secret,
            handshake_timeout,
            thresholds,
        }
    }

    // ── Queue membership ────────────────────────────────────────────────

    pub async fn join(&self, user_id: &str, category: &str, difficulty: Difficulty) -> Result<()> {
        if self.store.get(&keys::user_room(user_id)).await?.is_some() {
            return Err(Error::conflict("already in a room"));
        }
        let now = now_secs();
        let diff = difficulty.to_string();
        self.store
            .hash_set_all(
                &keys::user_entry(user_id),
                &[
                    ("category".into(), category.to_string()),
                    ("difficulty".into(), diff.clone()),
                    ("joined_at".into(), now.to_string()),
                    ("stage".into(), "1".into()),
                ],
            )
            .await?;
        self.store
            .sorted_set_add(&keys::queue_cat_diff(category, &diff), user_id, now as f64)
            .await?;
        self.store
            .sorted_set_add(&keys::queue_cat(category), user_id, now as f64)
            .await?;
        self.store
            .sorted_set_add(keys::QUEUE_ALL, user_id, now as f64)
            .await?;
        Ok(())
    }

    pub async fn cancel(&self, user_id: &str) -> Result<()> {
        let fields = self.store.hash_get_all(&keys::user_entry(user_id)).await?;
        if fields.is_empty() {
            return Err(Error::new(Kind::Conflict, "not in queue"));
        }
        let entry = parse_queue_entry(user_id, &fields)?;
        self.remove_from_queues(&entry).await?;
        self.store.delete(&keys::user_entry(user_id)).await?;
        Ok(())
    }

    pub async fn check(&self, user_id: &str) -> Result<CheckResult> {
        let Some(match_id) = self.store.get(&keys::user_room(user_id)).await? else {
            return Ok(CheckResult::not_in_room());
        };
        let Some(room_json) = self.store.get(&keys::room(&match_id)).await? else {
            return Ok(CheckResult::not_in_room());
        };
        let room: RoomInfo = serde_json::from_str(&room_json)?;
        Ok(CheckResult {
            in_room: true,
            room_id: Some(room.match_id.clone()),
            category: Some(room.category.clone()),
            difficulty: Some(room.difficulty),
            token: room.token_for(user_id).map(str::to_string),
        })
    }

    async fn remove_from_queues(&self, entry: &QueueEntry) -> Result<()> {
        let diff = entry.difficulty.to_string();
        self.store
            .sorted_set_remove(&keys::queue_cat_diff(&entry.category, &diff), &entry.user_id)
            .await?;
        self.store
            .sorted_set_remove(&keys::queue_cat(&entry.category), &entry.user_id)
            .await?;
        self.store
            .sorted_set_remove(keys::QUEUE_ALL, &entry.user_id)
            .await?;
        Ok(())
    }

    async fn requeue(&self, prefs: &OriginalPrefs) -> Result<()> {
        let diff = prefs.difficulty.to_string();
        self.store
            .hash_set_all(
                &keys::user_entry(&prefs.user_id),
                &[
                    ("category".into(), prefs.category.clone()),
                    ("difficulty".into(), diff.clone()),
                    ("joined_at".into(), prefs.joined_at.to_string()),
                    ("stage".into(), "1".into()),
                ],
            )
            .await?;
        self.store
            .sorted_set_add(
                &keys::queue_cat_diff(&prefs.category, &diff),
                &prefs.user_id,
                prefs.joined_at as f64,
            )
            .await?;
        self.store
            .sorted_set_add(&keys::queue_cat(&prefs.category), &prefs.user_id, prefs.joined_at as f64)
            .await?;
        self.store
            .sorted_set_add(keys::QUEUE_ALL, &prefs.user_id, prefs.joined_at as f64)
            .await?;
        Ok(())
    }

    // ── Stage machine ────────────────────────────────────────────────────

    async fn scan_entries(&self) -> Result<Vec<QueueEntry>> {
        let keys_found = self.store.scan("user:*").await?;
        let mut entries = Vec::with_capacity(keys_found.len());
        for key in keys_found {
            let user_id = key.strip_prefix("user:").unwrap_or(&key);
            let fields = self.store.hash_get_all(&key).await?;
            if fields.is_empty() {
                continue;
            }
            if let Ok(entry) = parse_queue_entry(user_id, &fields) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    async fn set_stage(&self, entry: &QueueEntry) -> Result<()> {
        self.store
            .hash_set_all(
                &keys::user_entry(&entry.user_id),
                &[("stage".into(), entry.stage.to_string())],
            )
            .await
    }

    async fn load_rating(&self, user_id: &str) -> Result<f64> {
        let fields = self.store.hash_get_all(&keys::user_rating(user_id)).await?;
        Ok(field(&fields, "rating")
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(DEFAULT_RATING))
    }

    /// Advance stage timers, remove stage-3 timeouts, and attempt a
    /// pairing for every (category, difficulty) group still queued.
    /// Runs every 5s (`spec.md` §4.3, §5).
    pub async fn tick(&self) -> Result<()> {
        let now = now_secs();
        let mut entries = self.scan_entries().await?;

        for entry in entries.iter_mut() {
            let elapsed = now - entry.joined_at;
            match entry.stage {
                1 if elapsed > self.thresholds.stage1_secs as i64 => {
                    entry.stage = 2;
                    self.set_stage(entry).await?;
                }
                2 if elapsed > self.thresholds.stage2_secs as i64 => {
                    entry.stage = 3;
                    self.set_stage(entry).await?;
                }
                3 if elapsed > self.thresholds.stage3_secs as i64 => {
                    self.remove_from_queues(entry).await?;
                    self.store.delete(&keys::user_entry(&entry.user_id)).await?;
                    self.store
                        .publish(
                            &keys::user_message_channel(&entry.user_id),
                            &serde_json::to_string(&events::timeout())?,
                        )
                        .await?;
                    entry.stage = 0;
                }
                _ => {}
            }
        }
        entries.retain(|e| e.stage != 0);

        let mut ratings = HashMap::with_capacity(entries.len());
        for entry in &entries {
            let rating = self.load_rating(&entry.user_id).await?;
            ratings.insert(entry.user_id.clone(), rating);
        }

        let mut groups: HashMap<(String, String), Vec<&QueueEntry>> = HashMap::new();
        for entry in &entries {
            groups
                .entry((entry.category.clone(), entry.difficulty.to_string()))
                .or_default()
                .push(entry);
        }

        for ((category, difficulty), group) in groups {
            let stage = group.iter().map(|e| e.stage).max().unwrap_or(1);
            let search = PairSearch {
                store: self.store.as_ref(),
            };
            let Some((a, b)) = search.find_pair(&category, &difficulty, stage, &ratings).await? else {
                continue;
            };
            let (Some(u1), Some(u2)) = (
                entries.iter().find(|e| e.user_id == a),
                entries.iter().find(|e| e.user_id == b),
            ) else {
                continue;
            };
            self.create_pending_match(u1, u2, stage).await?;
        }
        Ok(())
    }

    async fn create_pending_match(&self, u1: &QueueEntry, u2: &QueueEntry, stage: u8) -> Result<()> {
        let (category, difficulty) = pairing::resolve_category_difficulty(stage, u1, u2);
        let match_id = uuid::Uuid::new_v4().to_string();

        let token1 = token::issue(
            &self.jwt_secret,
            &RoomTokenClaims {
                match_id: match_id.clone(),
                user_id: u1.user_id.clone(),
            },
        )
        .map_err(|e| Error::internal(e.to_string()))?;
        let token2 = token::issue(
            &self.jwt_secret,
            &RoomTokenClaims {
                match_id: match_id.clone(),
                user_id: u2.user_id.clone(),
            },
        )
        .map_err(|e| Error::internal(e.to_string()))?;

        let now = now_secs();
        let expires_at = now + self.handshake_timeout.as_secs() as i64;
        let pending = PendingMatch {
            match_id: match_id.clone(),
            user1: u1.user_id.clone(),
            user2: u2.user_id.clone(),
            category,
            difficulty,
            per_user_original_prefs: [
                OriginalPrefs {
                    user_id: u1.user_id.clone(),
                    category: u1.category.clone(),
                    difficulty: u1.difficulty,
                    joined_at: u1.joined_at,
                },
                OriginalPrefs {
                    user_id: u2.user_id.clone(),
                    category: u2.category.clone(),
                    difficulty: u2.difficulty,
                    joined_at: u2.joined_at,
                },
            ],
            token1,
            token2,
            created_at: now,
            expires_at,
        };

        self.remove_from_queues(u1).await?;
        self.store.delete(&keys::user_entry(&u1.user_id)).await?;
        self.remove_from_queues(u2).await?;
        self.store.delete(&keys::user_entry(&u2.user_id)).await?;

        let ttl = self.handshake_timeout + Duration::from_secs(5);
        self.store
            .set_with_ttl(&keys::pending_match(&match_id), &serde_json::to_string(&pending)?, ttl)
            .await?;
        self.store
            .set_with_ttl(&keys::handshake(&match_id, &u1.user_id), HandshakeState::Pending.as_str(), ttl)
            .await?;
        self.store
            .set_with_ttl(&keys::handshake(&match_id, &u2.user_id), HandshakeState::Pending.as_str(), ttl)
            .await?;

        self.store
            .publish(
                &keys::user_message_channel(&u1.user_id),
                &serde_json::to_string(&events::match_pending(&match_id))?,
            )
            .await?;
        self.store
            .publish(
                &keys::user_message_channel(&u2.user_id),
                &serde_json::to_string(&events::match_pending(&match_id))?,
            )
            .await?;
        Ok(())
    }

    // ── Handshake ────────────────────────────────────────────────────────

    async fn load_pending_match(&self, match_id: &str) -> Result<Option<PendingMatch>> {
        match self.store.get(&keys::pending_match(match_id)).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub async fn handle_accept(&self, match_id: &str, user_id: &str) -> Result<()> {
        let pending = self
            .load_pending_match(match_id)
            .await?
            .ok_or_else(|| Error::new(Kind::Conflict, "match not found or expired"))?;
        if !pending.is_party(user_id) {
            return Err(Error::authz("not a party to this match"));
        }
        self.store
            .set_with_ttl(
                &keys::handshake(match_id, user_id),
                HandshakeState::Accepted.as_str(),
                self.handshake_timeout,
            )
            .await?;

        let other = pending
            .other_user(user_id)
            .ok_or_else(|| Error::internal("pending match missing counterpart"))?;
        let other_state = self.store.get(&keys::handshake(match_id, other)).await?;
        if other_state.as_deref() == Some(HandshakeState::Accepted.as_str()) {
            self.finalize(match_id).await?;
        }
        Ok(())
    }

    pub async fn handle_reject(&self, match_id: &str, user_id: &str) -> Result<()> {
        let pending = self
            .load_pending_match(match_id)
            .await?
            .ok_or_else(|| Error::new(Kind::Conflict, "match not found or expired"))?;
        if !pending.is_party(user_id) {
            return Err(Error::authz("not a party to this match"));
        }
        let other = pending
            .other_user(user_id)
            .ok_or_else(|| Error::internal("pending match missing counterpart"))?
            .to_string();
        if let Some(prefs) = pending.prefs_for(&other) {
            self.requeue(prefs).await?;
        }
        self.store.delete(&keys::pending_match(match_id)).await?;
        self.store.delete(&keys::handshake(match_id, &pending.user1)).await?;
        self.store.delete(&keys::handshake(match_id, &pending.user2)).await?;
        self.store
            .publish(
                &keys::user_message_channel(&other),
                &serde_json::to_string(&events::requeued())?,
            )
            .await?;
        Ok(())
    }

    /// Idempotent: only the caller whose `delete` observes the key as
    /// having existed proceeds to write the room (`spec.md` §4.3
    /// Concurrency note).
    async fn finalize(&self, match_id: &str) -> Result<()> {
        let Some(json) = self.store.get(&keys::pending_match(match_id)).await? else {
            return Ok(());
        };
        if !self.store.delete(&keys::pending_match(match_id)).await? {
            return Ok(());
        }
        let pending: PendingMatch = serde_json::from_str(&json)?;
        self.store.delete(&keys::handshake(match_id, &pending.user1)).await?;
        self.store.delete(&keys::handshake(match_id, &pending.user2)).await?;

        let room = RoomInfo {
            match_id: pending.match_id.clone(),
            user1: pending.user1.clone(),
            user2: pending.user2.clone(),
            category: pending.category.clone(),
            difficulty: pending.difficulty,
            status: RoomStatus::Active,
            token1: pending.token1.clone(),
            token2: pending.token2.clone(),
            created_at: now_secs(),
            question: None,
            rerolls_remaining: 1,
        };
        let room_json = serde_json::to_string(&room)?;
        self.store.set_with_ttl(&keys::room(match_id), &room_json, ROOM_TTL).await?;
        self.store
            .set_with_ttl(&keys::user_room(&pending.user1), match_id, ROOM_TTL)
            .await?;
        self.store
            .set_with_ttl(&keys::user_room(&pending.user2), match_id, ROOM_TTL)
            .await?;

        self.store.publish(keys::CHANNEL_MATCHES, &room_json).await?;
        self.store
            .publish(
                &keys::user_message_channel(&pending.user1),
                &serde_json::to_string(&events::match_confirmed(match_id, &pending.token1))?,
            )
            .await?;
        self.store
            .publish(
                &keys::user_message_channel(&pending.user2),
                &serde_json::to_string(&events::match_confirmed(match_id, &pending.token2))?,
            )
            .await?;

        self.store
            .set_add_with_ttl(&keys::user_history_partners(&pending.user1), &pending.user2, HISTORY_TTL)
            .await?;
        self.store
            .set_add_with_ttl(&keys::user_history_partners(&pending.user2), &pending.user1, HISTORY_TTL)
            .await?;
        Ok(())
    }

    /// Every 2s: re-queue accepters, remove non-accepters, and clean up
    /// any `PendingMatch` whose window has elapsed (`spec.md` §4.3).
    pub async fn expiry_sweep(&self) -> Result<()> {
        let now = now_secs();
        for key in self.store.scan("pending_match:*").await? {
            let Some(json) = self.store.get(&key).await? else {
                continue;
            };
            let pending: PendingMatch = serde_json::from_str(&json)?;
            if now <= pending.expires_at {
                continue;
            }
            if !self.store.delete(&key).await? {
                continue;
            }
            let h1 = self.store.get(&keys::handshake(&pending.match_id, &pending.user1)).await?;
            let h2 = self.store.get(&keys::handshake(&pending.match_id, &pending.user2)).await?;
            self.store.delete(&keys::handshake(&pending.match_id, &pending.user1)).await?;
            self.store.delete(&keys::handshake(&pending.match_id, &pending.user2)).await?;

            for (user_id, state) in [(&pending.user1, h1), (&pending.user2, h2)] {
                let accepted = state.as_deref() == Some(HandshakeState::Accepted.as_str());
                if accepted {
                    if let Some(prefs) = pending.prefs_for(user_id) {
                        self.requeue(prefs).await?;
                    }
                    self.store
                        .publish(
                            &keys::user_message_channel(user_id),
                            &serde_json::to_string(&events::requeued())?,
                        )
                        .await?;
                } else {
                    self.store
                        .publish(
                            &keys::user_message_channel(user_id),
                            &serde_json::to_string(&events::timeout())?,
                        )
                        .await?;
                }
            }
        }
        Ok(())
    }

    // ── Session end / ratings ────────────────────────────────────────────

    pub async fn handle_session_ended(&self, event: &SessionEndedEvent) -> Result<()> {
        self.store.delete(&keys::user_room(&event.user1)).await?;
        self.store.delete(&keys::user_room(&event.user2)).await?;
        self.store.delete(&keys::room(&event.match_id)).await?;

        let metrics = serde_json::to_value(event)?;
        match self.rating_service.apply_outcome(metrics).await {
            Ok(updates) => self.apply_rating_updates(&updates).await?,
            Err(error) => tracing::warn!(%error, "rating service failed to process session outcome"),
        }
        if let Err(error) = self.history.record(event).await {
            tracing::warn!(%error, match_id = %event.match_id, "history persistence failed for ended session");
        }
        Ok(())
    }

    pub async fn session_feedback(&self, metrics: serde_json::Value) -> Result<Vec<RatingUpdate>> {
        let updates = self
            .rating_service
            .apply_outcome(metrics)
            .await
            .map_err(|e| Error::validation(e.to_string()))?;
        self.apply_rating_updates(&updates).await?;
        Ok(updates)
    }

    async fn apply_rating_updates(&self, updates: &[RatingUpdate]) -> Result<()> {
        for update in updates {
            self.store
                .hash_set_all(
                    &keys::user_rating(&update.user_id),
                    &[
                        ("rating".into(), update.new_rating.to_string()),
                        ("sessions_completed".into(), update.sessions_completed.to_string()),
                        ("last_update".into(), now_secs().to_string()),
                    ],
                )
                .await?;
        }
        Ok(())
    }
}
