//! Matchmaker: the queue/stage machine, pair search, and the two-party
//! acceptance handshake (`spec.md` §4.3).

pub mod events;
pub mod keys;
pub mod pairing;
mod service;
pub mod types;

pub use service::MatchmakerService;

#[cfg(test)]
mod tests {
    use super::*;
    use peerdev_config::StageThresholds;
    use peerdev_protocol::Difficulty;
    use peerdev_service_traits::{NoopHistoryPersistenceService, NoopUserRatingService};
    use peerdev_store::FakeStore;
    use std::sync::Arc;
    use std::time::Duration;

    fn service(store: Arc<FakeStore>) -> MatchmakerService {
        MatchmakerService::new(
            store,
            Arc::new(NoopUserRatingService),
            Arc::new(NoopHistoryPersistenceService),
            b"test-secret".to_vec(),
            Duration::from_secs(30),
            StageThresholds {
                stage1_secs: 100,
                stage2_secs: 200,
                stage3_secs: 300,
            },
        )
    }

    /// `spec.md` §8 Scenario 1: two users join the same category and
    /// difficulty; within one tick they should be offered a pending
    /// match, and once both accept, a room is created for each.
    #[tokio::test]
    async fn two_same_bucket_joiners_match_and_confirm() {
        let store = Arc::new(FakeStore::new());
        let mm = service(store.clone());

        mm.join("alice", "arrays", Difficulty::Easy).await.unwrap();
        mm.join("bob", "arrays", Difficulty::Easy).await.unwrap();
        mm.tick().await.unwrap();

        let pending_keys = store.scan("pending_match:*").await.unwrap();
        assert_eq!(pending_keys.len(), 1);
        let json = store.get(&pending_keys[0]).await.unwrap().unwrap();
        let pending: types::PendingMatch = serde_json::from_str(&json).unwrap();
        assert!(pending.is_party("alice"));
        assert!(pending.is_party("bob"));

        mm.handle_accept(&pending.match_id, "alice").await.unwrap();
        // Not finalized yet: only one side accepted.
        assert!(store.get(&keys::pending_match(&pending.match_id)).await.unwrap().is_some());

        mm.handle_accept(&pending.match_id, "bob").await.unwrap();
        // Finalized: PendingMatch is gone, both have a UserRoom.
        assert!(store.get(&keys::pending_match(&pending.match_id)).await.unwrap().is_none());
        let room_id_alice = store.get(&keys::user_room("alice")).await.unwrap().unwrap();
        let room_id_bob = store.get(&keys::user_room("bob")).await.unwrap().unwrap();
        assert_eq!(room_id_alice, room_id_bob);

        let check = mm.check("alice").await.unwrap();
        assert!(check.in_room);
        assert_eq!(check.room_id.as_deref(), Some(room_id_alice.as_str()));
    }

    /// `spec.md` §8 Scenario 5: a pending match with only one acceptance
    /// expires; the accepter is re-queued and the non-accepter is
    /// dropped with a `timeout` notification.
    #[tokio::test]
    async fn expiry_sweep_requeues_accepter_and_drops_the_other() {
        let store = Arc::new(FakeStore::new());
        let mm = service(store.clone());

        mm.join("alice", "arrays", Difficulty::Easy).await.unwrap();
        mm.join("bob", "arrays", Difficulty::Easy).await.unwrap();
        mm.tick().await.unwrap();

        let pending_keys = store.scan("pending_match:*").await.unwrap();
        let json = store.get(&pending_keys[0]).await.unwrap().unwrap();
        let pending: types::PendingMatch = serde_json::from_str(&json).unwrap();
        mm.handle_accept(&pending.match_id, "alice").await.unwrap();

        // Force expiry by overwriting the stored record with a past
        // `expires_at`, since the handshake window itself isn't mocked.
        let mut expired = pending.clone();
        expired.expires_at = 0;
        store
            .set_with_ttl(
                &keys::pending_match(&pending.match_id),
                &serde_json::to_string(&expired).unwrap(),
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        mm.expiry_sweep().await.unwrap();

        assert!(store.get(&keys::pending_match(&pending.match_id)).await.unwrap().is_none());
        // alice accepted: re-queued at stage 1.
        let alice_fields = store.hash_get_all(&keys::user_entry("alice")).await.unwrap();
        assert!(!alice_fields.is_empty());
        // bob did not accept: dropped entirely, no queue entry left.
        let bob_fields = store.hash_get_all(&keys::user_entry("bob")).await.unwrap();
        assert!(bob_fields.is_empty());
    }

    #[tokio::test]
    async fn cancel_removes_from_every_queue_scope() {
        let store = Arc::new(FakeStore::new());
        let mm = service(store.clone());
        mm.join("alice", "arrays", Difficulty::Easy).await.unwrap();
        mm.cancel("alice").await.unwrap();

        assert!(store
            .sorted_set_range_by_index("queue:arrays:easy", 0, -1)
            .await
            .unwrap()
            .is_empty());
        assert!(store.sorted_set_range_by_index("queue:arrays", 0, -1).await.unwrap().is_empty());
        assert!(store.sorted_set_range_by_index(keys::QUEUE_ALL, 0, -1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn join_rejects_user_already_in_a_room() {
        let store = Arc::new(FakeStore::new());
        let mm = service(store.clone());
        store
            .set_with_ttl(&keys::user_room("alice"), "m1", Duration::from_secs(60))
            .await
            .unwrap();
        let err = mm.join("alice", "arrays", Difficulty::Easy).await.unwrap_err();
        assert_eq!(err.kind, peerdev_common::Kind::Conflict);
    }
}
