//! Pair search over the per-(category,difficulty)/per-category/global
//! queues (`spec.md` §4.3 "Pair search").
//!
//! Grounded on `moltis`'s `crates/gateway/src/pairing.rs`
//! (`PairingState::request_pair`/`approve`): a pending-request map with
//! explicit acceptance and TTL eviction. That file pairs exactly one
//! device per request; here the same "propose, then require bilateral
//! acceptance" shape is generalised to searching a queue for the first
//! compatible couple rather than approving a single named request.

use crate::keys;
use crate::types::QueueEntry;
use peerdev_common::Result;
use peerdev_protocol::Difficulty;
use peerdev_store::Store;
use std::collections::HashMap;

const CANDIDATES_PER_QUEUE: isize = 10;

fn rating_bound(stage: u8) -> f64 {
    match stage {
        1 => 100.0,
        2 => 200.0,
        _ => f64::INFINITY,
    }
}

fn rating_compatible(a: f64, b: f64, stage: u8) -> bool {
    (a - b).abs() <= rating_bound(stage)
}

async fn has_recent_match(store: &dyn Store, a: &str, b: &str) -> Result<bool> {
    Ok(store.is_member(&keys::user_history_partners(a), b).await?
        || store.is_member(&keys::user_history_partners(b), a).await?)
}

fn candidate_queues(category: &str, difficulty: &str, stage: u8) -> Vec<String> {
    let cat_diff = keys::queue_cat_diff(category, difficulty);
    let cat = keys::queue_cat(category);
    match stage {
        1 => vec![cat_diff],
        2 => vec![cat_diff, cat],
        _ => vec![cat_diff, cat, keys::QUEUE_ALL.to_string()],
    }
}

/// Runs the two-pass pair search described in `spec.md` §4.3, anchored
/// on one (category, difficulty) group at a given stage.
pub struct PairSearch<'a> {
    pub store: &'a dyn Store,
}

impl<'a> PairSearch<'a> {
    pub async fn find_pair(
        &self,
        category: &str,
        difficulty: &str,
        stage: u8,
        ratings: &HashMap<String, f64>,
    ) -> Result<Option<(String, String)>> {
        for queue_key in candidate_queues(category, difficulty, stage) {
            let members = self
                .store
                .sorted_set_range_by_index(&queue_key, 0, CANDIDATES_PER_QUEUE - 1)
                .await?;
            if let Some(pair) = self.scan(&members, stage, ratings, false).await? {
                return Ok(Some(pair));
            }
            if let Some(pair) = self.scan(&members, stage, ratings, true).await? {
                tracing::info!(queue = %queue_key, "fallback pass re-matched recent partners");
                return Ok(Some(pair));
            }
        }
        Ok(None)
    }

    async fn scan(
        &self,
        members: &[String],
        stage: u8,
        ratings: &HashMap<String, f64>,
        allow_recent: bool,
    ) -> Result<Option<(String, String)>> {
        for i in 0..members.len() {
            for j in (i + 1)..members.len() {
                let (a, b) = (&members[i], &members[j]);
                let ra = *ratings.get(a).unwrap_or(&1500.0);
                let rb = *ratings.get(b).unwrap_or(&1500.0);
                if !rating_compatible(ra, rb, stage) {
                    continue;
                }
                if !allow_recent && has_recent_match(self.store, a, b).await? {
                    continue;
                }
                return Ok(Some((a.clone(), b.clone())));
            }
        }
        Ok(None)
    }
}

/// Category/difficulty of the confirmed pairing (`spec.md` §4.3
/// "PendingMatch creation"). `stage` is the stage the pair was found
/// at, not either user's individual stage.
pub fn resolve_category_difficulty(
    stage: u8,
    u1: &QueueEntry,
    u2: &QueueEntry,
) -> (String, Difficulty) {
    match stage {
        1 => (u1.category.clone(), u1.difficulty),
        2 => (u1.category.clone(), Difficulty::average(u1.difficulty, u2.difficulty)),
        _ => {
            let category = if rand::random::<bool>() {
                u1.category.clone()
            } else {
                u2.category.clone()
            };
            (category, Difficulty::average(u1.difficulty, u2.difficulty))
        }
    }
}
