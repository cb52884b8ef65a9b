//! The 30s grace timer between a participant leaving and the session
//! being torn down (`spec.md` §4.4 "Join/leave", §9 race-mitigation
//! note): a rejoin before the timer fires must win the race.
//!
//! No `tokio-util::CancellationToken` in this workspace's dependency
//! stack, so cancellation is a plain generation counter: `start` bumps
//! it and hands the new value to the caller's sleeping task, which only
//! proceeds if `is_current` still finds it on wake.

use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct GraceTimers {
    generations: Mutex<HashMap<String, u64>>,
}

impl GraceTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) the grace period for `match_id`, returning
    /// the generation the caller's timer task must still see current
    /// once it wakes.
    pub fn start(&self, match_id: &str) -> u64 {
        let mut generations = self.generations.lock().unwrap_or_else(|e| e.into_inner());
        let entry = generations.entry(match_id.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Invalidate any in-flight timer for `match_id`, e.g. on rejoin.
    pub fn cancel(&self, match_id: &str) {
        let mut generations = self.generations.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = generations.get_mut(match_id) {
            *entry += 1;
        }
    }

    /// Whether `generation` is still the newest value recorded for
    /// `match_id` — false if `start`/`cancel` ran again since.
    pub fn is_current(&self, match_id: &str, generation: u64) -> bool {
        let generations = self.generations.lock().unwrap_or_else(|e| e.into_inner());
        generations.get(match_id).copied() == Some(generation)
    }
}
