//! Thin, typed wrapper over the shared key/value + pub/sub system
//! (`spec.md` §4.1): hashes, sorted sets, string keys with TTL, set
//! membership, and topic publish/subscribe.
//!
//! Grounded on `moltis`'s `crates/channels/src/store.rs` (an async-trait
//! storage interface over a `StoredChannel`) for the trait shape, and on
//! `examples/other_examples/.../sideseat-sideseat__server-src-data-topics-mod.rs.rs`
//! for the pluggable in-memory/Redis pub/sub backend split — no moltis
//! crate talks to a shared store directly, since moltis runs single
//! instance.

mod fake;
mod redis_store;

pub use fake::FakeStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;
use peerdev_common::{Error, Result};
use std::time::Duration;
use tokio::sync::mpsc;

/// A message delivered by a subscription: the channel it arrived on and
/// its raw payload.
pub type Message = (String, String);

/// A live subscription's receiving end. Dropping it unsubscribes.
pub type Subscription = mpsc::UnboundedReceiver<Message>;

#[async_trait]
pub trait Store: Send + Sync {
    /// Overwrite every field in hash `key`.
    async fn hash_set_all(&self, key: &str, fields: &[(String, String)]) -> Result<()>;

    /// All fields of hash `key`, empty if the key does not exist.
    async fn hash_get_all(&self, key: &str) -> Result<Vec<(String, String)>>;

    /// Set string `key` to `value`, expiring after `ttl`.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Delete `key` (of any type). Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    async fn sorted_set_add(&self, key: &str, member: &str, score: f64) -> Result<()>;

    async fn sorted_set_remove(&self, key: &str, member: &str) -> Result<()>;

    /// Members of sorted set `key` in `[start, stop]` index order
    /// (ascending score), inclusive, Redis-`ZRANGE` semantics.
    async fn sorted_set_range_by_index(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>>;

    /// Add `member` to set `key`, refreshing the whole set's TTL.
    async fn set_add_with_ttl(&self, key: &str, member: &str, ttl: Duration) -> Result<()>;

    async fn is_member(&self, key: &str, member: &str) -> Result<bool>;

    /// Keys matching a glob `pattern` (`*` wildcard only).
    async fn scan(&self, pattern: &str) -> Result<Vec<String>>;

    async fn publish(&self, channel: &str, payload: &str) -> Result<()>;

    /// Subscribe to an exact set of channels.
    async fn subscribe(&self, channels: &[&str]) -> Result<Subscription>;

    /// Subscribe to every channel matching a glob `pattern`.
    async fn pattern_subscribe(&self, pattern: &str) -> Result<Subscription>;
}

/// Glob match supporting only the `*` wildcard, which is all the patterns
/// this system ever uses (`user:*:message`).
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let mut parts = pattern.split('*').peekable();
    let first = parts.next().unwrap_or("");
    if !text.starts_with(first) {
        return false;
    }
    let mut rest = &text[first.len()..];
    let mut last_was_wildcard_boundary = true;
    while let Some(part) = parts.next() {
        if part.is_empty() {
            last_was_wildcard_boundary = true;
            continue;
        }
        if parts.peek().is_none() {
            return rest.ends_with(part) && (last_was_wildcard_boundary || rest.len() >= part.len());
        }
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
        last_was_wildcard_boundary = false;
    }
    rest.is_empty() || pattern.ends_with('*')
}

pub(crate) fn transport_err(context: &str, source: impl std::error::Error + Send + Sync + 'static) -> Error {
    Error::with_source(peerdev_common::Kind::Transport, context.to_string(), source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_exact() {
        assert!(glob_match("room_updates", "room_updates"));
        assert!(!glob_match("room_updates", "room_updatess"));
    }

    #[test]
    fn glob_wildcard_middle() {
        assert!(glob_match("user:*:message", "user:alice:message"));
        assert!(glob_match("user:*:message", "user::message"));
        assert!(!glob_match("user:*:message", "user:alice:other"));
    }

    #[test]
    fn glob_trailing_wildcard() {
        assert!(glob_match("queue:*", "queue:arrays:easy"));
        assert!(glob_match("queue:*", "queue:"));
        assert!(!glob_match("queue:*", "pending:1"));
    }
}
