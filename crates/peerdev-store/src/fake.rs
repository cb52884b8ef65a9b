use crate::{Store, Subscription, glob_match};
use async_trait::async_trait;
use peerdev_common::Result;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, mpsc};

struct Subscriber {
    exact: Vec<String>,
    pattern: Option<String>,
    tx: mpsc::UnboundedSender<(String, String)>,
}

#[derive(Default)]
struct Inner {
    strings: HashMap<String, (String, Option<Instant>)>,
    hashes: HashMap<String, Vec<(String, String)>>,
    sorted_sets: HashMap<String, Vec<(String, f64)>>,
    sets: HashMap<String, (Vec<String>, Option<Instant>)>,
    subscribers: Vec<Subscriber>,
}

/// In-memory [`Store`] double used by tests instead of a live Redis
/// instance (`SPEC_FULL.md` §4.10).
#[derive(Default)]
pub struct FakeStore {
    inner: Mutex<Inner>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn expired(expiry: &Option<Instant>) -> bool {
    expiry.is_some_and(|at| Instant::now() >= at)
}

#[async_trait]
impl Store for FakeStore {
    async fn hash_set_all(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let entry = inner.hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            if let Some(slot) = entry.iter_mut().find(|(f, _)| f == field) {
                slot.1 = value.clone();
            } else {
                entry.push((field.clone(), value.clone()));
            }
        }
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<Vec<(String, String)>> {
        let inner = self.inner.lock().await;
        Ok(inner.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner
            .strings
            .insert(key.to_string(), (value.to_string(), Some(Instant::now() + ttl)));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut inner = self.inner.lock().await;
        match inner.strings.get(key) {
            Some((_, expiry)) if expired(expiry) => {
                inner.strings.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let had_string = inner.strings.remove(key).is_some();
        let had_hash = inner.hashes.remove(key).is_some();
        let had_zset = inner.sorted_sets.remove(key).is_some();
        let had_set = inner.sets.remove(key).is_some();
        Ok(had_string || had_hash || had_zset || had_set)
    }

    async fn sorted_set_add(&self, key: &str, member: &str, score: f64) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let entry = inner.sorted_sets.entry(key.to_string()).or_default();
        if let Some(slot) = entry.iter_mut().find(|(m, _)| m == member) {
            slot.1 = score;
        } else {
            entry.push((member.to_string(), score));
        }
        Ok(())
    }

    async fn sorted_set_remove(&self, key: &str, member: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.sorted_sets.get_mut(key) {
            entry.retain(|(m, _)| m != member);
        }
        Ok(())
    }

    async fn sorted_set_range_by_index(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>> {
        let inner = self.inner.lock().await;
        let Some(entry) = inner.sorted_sets.get(key) else {
            return Ok(Vec::new());
        };
        let mut sorted = entry.clone();
        sorted.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        let len = sorted.len() as isize;
        let norm = |i: isize| -> isize {
            if i < 0 { (len + i).max(0) } else { i.min(len) }
        };
        let start = norm(start).max(0) as usize;
        let stop_inclusive = (norm(stop) + 1).clamp(0, len) as usize;
        if start >= stop_inclusive {
            return Ok(Vec::new());
        }
        Ok(sorted[start..stop_inclusive]
            .iter()
            .map(|(m, _)| m.clone())
            .collect())
    }

    async fn set_add_with_ttl(&self, key: &str, member: &str, ttl: Duration) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let entry = inner
            .sets
            .entry(key.to_string())
            .or_insert_with(|| (Vec::new(), None));
        if !entry.0.iter().any(|m| m == member) {
            entry.0.push(member.to_string());
        }
        entry.1 = Some(Instant::now() + ttl);
        Ok(())
    }

    async fn is_member(&self, key: &str, member: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        match inner.sets.get(key) {
            Some((_, expiry)) if expired(expiry) => {
                inner.sets.remove(key);
                Ok(false)
            }
            Some((members, _)) => Ok(members.iter().any(|m| m == member)),
            None => Ok(false),
        }
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>> {
        let inner = self.inner.lock().await;
        let mut keys: Vec<String> = inner
            .strings
            .keys()
            .chain(inner.hashes.keys())
            .chain(inner.sorted_sets.keys())
            .chain(inner.sets.keys())
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.subscribers.retain_mut(|sub| {
            let matches = sub.exact.iter().any(|c| c == channel)
                || sub.pattern.as_deref().is_some_and(|p| glob_match(p, channel));
            if matches {
                sub.tx.send((channel.to_string(), payload.to_string())).is_ok()
            } else {
                !sub.tx.is_closed()
            }
        });
        Ok(())
    }

    async fn subscribe(&self, channels: &[&str]) -> Result<Subscription> {
        let mut inner = self.inner.lock().await;
        let (tx, rx) = mpsc::unbounded_channel();
        inner.subscribers.push(Subscriber {
            exact: channels.iter().map(|s| s.to_string()).collect(),
            pattern: None,
            tx,
        });
        Ok(rx)
    }

    async fn pattern_subscribe(&self, pattern: &str) -> Result<Subscription> {
        let mut inner = self.inner.lock().await;
        let (tx, rx) = mpsc::unbounded_channel();
        inner.subscribers.push(Subscriber {
            exact: Vec::new(),
            pattern: Some(pattern.to_string()),
            tx,
        });
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn string_ttl_expires() {
        let store = FakeStore::new();
        store
            .set_with_ttl("k", "v", Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn sorted_set_orders_by_score() {
        let store = FakeStore::new();
        store.sorted_set_add("q", "b", 2.0).await.unwrap();
        store.sorted_set_add("q", "a", 1.0).await.unwrap();
        store.sorted_set_add("q", "c", 3.0).await.unwrap();
        let range = store.sorted_set_range_by_index("q", 0, 1).await.unwrap();
        assert_eq!(range, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn sorted_set_remove() {
        let store = FakeStore::new();
        store.sorted_set_add("q", "a", 1.0).await.unwrap();
        store.sorted_set_remove("q", "a").await.unwrap();
        let range = store.sorted_set_range_by_index("q", 0, -1).await.unwrap();
        assert!(range.is_empty());
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let store = FakeStore::new();
        assert!(!store.delete("nope").await.unwrap());
        store.set_with_ttl("k", "v", Duration::from_secs(5)).await.unwrap();
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn publish_reaches_pattern_subscriber() {
        let store = FakeStore::new();
        let mut rx = store.pattern_subscribe("user:*:message").await.unwrap();
        store.publish("user:alice:message", "hi").await.unwrap();
        let (channel, payload) = rx.recv().await.unwrap();
        assert_eq!(channel, "user:alice:message");
        assert_eq!(payload, "hi");
    }

    #[tokio::test]
    async fn publish_ignores_non_matching_channel() {
        let store = FakeStore::new();
        let mut rx = store.subscribe(&["matches"]).await.unwrap();
        store.publish("room_updates", "x").await.unwrap();
        store.publish("matches", "y").await.unwrap();
        let (channel, payload) = rx.recv().await.unwrap();
        assert_eq!(channel, "matches");
        assert_eq!(payload, "y");
    }

    #[tokio::test]
    async fn is_member_tracks_set_membership() {
        let store = FakeStore::new();
        assert!(!store.is_member("s", "a").await.unwrap());
        store.set_add_with_ttl("s", "a", Duration::from_secs(5)).await.unwrap();
        assert!(store.is_member("s", "a").await.unwrap());
    }
}
