use crate::{Store, Subscription, transport_err};
use async_trait::async_trait;
use futures::StreamExt;
use peerdev_common::Result;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use std::time::Duration;
use tokio::sync::mpsc;

/// [`Store`] backed by a live Redis (or Redis-compatible) server.
///
/// Grounded on the `redis` crate's async API; no moltis crate uses
/// Redis, so the connection-management shape (clone a multiplexed
/// connection per call, spawn a dedicated task per subscription) follows
/// the crate's own documented pattern rather than a teacher file.
pub struct RedisStore {
    client: redis::Client,
    conn: MultiplexedConnection,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|e| transport_err("invalid redis url", e))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| transport_err("connecting to redis", e))?;
        Ok(Self { client, conn })
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn hash_set_all(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.hset_multiple::<_, _, _, ()>(key, fields)
            .await
            .map_err(|e| transport_err("HSET", e))
    }

    async fn hash_get_all(&self, key: &str) -> Result<Vec<(String, String)>> {
        let mut conn = self.conn.clone();
        conn.hgetall(key).await.map_err(|e| transport_err("HGETALL", e))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
            .map_err(|e| transport_err("SETEX", e))
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(|e| transport_err("GET", e))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(key).await.map_err(|e| transport_err("DEL", e))?;
        Ok(removed > 0)
    }

    async fn sorted_set_add(&self, key: &str, member: &str, score: f64) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.zadd::<_, _, _, ()>(key, member, score)
            .await
            .map_err(|e| transport_err("ZADD", e))
    }

    async fn sorted_set_remove(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.zrem::<_, _, ()>(key, member)
            .await
            .map_err(|e| transport_err("ZREM", e))
    }

    async fn sorted_set_range_by_index(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        conn.zrange(key, start, stop)
            .await
            .map_err(|e| transport_err("ZRANGE", e))
    }

    async fn set_add_with_ttl(&self, key: &str, member: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.sadd::<_, _, ()>(key, member)
            .await
            .map_err(|e| transport_err("SADD", e))?;
        conn.expire::<_, ()>(key, ttl.as_secs().max(1) as i64)
            .await
            .map_err(|e| transport_err("EXPIRE", e))
    }

    async fn is_member(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        conn.sismember(key, member)
            .await
            .map_err(|e| transport_err("SISMEMBER", e))
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        conn.keys(pattern).await.map_err(|e| transport_err("KEYS", e))
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.publish::<_, _, ()>(channel, payload)
            .await
            .map_err(|e| transport_err("PUBLISH", e))
    }

    async fn subscribe(&self, channels: &[&str]) -> Result<Subscription> {
        let client = self.client.clone();
        let channels: Vec<String> = channels.iter().map(|s| s.to_string()).collect();
        let mut pubsub = client
            .get_async_pubsub()
            .await
            .map_err(|e| transport_err("opening pubsub connection", e))?;
        for channel in &channels {
            pubsub
                .subscribe(channel)
                .await
                .map_err(|e| transport_err("SUBSCRIBE", e))?;
        }
        Ok(spawn_forwarder(pubsub))
    }

    async fn pattern_subscribe(&self, pattern: &str) -> Result<Subscription> {
        let client = self.client.clone();
        let pattern = pattern.to_string();
        let mut pubsub = client
            .get_async_pubsub()
            .await
            .map_err(|e| transport_err("opening pubsub connection", e))?;
        pubsub
            .psubscribe(&pattern)
            .await
            .map_err(|e| transport_err("PSUBSCRIBE", e))?;
        Ok(spawn_forwarder(pubsub))
    }
}

fn spawn_forwarder(mut pubsub: redis::aio::PubSub) -> Subscription {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut stream = pubsub.on_message();
        while let Some(msg) = stream.next().await {
            let channel = msg.get_channel_name().to_string();
            let payload: String = match msg.get_payload() {
                Ok(p) => p,
                Err(error) => {
                    tracing::warn!(%error, "dropping non-utf8 pubsub payload");
                    continue;
                }
            };
            if tx.send((channel, payload)).is_err() {
                break;
            }
        }
    });
    rx
}
