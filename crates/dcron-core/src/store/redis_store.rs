//! Redis-backed `StoreGateway` — the production implementation multiple scheduler replicas
//! share. Mirrors `internal/redisCacher/redis.go`'s operation set one-to-one.

use std::collections::HashMap;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::broadcast;

use super::StoreGateway;
use crate::error::{DcronError, DcronResult};

fn store_err(e: redis::RedisError) -> DcronError {
    DcronError::Store(e.to_string())
}

pub struct RedisStore {
    conn: ConnectionManager,
    client: redis::Client,
}

impl RedisStore {
    pub async fn connect(addr: &str) -> DcronResult<Self> {
        let client = redis::Client::open(addr).map_err(store_err)?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(store_err)?;
        Ok(Self { conn, client })
    }
}

#[async_trait]
impl StoreGateway for RedisStore {
    async fn get(&self, key: &str) -> DcronResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(store_err)
    }

    async fn set(&self, key: &str, val: &str, ttl_secs: i64) -> DcronResult<()> {
        let mut conn = self.conn.clone();
        if ttl_secs > 0 {
            conn.set_ex::<_, _, ()>(key, val, ttl_secs as u64)
                .await
                .map_err(store_err)
        } else {
            conn.set::<_, _, ()>(key, val).await.map_err(store_err)
        }
    }

    async fn set_if_absent(&self, key: &str, val: &str, ttl_secs: i64) -> DcronResult<bool> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(val).arg("NX");
        if ttl_secs > 0 {
            cmd.arg("EX").arg(ttl_secs);
        }
        let result: Option<String> = cmd.query_async(&mut conn).await.map_err(store_err)?;
        Ok(result.is_some())
    }

    async fn del(&self, key: &str) -> DcronResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await.map_err(store_err)
    }

    async fn del_batch(&self, keys: &[String]) -> DcronResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(keys).await.map_err(store_err)
    }

    async fn hash_get(&self, key: &str, field: &str) -> DcronResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.hget(key, field).await.map_err(store_err)
    }

    async fn hash_get_all(&self, key: &str) -> DcronResult<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        conn.hgetall(key).await.map_err(store_err)
    }

    async fn hash_set(
        &self,
        key: &str,
        fields: &HashMap<String, String>,
        ttl_secs: i64,
    ) -> DcronResult<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let pairs: Vec<(&String, &String)> = fields.iter().collect();
        conn.hset_multiple::<_, _, _, ()>(key, &pairs)
            .await
            .map_err(store_err)?;
        if ttl_secs > 0 {
            conn.expire::<_, ()>(key, ttl_secs).await.map_err(store_err)?;
        }
        Ok(())
    }

    async fn hash_del(&self, key: &str, field: &str) -> DcronResult<()> {
        let mut conn = self.conn.clone();
        conn.hdel::<_, _, ()>(key, field).await.map_err(store_err)
    }

    async fn scan(&self, pattern: &str) -> DcronResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut out = Vec::new();
        loop {
            let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(1000)
                .query_async(&mut conn)
                .await
                .map_err(store_err)?;
            out.extend(batch);
            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }
        Ok(out)
    }

    async fn expire(&self, key: &str, ttl_secs: i64) -> DcronResult<()> {
        let mut conn = self.conn.clone();
        conn.expire::<_, ()>(key, ttl_secs).await.map_err(store_err)
    }

    async fn ttl(&self, key: &str) -> DcronResult<i64> {
        let mut conn = self.conn.clone();
        conn.ttl(key).await.map_err(store_err)
    }

    async fn publish(&self, channel: &str, message: &str) -> DcronResult<()> {
        let mut conn = self.conn.clone();
        conn.publish::<_, _, ()>(channel, message)
            .await
            .map_err(store_err)
    }

    fn subscribe(&self, channel: &str) -> broadcast::Receiver<String> {
        use futures_util::StreamExt;

        let (tx, rx) = broadcast::channel(256);
        let client = self.client.clone();
        let channel = channel.to_string();
        // A dedicated connection per subscriber, forwarding onto the shared broadcast channel —
        // the original spawns one goroutine per subscription for the same reason.
        tokio::spawn(async move {
            let Ok(mut pubsub) = client.get_async_pubsub().await else {
                return;
            };
            if pubsub.subscribe(&channel).await.is_err() {
                return;
            }
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let Ok(payload) = msg.get_payload::<String>() else {
                    continue;
                };
                if tx.send(payload).is_err() {
                    break;
                }
            }
        });
        rx
    }
}
