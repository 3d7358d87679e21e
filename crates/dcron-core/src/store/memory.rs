//! In-memory fake `StoreGateway`, for the test harness and single-node/dev deployment.
//!
//! `dashmap`-backed, matching the teacher's preferred concurrent-map crate (`mofa-gateway` uses
//! the same for its capability registry). Pub/sub is a `tokio::sync::broadcast` channel per
//! channel name, lazily created on first `publish` or `subscribe`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use tokio::sync::broadcast;

use super::{StoreGateway, glob_match};
use crate::error::DcronResult;

#[derive(Clone)]
enum StoredValue {
    Str(String),
    Hash(HashMap<String, String>),
}

struct Slot {
    value: StoredValue,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_expired(&self) -> bool {
        matches!(self.expires_at, Some(t) if Instant::now() >= t)
    }
}

fn ttl_to_deadline(ttl_secs: i64) -> Option<Instant> {
    if ttl_secs > 0 {
        Some(Instant::now() + Duration::from_secs(ttl_secs as u64))
    } else {
        None
    }
}

pub struct MemoryStore {
    data: DashMap<String, Slot>,
    channels: DashMap<String, broadcast::Sender<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
            channels: DashMap::new(),
        }
    }

    fn channel(&self, name: &str) -> broadcast::Sender<String> {
        self.channels
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(256).0)
            .clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreGateway for MemoryStore {
    async fn get(&self, key: &str) -> DcronResult<Option<String>> {
        match self.data.get(key) {
            Some(slot) if !slot.is_expired() => match &slot.value {
                StoredValue::Str(s) => Ok(Some(s.clone())),
                StoredValue::Hash(_) => Ok(None),
            },
            _ => Ok(None),
        }
    }

    async fn set(&self, key: &str, val: &str, ttl_secs: i64) -> DcronResult<()> {
        self.data.insert(
            key.to_string(),
            Slot {
                value: StoredValue::Str(val.to_string()),
                expires_at: ttl_to_deadline(ttl_secs),
            },
        );
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, val: &str, ttl_secs: i64) -> DcronResult<bool> {
        let new_slot = Slot {
            value: StoredValue::Str(val.to_string()),
            expires_at: ttl_to_deadline(ttl_secs),
        };
        match self.data.entry(key.to_string()) {
            MapEntry::Occupied(mut o) => {
                if o.get().is_expired() {
                    o.insert(new_slot);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            MapEntry::Vacant(v) => {
                v.insert(new_slot);
                Ok(true)
            }
        }
    }

    async fn del(&self, key: &str) -> DcronResult<()> {
        self.data.remove(key);
        Ok(())
    }

    async fn del_batch(&self, keys: &[String]) -> DcronResult<()> {
        for key in keys {
            self.data.remove(key);
        }
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> DcronResult<Option<String>> {
        match self.data.get(key) {
            Some(slot) if !slot.is_expired() => match &slot.value {
                StoredValue::Hash(h) => Ok(h.get(field).cloned()),
                StoredValue::Str(_) => Ok(None),
            },
            _ => Ok(None),
        }
    }

    async fn hash_get_all(&self, key: &str) -> DcronResult<HashMap<String, String>> {
        match self.data.get(key) {
            Some(slot) if !slot.is_expired() => match &slot.value {
                StoredValue::Hash(h) => Ok(h.clone()),
                StoredValue::Str(_) => Ok(HashMap::new()),
            },
            _ => Ok(HashMap::new()),
        }
    }

    async fn hash_set(
        &self,
        key: &str,
        fields: &HashMap<String, String>,
        ttl_secs: i64,
    ) -> DcronResult<()> {
        let mut entry = self.data.entry(key.to_string()).or_insert_with(|| Slot {
            value: StoredValue::Hash(HashMap::new()),
            expires_at: None,
        });
        if let StoredValue::Hash(h) = &mut entry.value {
            for (k, v) in fields {
                h.insert(k.clone(), v.clone());
            }
        } else {
            entry.value = StoredValue::Hash(fields.clone());
        }
        if ttl_secs > 0 {
            entry.expires_at = ttl_to_deadline(ttl_secs);
        }
        Ok(())
    }

    async fn hash_del(&self, key: &str, field: &str) -> DcronResult<()> {
        if let Some(mut slot) = self.data.get_mut(key) {
            if let StoredValue::Hash(h) = &mut slot.value {
                h.remove(field);
            }
        }
        Ok(())
    }

    async fn scan(&self, pattern: &str) -> DcronResult<Vec<String>> {
        Ok(self
            .data
            .iter()
            .filter(|e| !e.value().is_expired() && glob_match(pattern, e.key()))
            .map(|e| e.key().clone())
            .collect())
    }

    async fn expire(&self, key: &str, ttl_secs: i64) -> DcronResult<()> {
        if let Some(mut slot) = self.data.get_mut(key) {
            slot.expires_at = ttl_to_deadline(ttl_secs);
        }
        Ok(())
    }

    async fn ttl(&self, key: &str) -> DcronResult<i64> {
        match self.data.get(key) {
            Some(slot) => match slot.expires_at {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    Ok(remaining.as_secs() as i64)
                }
                None => Ok(-1),
            },
            None => Ok(-2),
        }
    }

    async fn publish(&self, channel: &str, message: &str) -> DcronResult<()> {
        let _ = self.channel(channel).send(message.to_string());
        Ok(())
    }

    fn subscribe(&self, channel: &str) -> broadcast::Receiver<String> {
        self.channel(channel).subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_if_absent_is_exclusive() {
        let store = MemoryStore::new();
        assert!(store.set_if_absent("k", "1", 0).await.unwrap());
        assert!(!store.set_if_absent("k", "2", 0).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some("1".to_string()));
    }

    #[tokio::test]
    async fn expired_key_can_be_reacquired() {
        let store = MemoryStore::new();
        assert!(store.set_if_absent("k", "1", 1).await.unwrap());
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(store.set_if_absent("k", "2", 0).await.unwrap());
    }

    #[tokio::test]
    async fn hash_roundtrip() {
        let store = MemoryStore::new();
        let mut fields = HashMap::new();
        fields.insert("a".to_string(), "1".to_string());
        store.hash_set("h", &fields, 0).await.unwrap();
        assert_eq!(store.hash_get("h", "a").await.unwrap(), Some("1".into()));
        store.hash_del("h", "a").await.unwrap();
        assert_eq!(store.hash_get("h", "a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn pubsub_delivers_to_subscriber() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe("chan");
        store.publish("chan", "hello").await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), "hello");
    }
}
