//! Store Gateway — typed operations over the shared key/value store.
//!
//! All TTLs are seconds; `<= 0` means "no expiry" and `expire` is not called for it.
//! `set_if_absent` must be a single atomic store operation. `hash_set` followed by `expire` is
//! not required to be atomic across the two calls.

pub mod memory;
#[cfg(feature = "redis-store")]
pub mod redis_store;

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::DcronResult;

pub use memory::MemoryStore;
#[cfg(feature = "redis-store")]
pub use redis_store::RedisStore;

#[async_trait]
pub trait StoreGateway: Send + Sync {
    async fn get(&self, key: &str) -> DcronResult<Option<String>>;
    async fn set(&self, key: &str, val: &str, ttl_secs: i64) -> DcronResult<()>;
    /// Atomically sets `key` to `val` iff it does not already exist. Returns whether it was set.
    async fn set_if_absent(&self, key: &str, val: &str, ttl_secs: i64) -> DcronResult<bool>;
    async fn del(&self, key: &str) -> DcronResult<()>;
    async fn del_batch(&self, keys: &[String]) -> DcronResult<()>;
    async fn hash_get(&self, key: &str, field: &str) -> DcronResult<Option<String>>;
    async fn hash_get_all(&self, key: &str) -> DcronResult<HashMap<String, String>>;
    async fn hash_set(
        &self,
        key: &str,
        fields: &HashMap<String, String>,
        ttl_secs: i64,
    ) -> DcronResult<()>;
    async fn hash_del(&self, key: &str, field: &str) -> DcronResult<()>;
    /// Lists keys matching a glob `pattern` (`*` wildcard), unordered.
    async fn scan(&self, pattern: &str) -> DcronResult<Vec<String>>;
    async fn expire(&self, key: &str, ttl_secs: i64) -> DcronResult<()>;
    async fn ttl(&self, key: &str) -> DcronResult<i64>;
    async fn publish(&self, channel: &str, message: &str) -> DcronResult<()>;
    /// Subscribes to `channel`; returns a receiver fed by `publish` calls on the same store.
    fn subscribe(&self, channel: &str) -> broadcast::Receiver<String>;
}

/// Forwards to the boxed gateway, so a runtime-selected backend (chosen from [`crate::config`] at
/// startup rather than a compile-time generic) can still satisfy every `S: StoreGateway` bound —
/// `JobRegistry<Arc<dyn StoreGateway>>` is what `dcron-gateway` actually instantiates.
#[async_trait]
impl StoreGateway for std::sync::Arc<dyn StoreGateway> {
    async fn get(&self, key: &str) -> DcronResult<Option<String>> {
        (**self).get(key).await
    }
    async fn set(&self, key: &str, val: &str, ttl_secs: i64) -> DcronResult<()> {
        (**self).set(key, val, ttl_secs).await
    }
    async fn set_if_absent(&self, key: &str, val: &str, ttl_secs: i64) -> DcronResult<bool> {
        (**self).set_if_absent(key, val, ttl_secs).await
    }
    async fn del(&self, key: &str) -> DcronResult<()> {
        (**self).del(key).await
    }
    async fn del_batch(&self, keys: &[String]) -> DcronResult<()> {
        (**self).del_batch(keys).await
    }
    async fn hash_get(&self, key: &str, field: &str) -> DcronResult<Option<String>> {
        (**self).hash_get(key, field).await
    }
    async fn hash_get_all(&self, key: &str) -> DcronResult<HashMap<String, String>> {
        (**self).hash_get_all(key).await
    }
    async fn hash_set(
        &self,
        key: &str,
        fields: &HashMap<String, String>,
        ttl_secs: i64,
    ) -> DcronResult<()> {
        (**self).hash_set(key, fields, ttl_secs).await
    }
    async fn hash_del(&self, key: &str, field: &str) -> DcronResult<()> {
        (**self).hash_del(key, field).await
    }
    async fn scan(&self, pattern: &str) -> DcronResult<Vec<String>> {
        (**self).scan(pattern).await
    }
    async fn expire(&self, key: &str, ttl_secs: i64) -> DcronResult<()> {
        (**self).expire(key, ttl_secs).await
    }
    async fn ttl(&self, key: &str) -> DcronResult<i64> {
        (**self).ttl(key).await
    }
    async fn publish(&self, channel: &str, message: &str) -> DcronResult<()> {
        (**self).publish(channel, message).await
    }
    fn subscribe(&self, channel: &str) -> broadcast::Receiver<String> {
        (**self).subscribe(channel)
    }
}

/// Matches a glob pattern containing `*` wildcards against `key` (no other glob metacharacters).
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == key;
    }

    let mut rest = key;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            if !rest.starts_with(part) {
                return false;
            }
            rest = &rest[part.len()..];
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_prefix() {
        assert!(glob_match("TASK_*", "TASK_g_123"));
        assert!(!glob_match("TASK_*", "TEAM_g"));
    }

    #[test]
    fn glob_exact() {
        assert!(glob_match("CK_g_n", "CK_g_n"));
        assert!(!glob_match("CK_g_n", "CK_g_n2"));
    }
}
