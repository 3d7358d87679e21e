//! Pub/sub dispatch target — the `nsq` job type's delivery mechanism.
//!
//! The concrete broker (NSQ in the original) sits behind a narrow `Publisher` interface; this
//! repo's only implementation adapts the store gateway's own `publish`, since standing up a real
//! NSQ client is out of scope for the scheduling engine (§1).

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::error::{DcronError, DcronResult};
use crate::store::StoreGateway;

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, message_json: &str) -> DcronResult<()>;
}

pub struct PubsubDispatcher<S: StoreGateway> {
    store: Arc<S>,
}

impl<S: StoreGateway> PubsubDispatcher<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: StoreGateway> Publisher for PubsubDispatcher<S> {
    /// Validates `message_json` decodes to a JSON object, then re-encodes it before publishing
    /// (normalizing key order), matching `internal/nsqtarget/nsq.go`'s unmarshal-then-marshal
    /// round trip.
    async fn publish(&self, topic: &str, message_json: &str) -> DcronResult<()> {
        let value: Value =
            serde_json::from_str(message_json).map_err(|_| DcronError::NsqMessageNotJson)?;
        if !value.is_object() {
            return Err(DcronError::NsqMessageNotJson);
        }
        let normalized = serde_json::to_string(&value).map_err(|_| DcronError::NsqMessageNotJson)?;
        self.store.publish(topic, &normalized).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn rejects_non_json_message() {
        let dispatcher = PubsubDispatcher::new(Arc::new(MemoryStore::new()));
        let err = dispatcher.publish("topic", "not json").await.unwrap_err();
        assert!(matches!(err, DcronError::NsqMessageNotJson));
    }

    #[tokio::test]
    async fn rejects_non_object_json() {
        let dispatcher = PubsubDispatcher::new(Arc::new(MemoryStore::new()));
        let err = dispatcher.publish("topic", "[1,2,3]").await.unwrap_err();
        assert!(matches!(err, DcronError::NsqMessageNotJson));
    }

    #[tokio::test]
    async fn publishes_valid_object() {
        let store = Arc::new(MemoryStore::new());
        let mut rx = store.subscribe("topic");
        let dispatcher = PubsubDispatcher::new(Arc::clone(&store));
        dispatcher
            .publish("topic", r#"{"game_name":"BBLT"}"#)
            .await
            .unwrap();
        let received = rx.recv().await.unwrap();
        assert!(received.contains("BBLT"));
    }
}
