//! Firing Pipeline — what happens the instant the wheel calls back into a job.
//!
//! Mirrors `TaskPayload.Run` in `internal/cronjob/taskPayload.go`: decide late/in-window/expired
//! for one-shots, acquire the appropriate per-fire lock, dispatch by job type, then either clean
//! up (one-shot) or record fresh `prev`/`next` markers (recurring).

use std::sync::{Arc, OnceLock, Weak};

use async_trait::async_trait;
use chrono::Utc;
use chrono_tz::Tz;

use crate::dispatch::http::HttpDispatcher;
use crate::dispatch::pubsub::Publisher;
use crate::job::{Job, JobType, is_memo_once, should_execute_three_hours};
use crate::registry::{JobRegistry, once_lock_key};
use crate::store::StoreGateway;
use crate::wheel::{Firer, Wheel};

pub struct FiringPipeline<S: StoreGateway> {
    registry: Arc<JobRegistry<S>>,
    http: Arc<HttpDispatcher>,
    pubsub: Arc<dyn Publisher>,
    tz: Tz,
    wheel: OnceLock<Weak<Wheel>>,
}

impl<S: StoreGateway> FiringPipeline<S> {
    pub fn new(
        registry: Arc<JobRegistry<S>>,
        http: Arc<HttpDispatcher>,
        pubsub: Arc<dyn Publisher>,
        tz: Tz,
    ) -> Self {
        Self {
            registry,
            http,
            pubsub,
            tz,
            wheel: OnceLock::new(),
        }
    }

    /// Wires this pipeline back to the wheel it fires for — needed to detach one-shot entries
    /// after they complete. Call once, immediately after constructing both.
    pub fn attach_wheel(&self, wheel: &Arc<Wheel>) {
        let _ = self.wheel.set(Arc::downgrade(wheel));
    }

    fn wheel(&self) -> Option<Arc<Wheel>> {
        self.wheel.get()?.upgrade()
    }

    async fn cleanup_once(&self, job: &Job) {
        if let Err(e) = self
            .registry
            .delete_job(&job.group_name, &job.name, &job.job_id)
            .await
        {
            tracing::warn!(job_id = %job.job_id, error = %e, "failed to clean up one-shot job keys");
        }
        if let Some(wheel) = self.wheel() {
            wheel.remove(&job.job_id);
        }
    }

    async fn dispatch(&self, job: &Job) {
        match job.job_type {
            JobType::Http => {
                let max_count = if job.retry { 3 } else { 1 };
                match self.http.dispatch(&job.request_url, max_count).await {
                    Some(200) => {}
                    Some(status) => {
                        tracing::error!(job_id = %job.job_id, url = %job.request_url, status, "http dispatch returned non-2xx");
                    }
                    None => {
                        tracing::error!(job_id = %job.job_id, url = %job.request_url, "http dispatch failed");
                    }
                }
            }
            JobType::Nsq => {
                if let Err(e) = self.pubsub.publish(&job.nsq_topic, &job.nsq_message).await {
                    tracing::error!(job_id = %job.job_id, topic = %job.nsq_topic, error = %e, "nsq dispatch failed");
                }
            }
            JobType::Test => {
                let key = format!("TestCheck_{}", job.name);
                if let Err(e) = self.registry.store().set(&key, "test_ok", 20).await {
                    tracing::error!(job_id = %job.job_id, error = %e, "test dispatch failed to record check key");
                }
            }
        }
    }

    async fn record_recurring_times(&self, job: &Job) {
        let Some(wheel) = self.wheel() else { return };
        let Some(timing) = wheel.entry(&job.job_id) else {
            return;
        };
        let prev = timing.prev.unwrap_or(job.prev);
        let next = timing.next.unwrap_or(job.next);
        if let Err(e) = self
            .registry
            .record_fire_times(&job.group_name, &job.job_id, prev, next)
            .await
        {
            tracing::debug!(job_id = %job.job_id, error = %e, "best-effort prev/next marker update failed");
        }
    }
}

#[async_trait]
impl<S: StoreGateway> Firer for FiringPipeline<S> {
    async fn fire(&self, job: Job) {
        let now = Utc::now();
        let is_once = is_memo_once(&job.memo);

        if is_once {
            let within_window = job.exec_right_now || should_execute_three_hours(&job.memo, now);
            if !within_window {
                tracing::debug!(job_id = %job.job_id, "one-shot job arrived past its late-arrival window; expiring");
                self.cleanup_once(&job).await;
                return;
            }

            match self.registry.store().set_if_absent(
                &once_lock_key(&job.job_id),
                "1",
                crate::registry::ONCE_LOCK_TTL_SECS,
            ).await {
                Ok(true) => {}
                _ => return,
            }

            self.dispatch(&job).await;
            self.cleanup_once(&job).await;
        } else {
            let fire_lock = crate::registry::fire_lock_key(&job.job_id, now.timestamp());
            match self
                .registry
                .store()
                .set_if_absent(&fire_lock, "1", crate::registry::FIRE_LOCK_TTL_SECS)
                .await
            {
                Ok(true) => {}
                _ => return,
            }

            self.dispatch(&job).await;
            self.record_recurring_times(&job).await;
        }
    }
}

/// Fixed scheduling time zone: every cron expression and `@every` computation is evaluated here,
/// matching the original's hardcoded `Asia/Taipei` location.
pub const SCHEDULING_TZ: Tz = chrono_tz::Asia::Taipei;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::pubsub::PubsubDispatcher;
    use crate::job::JobStatus;
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_job(job_type: JobType, memo: &str) -> Job {
        let now = Utc::now();
        Job {
            job_id: "1".into(),
            group_name: "g".into(),
            name: "n".into(),
            exec_right_now: false,
            request_url: "http://127.0.0.1:1/nonexistent".into(),
            retry: false,
            interval_pattern: "* * * * * *".into(),
            job_type,
            status: JobStatus::Active as i32,
            nsq_topic: "topic".into(),
            nsq_message: r#"{"a":1}"#.into(),
            register: now,
            prev: now,
            next: now,
            memo: memo.into(),
        }
    }

    fn make_pipeline() -> (Arc<FiringPipeline<MemoryStore>>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(JobRegistry::new(Arc::clone(&store)));
        let http = Arc::new(HttpDispatcher::new());
        let pubsub = Arc::new(PubsubDispatcher::new(Arc::clone(&store)));
        (
            Arc::new(FiringPipeline::new(registry, http, pubsub, SCHEDULING_TZ)),
            store,
        )
    }

    #[tokio::test]
    async fn expired_one_shot_cleans_up_without_dispatch() {
        let (pipeline, store) = make_pipeline();
        let past_epoch = Utc::now().timestamp() - 4 * 60 * 60;
        let job = sample_job(JobType::Test, &format!("{past_epoch}@once"));
        pipeline.registry.put_job(&job).await.unwrap();

        pipeline.fire(job.clone()).await;

        assert!(pipeline.registry.get_job("g", "1").await.unwrap().is_none());
        assert!(store.get("TestCheck_n").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn in_window_one_shot_dispatches_test_type_then_cleans_up() {
        let (pipeline, store) = make_pipeline();
        let epoch = Utc::now().timestamp();
        let job = sample_job(JobType::Test, &format!("{epoch}@once"));
        pipeline.registry.put_job(&job).await.unwrap();

        pipeline.fire(job.clone()).await;

        assert_eq!(
            store.get("TestCheck_n").await.unwrap(),
            Some("test_ok".to_string())
        );
        assert!(pipeline.registry.get_job("g", "1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn recurring_fire_lock_prevents_duplicate_dispatch() {
        let (pipeline, store) = make_pipeline();
        let job = sample_job(JobType::Test, "");
        pipeline.registry.put_job(&job).await.unwrap();

        pipeline.fire(job.clone()).await;
        store.del("TestCheck_n").await.unwrap();
        pipeline.fire(job.clone()).await;

        // second fire at the same wall-clock second is locked out; key stays deleted
        assert!(store.get("TestCheck_n").await.unwrap().is_none());
    }
}
