//! End-to-end scenarios from the scheduling engine's design spec (§8), driven entirely against
//! `MemoryStore` plus the store-backed `Publisher` — no real network egress.

use std::sync::Arc;

use dcron_core::dispatch::{HttpDispatcher, PubsubDispatcher};
use dcron_core::store::MemoryStore;
use dcron_core::{ControlPlane, FiringPipeline, Job, JobRegistry, JobStatus, Snowflake, TaskPayloadReq, Wheel};

const TZ: chrono_tz::Tz = chrono_tz::Asia::Taipei;

struct NullFirer;

#[async_trait::async_trait]
impl dcron_core::Firer for NullFirer {
    async fn fire(&self, _job: Job) {}
}

struct Harness {
    registry: Arc<JobRegistry<MemoryStore>>,
    control: Arc<ControlPlane<MemoryStore>>,
    store: Arc<MemoryStore>,
}

fn build() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(JobRegistry::new(Arc::clone(&store)));
    let wheel = Arc::new(Wheel::new(TZ, Arc::new(NullFirer)));
    let http = Arc::new(HttpDispatcher::new());
    let pubsub = Arc::new(PubsubDispatcher::new(Arc::clone(&store)));
    let pipeline = Arc::new(FiringPipeline::new(Arc::clone(&registry), http, pubsub, TZ));
    pipeline.attach_wheel(&wheel);
    let ids = Arc::new(Snowflake::new());
    let control = Arc::new(ControlPlane::new(
        Arc::clone(&registry),
        wheel,
        pipeline,
        ids,
        TZ,
    ));
    Harness {
        registry,
        control,
        store,
    }
}

fn http_req(group: &str, name: &str, pattern: &str) -> TaskPayloadReq {
    TaskPayloadReq {
        group_name: group.into(),
        name: name.into(),
        exec_right_now: false,
        request_url: "http://t/ok".into(),
        retry: false,
        interval_pattern: pattern.into(),
        job_type: "http".into(),
        nsq_topic: String::new(),
        nsq_message: String::new(),
    }
}

fn test_req(group: &str, name: &str, pattern: &str) -> TaskPayloadReq {
    TaskPayloadReq {
        group_name: group.into(),
        name: name.into(),
        exec_right_now: false,
        request_url: String::new(),
        retry: false,
        interval_pattern: pattern.into(),
        job_type: "test".into(),
        nsq_topic: String::new(),
        nsq_message: String::new(),
    }
}

#[tokio::test]
async fn scenario_1_recurring_add() {
    let h = build();
    let job = h.control.add(http_req("g", "n", "*/5 * * * * *")).await.unwrap();

    assert_eq!(h.control.wheel().entries().len(), 1);
    assert!(h.registry.get_job("g", &job.job_id).await.unwrap().is_some());
    assert_eq!(
        h.store.get(&dcron_core_key::registration_lock("g", "n")).await.unwrap(),
        Some("1".to_string())
    );
}

#[tokio::test]
async fn scenario_2_duplicate_registration_is_rejected() {
    let h = build();
    h.control.add(http_req("g", "n", "*/5 * * * * *")).await.unwrap();
    let jobs_before = h.registry.list_jobs_in_group("g").await.unwrap().len();

    let err = h
        .control
        .add(http_req("g", "n", "*/10 * * * * *"))
        .await
        .unwrap_err();

    assert!(matches!(err, dcron_core::DcronError::AlreadyRegistered));
    assert_eq!(h.registry.list_jobs_in_group("g").await.unwrap().len(), jobs_before);
}

#[tokio::test]
async fn scenario_3_one_shot_in_window_fires_and_cleans_up() {
    let h = build();
    let epoch = chrono::Utc::now().timestamp() - 60;
    let job = h
        .control
        .add(test_req("g", "n", &epoch.to_string()))
        .await
        .unwrap();

    // exec_right_now / in-window one-shots dispatch on a spawned task; give it a beat to run.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert_eq!(
        h.store.get("TestCheck_n").await.unwrap(),
        Some("test_ok".to_string())
    );
    assert!(h.registry.get_job("g", &job.job_id).await.unwrap().is_none());
    assert!(
        h.store
            .get(&dcron_core_key::registration_lock("g", "n"))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn scenario_4_one_shot_out_of_window_is_silently_expired() {
    let h = build();
    let epoch = chrono::Utc::now().timestamp() - 4 * 60 * 60;
    let job = h
        .control
        .add(test_req("g", "n", &epoch.to_string()))
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert!(h.store.get("TestCheck_n").await.unwrap().is_none());
    assert!(h.registry.get_job("g", &job.job_id).await.unwrap().is_none());
}

#[tokio::test]
async fn scenario_5_pause_then_resume() {
    let h = build();
    let job = h.control.add(http_req("g", "n", "0 * * * * *")).await.unwrap();
    assert!(h.control.wheel().contains(&job.job_id));

    h.control.pause(&job.group_name, &job.job_id).await.unwrap();
    assert!(!h.control.wheel().contains(&job.job_id));
    let paused = h.registry.get_job("g", &job.job_id).await.unwrap().unwrap();
    assert_eq!(paused.status, JobStatus::Paused as i32);

    h.control.active(&job.group_name, &job.job_id).await.unwrap();
    assert!(h.control.wheel().contains(&job.job_id));
    let active = h.registry.get_job("g", &job.job_id).await.unwrap().unwrap();
    assert_eq!(active.status, JobStatus::Active as i32);
}

#[tokio::test]
async fn scenario_6_replace_binds_a_new_job_id() {
    let h = build();
    let first = h.control.add(http_req("g", "n", "*/5 * * * * *")).await.unwrap();

    let second = h
        .control
        .replace(http_req("g", "n", "*/10 * * * * *"))
        .await
        .unwrap();

    assert_ne!(first.job_id, second.job_id);
    assert_eq!(h.control.wheel().entries().len(), 1);
    assert!(h.registry.get_job("g", &first.job_id).await.unwrap().is_none());
    assert!(h.registry.get_job("g", &second.job_id).await.unwrap().is_some());
}

/// Recreates the registry's private key-naming scheme for assertions that need to look directly
/// at the store instead of going through `JobRegistry`'s typed accessors.
mod dcron_core_key {
    pub fn registration_lock(group: &str, name: &str) -> String {
        format!("CK_{group}_{name}")
    }
}
