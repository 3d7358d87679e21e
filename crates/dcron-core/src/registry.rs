//! Job Registry — the key layout and field encoding the whole service agrees on, regardless of
//! which `StoreGateway` backs it.
//!
//! Key layout (mirrors `internal/ctl/cache.go`):
//!   `TEAM_<group>`              hash: job name -> job id
//!   `TASK_<group>_<jobID>`      hash: the full job record
//!   `TIME_<group>_<jobID>`      hash: `prev`/`next`, refreshed on every fire, TTL ~2 days
//!   `CK_<group>_<name>`         registration lock, no TTL
//!   `LOCK_ONCE_<jobID>`         one-shot fire lock, TTL 30s
//!   `LOCK_<jobID>_<unixSec>`    recurring per-fire lock, TTL 5s

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use crate::error::{DcronError, DcronResult};
use crate::job::{Job, JobStatus, JobType, match_job_name};
use crate::store::StoreGateway;

pub const TIME_TTL_SECS: i64 = 2 * 24 * 60 * 60;
pub const ONCE_LOCK_TTL_SECS: i64 = 30;
pub const FIRE_LOCK_TTL_SECS: i64 = 5;

pub fn team_key(group: &str) -> String {
    format!("TEAM_{group}")
}

pub fn task_key(group: &str, job_id: &str) -> String {
    format!("TASK_{group}_{job_id}")
}

pub fn time_key(group: &str, job_id: &str) -> String {
    format!("TIME_{group}_{job_id}")
}

pub fn registration_lock_key(group: &str, name: &str) -> String {
    format!("CK_{group}_{name}")
}

pub fn once_lock_key(job_id: &str) -> String {
    format!("LOCK_ONCE_{job_id}")
}

pub fn fire_lock_key(job_id: &str, unix_sec: i64) -> String {
    format!("LOCK_{job_id}_{unix_sec}")
}

fn encode_job(job: &Job) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    fields.insert("job_id".into(), job.job_id.clone());
    fields.insert("group_name".into(), job.group_name.clone());
    fields.insert("name".into(), job.name.clone());
    fields.insert("exec_right_now".into(), job.exec_right_now.to_string());
    fields.insert("request_url".into(), job.request_url.clone());
    fields.insert("retry".into(), job.retry.to_string());
    fields.insert("interval_pattern".into(), job.interval_pattern.clone());
    fields.insert("type".into(), job.job_type.as_str().to_string());
    fields.insert("status".into(), job.status.to_string());
    fields.insert("nsq_topic".into(), job.nsq_topic.clone());
    fields.insert("nsq_message".into(), job.nsq_message.clone());
    fields.insert("register".into(), job.register.to_rfc3339());
    fields.insert("prev".into(), job.prev.to_rfc3339());
    fields.insert("next".into(), job.next.to_rfc3339());
    fields.insert("memo".into(), job.memo.clone());
    fields
}

fn parse_time(fields: &HashMap<String, String>, key: &str) -> DateTime<Utc> {
    fields
        .get(key)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.timestamp_opt(0, 0).single().unwrap())
}

/// Tolerantly decodes a job hash: unparseable numeric/bool fields fall back to their zero value,
/// matching the original's `strconv` error handling in `MapTaskPayload`.
fn decode_job(fields: &HashMap<String, String>) -> Option<Job> {
    let job_id = fields.get("job_id")?.clone();
    if job_id.is_empty() {
        return None;
    }
    Some(Job {
        job_id,
        group_name: fields.get("group_name").cloned().unwrap_or_default(),
        name: fields.get("name").cloned().unwrap_or_default(),
        exec_right_now: fields
            .get("exec_right_now")
            .and_then(|s| s.parse().ok())
            .unwrap_or(false),
        request_url: fields.get("request_url").cloned().unwrap_or_default(),
        retry: fields.get("retry").and_then(|s| s.parse().ok()).unwrap_or(false),
        interval_pattern: fields.get("interval_pattern").cloned().unwrap_or_default(),
        job_type: fields
            .get("type")
            .and_then(|s| JobType::parse(s))
            .unwrap_or(JobType::Http),
        status: fields
            .get("status")
            .and_then(|s| s.parse().ok())
            .unwrap_or(JobStatus::Paused as i32),
        nsq_topic: fields.get("nsq_topic").cloned().unwrap_or_default(),
        nsq_message: fields.get("nsq_message").cloned().unwrap_or_default(),
        register: parse_time(fields, "register"),
        prev: parse_time(fields, "prev"),
        next: parse_time(fields, "next"),
        memo: fields.get("memo").cloned().unwrap_or_default(),
    })
}

pub struct JobRegistry<S: StoreGateway> {
    store: Arc<S>,
}

impl<S: StoreGateway> JobRegistry<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Claims the `(group, name)` registration lock. Returns `Ok(false)` if already held.
    pub async fn acquire_registration(&self, group: &str, name: &str) -> DcronResult<bool> {
        self.store
            .set_if_absent(&registration_lock_key(group, name), "1", 0)
            .await
    }

    pub async fn release_registration(&self, group: &str, name: &str) -> DcronResult<()> {
        self.store.del(&registration_lock_key(group, name)).await
    }

    pub async fn put_job(&self, job: &Job) -> DcronResult<()> {
        let mut team_fields = HashMap::new();
        team_fields.insert(job.name.clone(), job.job_id.clone());
        self.store
            .hash_set(&team_key(&job.group_name), &team_fields, 0)
            .await?;
        self.store
            .hash_set(&task_key(&job.group_name, &job.job_id), &encode_job(job), 0)
            .await
    }

    pub async fn update_status(&self, group: &str, job_id: &str, status: JobStatus) -> DcronResult<()> {
        let mut fields = HashMap::new();
        fields.insert("status".into(), (status as i32).to_string());
        self.store.hash_set(&task_key(group, job_id), &fields, 0).await
    }

    pub async fn record_fire_times(
        &self,
        group: &str,
        job_id: &str,
        prev: DateTime<Utc>,
        next: DateTime<Utc>,
    ) -> DcronResult<()> {
        let mut fields = HashMap::new();
        fields.insert("prev".into(), prev.to_rfc3339());
        fields.insert("next".into(), next.to_rfc3339());
        self.store
            .hash_set(&time_key(group, job_id), &fields, TIME_TTL_SECS)
            .await
    }

    /// Reads a job's record, overlaying `next`/`prev` from the side `TIME_*` hash when present
    /// (the wheel is the source of truth for `next` while a replica is live).
    pub async fn get_job(&self, group: &str, job_id: &str) -> DcronResult<Option<Job>> {
        let fields = self.store.hash_get_all(&task_key(group, job_id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        let mut job = match decode_job(&fields) {
            Some(j) => j,
            None => return Ok(None),
        };
        let time_fields = self.store.hash_get_all(&time_key(group, job_id)).await?;
        if let Some(v) = time_fields.get("prev") {
            if let Ok(dt) = DateTime::parse_from_rfc3339(v) {
                job.prev = dt.with_timezone(&Utc);
            }
        }
        if let Some(v) = time_fields.get("next") {
            if let Ok(dt) = DateTime::parse_from_rfc3339(v) {
                job.next = dt.with_timezone(&Utc);
            }
        }
        Ok(Some(job))
    }

    pub async fn list_groups(&self) -> DcronResult<Vec<String>> {
        let keys = self.store.scan("TEAM_*").await?;
        let mut groups: Vec<String> = keys
            .into_iter()
            .filter_map(|k| k.strip_prefix("TEAM_").map(str::to_string))
            .collect();
        groups.sort();
        Ok(groups)
    }

    async fn load_many(&self, group: &str, mut job_ids: Vec<String>) -> DcronResult<Vec<Job>> {
        job_ids.sort();
        let mut out = Vec::with_capacity(job_ids.len());
        for job_id in job_ids {
            if let Some(job) = self.get_job(group, &job_id).await? {
                out.push(job);
            }
        }
        Ok(out)
    }

    pub async fn list_jobs_in_group(&self, group: &str) -> DcronResult<Vec<Job>> {
        let names_to_ids = self.store.hash_get_all(&team_key(group)).await?;
        self.load_many(group, names_to_ids.into_values().collect()).await
    }

    /// Lists jobs in `group` whose name contains `game_type_` as a matched prefix token, per the
    /// `^(<game_type>)_(.*?)$` convention the original applies against `TEAM_<group>` field names.
    pub async fn list_jobs_by_game_type(&self, group: &str, game_type: &str) -> DcronResult<Vec<Job>> {
        let names_to_ids = self.store.hash_get_all(&team_key(group)).await?;
        let ids: Vec<String> = names_to_ids
            .into_iter()
            .filter(|(name, _)| {
                let (t, _) = match_job_name(name);
                t == game_type
            })
            .map(|(_, id)| id)
            .collect();
        self.load_many(group, ids).await
    }

    pub async fn list_jobs_by_name_substring(&self, group: &str, needle: &str) -> DcronResult<Vec<Job>> {
        let names_to_ids = self.store.hash_get_all(&team_key(group)).await?;
        let ids: Vec<String> = names_to_ids
            .into_iter()
            .filter(|(name, _)| name.contains(needle))
            .map(|(_, id)| id)
            .collect();
        self.load_many(group, ids).await
    }

    pub async fn list_all_jobs(&self) -> DcronResult<Vec<Job>> {
        let keys = self.store.scan("TASK_*").await?;
        let mut out = Vec::new();
        for key in keys {
            let fields = self.store.hash_get_all(&key).await?;
            if let Some(job) = decode_job(&fields) {
                out.push(job);
            }
        }
        out.sort_by(|a, b| a.job_id.cmp(&b.job_id));
        Ok(out)
    }

    /// Deletes one job's task/time/lock records and its `TEAM_` group entry.
    pub async fn delete_job(&self, group: &str, name: &str, job_id: &str) -> DcronResult<()> {
        self.store
            .del_batch(&[
                task_key(group, job_id),
                registration_lock_key(group, name),
                time_key(group, job_id),
            ])
            .await?;
        self.store.hash_del(&team_key(group), name).await
    }

    /// Deletes every job in `group`, returning the job ids removed (for the wheel to detach).
    pub async fn delete_group(&self, group: &str) -> DcronResult<Vec<String>> {
        let names_to_ids = self.store.hash_get_all(&team_key(group)).await?;
        let mut delete_keys = Vec::new();
        let mut job_ids = Vec::new();
        for (name, job_id) in &names_to_ids {
            delete_keys.push(task_key(group, job_id));
            delete_keys.push(registration_lock_key(group, name));
            delete_keys.push(time_key(group, job_id));
            job_ids.push(job_id.clone());
        }
        delete_keys.push(team_key(group));
        self.store.del_batch(&delete_keys).await?;
        Ok(job_ids)
    }

    /// Finds the job id registered under `(group, name)`, if any — used by `replace` to locate
    /// the exact record it is about to supersede.
    pub async fn find_job_id_by_name(&self, group: &str, name: &str) -> DcronResult<Option<String>> {
        self.store.hash_get(&team_key(group), name).await
    }
}

pub fn require_group_name(group: &str) -> DcronResult<()> {
    if group.is_empty() {
        Err(DcronError::EmptyGroupName)
    } else {
        Ok(())
    }
}

pub fn require_name(name: &str) -> DcronResult<()> {
    if name.is_empty() {
        Err(DcronError::EmptyName)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn sample_job(group: &str, name: &str, job_id: &str) -> Job {
        let now = Utc::now();
        Job {
            job_id: job_id.into(),
            group_name: group.into(),
            name: name.into(),
            exec_right_now: false,
            request_url: "http://127.0.0.1/ping".into(),
            retry: false,
            interval_pattern: "0 * * * * *".into(),
            job_type: JobType::Http,
            status: JobStatus::Active as i32,
            nsq_topic: String::new(),
            nsq_message: String::new(),
            register: now,
            prev: now,
            next: now,
            memo: String::new(),
        }
    }

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let registry = JobRegistry::new(Arc::new(MemoryStore::new()));
        let job = sample_job("g", "BBLT_draw", "1");
        registry.put_job(&job).await.unwrap();
        let loaded = registry.get_job("g", "1").await.unwrap().unwrap();
        assert_eq!(loaded.name, "BBLT_draw");
        assert_eq!(loaded.job_type, JobType::Http);
    }

    #[tokio::test]
    async fn registration_lock_is_exclusive() {
        let registry = JobRegistry::new(Arc::new(MemoryStore::new()));
        assert!(registry.acquire_registration("g", "n").await.unwrap());
        assert!(!registry.acquire_registration("g", "n").await.unwrap());
        registry.release_registration("g", "n").await.unwrap();
        assert!(registry.acquire_registration("g", "n").await.unwrap());
    }

    #[tokio::test]
    async fn delete_group_removes_all_jobs() {
        let registry = JobRegistry::new(Arc::new(MemoryStore::new()));
        registry.put_job(&sample_job("g", "a", "1")).await.unwrap();
        registry.put_job(&sample_job("g", "b", "2")).await.unwrap();
        let removed = registry.delete_group("g").await.unwrap();
        assert_eq!(removed.len(), 2);
        assert!(registry.list_jobs_in_group("g").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_by_game_type_filters_on_prefix() {
        let registry = JobRegistry::new(Arc::new(MemoryStore::new()));
        registry.put_job(&sample_job("g", "BBLT_draw_014", "1")).await.unwrap();
        registry.put_job(&sample_job("g", "KENO_draw_003", "2")).await.unwrap();
        let jobs = registry.list_jobs_by_game_type("g", "BBLT").await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_id, "1");
    }
}
