//! Control Plane — translates API-level intent into coordinated mutations of the job registry
//! and the cron wheel. The only writer of user intent in the system (§2).
//!
//! Grounded on `handler/handler.go`'s `AddJob` and `httpserver/router-handler.go`'s
//! add/replace/delete/active/pause/start/stop handlers, collapsed from gin HTTP handlers into
//! plain async methods the `axum` routes in `dcron-gateway` call directly.

use std::sync::Arc;

use chrono::Utc;
use chrono_tz::Tz;

use crate::dispatch::http::HttpDispatcher;
use crate::error::{DcronError, DcronResult};
use crate::firing::FiringPipeline;
use crate::id::Snowflake;
use crate::job::{Job, JobStatus, JobType, TaskPayloadReq, match_job_name, should_execute_now};
use crate::registry::{JobRegistry, require_group_name, require_name};
use crate::schedule::parse_schedule;
use crate::store::StoreGateway;
use crate::wheel::Wheel;

/// Validates and normalizes an inbound registration request. Returns the cron expression to
/// store and whether `interval_pattern` encoded a one-shot epoch.
fn validate_request(req: &TaskPayloadReq, tz: Tz) -> DcronResult<(String, bool)> {
    require_group_name(&req.group_name)?;
    require_name(&req.name)?;

    if req.job_type.is_empty() {
        return Err(DcronError::EmptyType);
    }
    let job_type = JobType::parse(&req.job_type)
        .ok_or_else(|| DcronError::UnknownType(req.job_type.clone()))?;

    match job_type {
        JobType::Http => {
            if req.request_url.is_empty() {
                return Err(DcronError::EmptyUrl);
            }
            HttpDispatcher::validate_url(&req.request_url)?;
        }
        JobType::Nsq => {
            if req.nsq_topic.is_empty() {
                return Err(DcronError::EmptyNsqTopic);
            }
            if req.nsq_message.is_empty() {
                return Err(DcronError::EmptyNsqMessage);
            }
            let value: serde_json::Value = serde_json::from_str(&req.nsq_message)
                .map_err(|_| DcronError::NsqMessageNotJson)?;
            if !value.is_object() {
                return Err(DcronError::NsqMessageNotJson);
            }
        }
        JobType::Test => {}
    }

    let parsed = parse_schedule(&req.interval_pattern, tz)?;
    Ok((parsed.cron_expr, parsed.is_one_shot))
}

pub struct ControlPlane<S: StoreGateway> {
    registry: Arc<JobRegistry<S>>,
    wheel: Arc<Wheel>,
    pipeline: Arc<FiringPipeline<S>>,
    ids: Arc<Snowflake>,
    tz: Tz,
}

impl<S: StoreGateway> ControlPlane<S> {
    pub fn new(
        registry: Arc<JobRegistry<S>>,
        wheel: Arc<Wheel>,
        pipeline: Arc<FiringPipeline<S>>,
        ids: Arc<Snowflake>,
        tz: Tz,
    ) -> Self {
        Self {
            registry,
            wheel,
            pipeline,
            ids,
            tz,
        }
    }

    /// Registers a new job. Mirrors `handler.Server.AddJob`: validate, claim the `(group, name)`
    /// lock, normalize the schedule, persist, then either fire immediately (a past one-shot, or
    /// `exec_right_now`), schedule a narrow just-in-time delayed fire (a one-shot due within
    /// 1.3s), or add to the wheel for ordinary ticking.
    pub async fn add(&self, req: TaskPayloadReq) -> DcronResult<Job> {
        let (cron_expr, is_once) = validate_request(&req, self.tz)?;

        if !self.registry.acquire_registration(&req.group_name, &req.name).await? {
            return Err(DcronError::AlreadyRegistered);
        }

        let job_id = self.ids.next_id_string();
        let now = Utc::now();
        let memo = if is_once {
            format!("{}@once", req.interval_pattern.trim())
        } else {
            String::new()
        };

        let job = Job {
            job_id: job_id.clone(),
            group_name: req.group_name.clone(),
            name: req.name.clone(),
            exec_right_now: req.exec_right_now,
            request_url: req.request_url.clone(),
            retry: req.retry,
            interval_pattern: cron_expr,
            job_type: JobType::parse(&req.job_type).unwrap_or(JobType::Http),
            status: JobStatus::Active as i32,
            nsq_topic: req.nsq_topic.clone(),
            nsq_message: req.nsq_message.clone(),
            register: now,
            next: now,
            prev: now,
            memo,
        };

        if let Err(e) = self.registry.put_job(&job).await {
            self.registry.release_registration(&req.group_name, &req.name).await.ok();
            return Err(e);
        }

        let memo_due_now = is_once && should_execute_now(&job.memo, now);

        if !memo_due_now {
            if let Err(e) = self.wheel.add_job(job.clone()) {
                tracing::warn!(job_id = %job.job_id, error = %e, "failed to add job to wheel");
            }
        }

        if job.exec_right_now || memo_due_now {
            let pipeline = Arc::clone(&self.pipeline);
            let fire_job = job.clone();
            tokio::spawn(async move {
                crate::wheel::Firer::fire(&*pipeline, fire_job).await;
            });
        } else if is_once {
            // A one-shot due imminently might slip past the wheel's cron-second resolution
            // before its next tick computes; cover the gap with a direct delayed fire, matching
            // the original's `delay.Seconds() < 1.3` just-in-time correction.
            if let Some(epoch) = job.memo.strip_suffix("@once").and_then(|s| s.parse::<i64>().ok()) {
                let exec_at_ms = epoch * 1000 + 600;
                let delay_ms = exec_at_ms - now.timestamp_millis();
                if delay_ms > 0 && delay_ms < 1300 {
                    let pipeline = Arc::clone(&self.pipeline);
                    let fire_job = job.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(std::time::Duration::from_millis(delay_ms as u64)).await;
                        crate::wheel::Firer::fire(&*pipeline, fire_job).await;
                    });
                }
            }
        }

        Ok(job)
    }

    /// Replaces whatever job is currently registered under `(group_name, name)` with a new one.
    /// Resolution is by **exact name match** within the group (not first-substring-match).
    pub async fn replace(&self, req: TaskPayloadReq) -> DcronResult<Job> {
        if let Some(job_id) = self
            .registry
            .find_job_id_by_name(&req.group_name, &req.name)
            .await?
        {
            self.delete(&req.group_name, &req.name, &job_id).await?;
        }
        self.add(req).await
    }

    pub async fn delete(&self, group: &str, name: &str, job_id: &str) -> DcronResult<()> {
        self.wheel.remove(job_id);
        self.registry.delete_job(group, name, job_id).await
    }

    pub async fn delete_group(&self, group: &str) -> DcronResult<Vec<String>> {
        let job_ids = self.registry.delete_group(group).await?;
        for job_id in &job_ids {
            self.wheel.remove(job_id);
        }
        Ok(job_ids)
    }

    /// Deletes every job in `group` whose name contains `needle`.
    pub async fn delete_matching(&self, group: &str, needle: &str) -> DcronResult<Vec<String>> {
        let jobs = self.registry.list_jobs_by_name_substring(group, needle).await?;
        let mut removed = Vec::with_capacity(jobs.len());
        for job in jobs {
            self.delete(&job.group_name, &job.name, &job.job_id).await?;
            removed.push(job.job_id);
        }
        Ok(removed)
    }

    /// Moves a job to Paused and detaches its wheel entry, per `PauseJobFromSchedule`. The status
    /// write happens before the wheel is touched: if it fails, the entry is left in place rather
    /// than detached with no record of why (§3.4's "undo on status failure" requirement, mirrored
    /// for the opposite ordering).
    pub async fn pause(&self, group: &str, job_id: &str) -> DcronResult<()> {
        if !self.wheel.contains(job_id) {
            return Ok(());
        }
        self.registry.update_status(group, job_id, JobStatus::Paused).await?;
        self.wheel.remove(job_id);
        Ok(())
    }

    /// Moves a job to Active and re-adds its wheel entry if it wasn't already scheduled, per
    /// `ActiveJobFromSchedule`. If the status write fails after the wheel insertion, the
    /// insertion is undone so the wheel and registry never disagree (§3.4).
    pub async fn active(&self, group: &str, job_id: &str) -> DcronResult<()> {
        if self.wheel.contains(job_id) {
            return Ok(());
        }
        let job = self
            .registry
            .get_job(group, job_id)
            .await?
            .ok_or(DcronError::JobIdGroupNameMismatch)?;
        self.wheel.add_job(job)?;
        if let Err(e) = self.registry.update_status(group, job_id, JobStatus::Active).await {
            self.wheel.remove(job_id);
            return Err(e);
        }
        Ok(())
    }

    pub fn start(&self) {
        self.wheel.start();
    }

    pub fn stop(&self) {
        self.wheel.stop();
    }

    pub fn registry(&self) -> &Arc<JobRegistry<S>> {
        &self.registry
    }

    pub fn wheel(&self) -> &Arc<Wheel> {
        &self.wheel
    }
}

/// Extracts the `(game_type, game_num)` pair the query endpoints expose alongside each job.
pub fn describe_name(name: &str) -> (String, String) {
    match_job_name(name)
}
