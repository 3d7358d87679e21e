//! Bootstrap — rehydrates the wheel from the store's task records on process start.
//!
//! Mirrors `handler.Background` + `CronManager.ImportJobs`/`processJob`: only `Active` jobs are
//! imported; an overdue one-shot fires immediately instead of entering the wheel; an `@every` job
//! whose `next` marker is in the future waits out the remainder via a single delayed add instead
//! of firing right away.

use std::sync::Arc;

use chrono::Utc;

use crate::error::DcronResult;
use crate::firing::FiringPipeline;
use crate::job::{JobStatus, calculate_next_run_time, is_memo_once, should_execute_now};
use crate::registry::JobRegistry;
use crate::schedule::{every_duration, is_every};
use crate::store::StoreGateway;
use crate::wheel::{Firer, Wheel};

pub struct Bootstrap<S: StoreGateway> {
    registry: Arc<JobRegistry<S>>,
    wheel: Arc<Wheel>,
    pipeline: Arc<FiringPipeline<S>>,
}

impl<S: StoreGateway> Bootstrap<S> {
    pub fn new(registry: Arc<JobRegistry<S>>, wheel: Arc<Wheel>, pipeline: Arc<FiringPipeline<S>>) -> Self {
        Self {
            registry,
            wheel,
            pipeline,
        }
    }

    /// Imports every `Active` job from the registry into the wheel. Returns the count processed.
    ///
    /// Flips the wheel's readiness flag true immediately, before loading anything — matching the
    /// original's `Background` handler, which marks the process ready first and imports jobs
    /// after, so `/api/ping` doesn't stay unavailable for the duration of a large import.
    pub async fn rehydrate(&self) -> DcronResult<usize> {
        self.wheel.set_ready(true);
        let jobs = self.registry.list_all_jobs().await?;
        let now = Utc::now();
        let mut processed = 0;

        for job in jobs {
            if job.job_id.is_empty() || job.status != JobStatus::Active as i32 {
                continue;
            }

            if is_memo_once(&job.memo) && should_execute_now(&job.memo, now) {
                tracing::info!(job_id = %job.job_id, "bootstrap firing overdue one-shot immediately");
                let pipeline = Arc::clone(&self.pipeline);
                let fire_job = job.clone();
                tokio::spawn(async move { pipeline.fire(fire_job).await });
                processed += 1;
                continue;
            }

            if is_every(&job.interval_pattern) {
                match every_duration(&job.interval_pattern) {
                    Ok(std_duration) => {
                        let step = chrono::Duration::from_std(std_duration).unwrap_or_default();
                        let next = calculate_next_run_time(now, job.next, step);
                        let delay = (next - now).to_std().unwrap_or_default();
                        let wheel = Arc::clone(&self.wheel);
                        let job_id = job.job_id.clone();
                        if delay.is_zero() {
                            if let Err(e) = self.wheel.add_job(job) {
                                tracing::warn!(job_id = %job_id, error = %e, "bootstrap failed to add @every job");
                            }
                        } else {
                            tokio::spawn(async move {
                                tokio::time::sleep(delay).await;
                                if let Err(e) = wheel.add_job(job) {
                                    tracing::warn!(job_id = %job_id, error = %e, "bootstrap failed to add delayed @every job");
                                }
                            });
                        }
                    }
                    Err(e) => {
                        tracing::warn!(job_id = %job.job_id, error = %e, "bootstrap failed to parse @every duration");
                        continue;
                    }
                }
            } else if let Err(e) = self.wheel.add_job(job.clone()) {
                tracing::warn!(job_id = %job.job_id, error = %e, "bootstrap failed to add job to wheel");
            }

            processed += 1;
        }

        tracing::info!(processed, "bootstrap rehydration complete");
        Ok(processed)
    }
}
