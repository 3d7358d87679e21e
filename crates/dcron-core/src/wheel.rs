//! Cron Wheel — the active scheduler loop, one `tokio::spawn` task per registered job.
//!
//! `cron::Schedule` only evaluates "when is the next occurrence"; it has no ticking loop of its
//! own, so each entry drives its own sleep-then-fire cycle (the same pattern the teacher's
//! `CronScheduler::spawn_schedule_task` uses for its `ScheduleTiming::Cron` variant). A job id
//! maps to an entry id, and the entry id maps to the live task state — mirroring the original's
//! two-step `jobMap: jobID -> entryID` then `cron.Entry(entryID)` lookup.

use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{Notify, oneshot};

use crate::error::{DcronError, DcronResult};
use crate::job::Job;
use crate::schedule::{every_duration, is_every};

/// Either a standard cron evaluator or a fixed-delay repeat, mirroring the two `cron.Schedule`
/// implementations the original's `robfig/cron` library dispatches between (`SpecSchedule` and
/// `ConstantDelaySchedule` for `@every`).
enum Timing {
    Cron(Schedule),
    Every(StdDuration),
}

impl Timing {
    fn parse(pattern: &str) -> DcronResult<Self> {
        if is_every(pattern) {
            let dur = every_duration(pattern)?;
            return Ok(Self::Every(dur));
        }
        let schedule =
            Schedule::from_str(pattern).map_err(|e| DcronError::InvalidSchedule(e.to_string()))?;
        Ok(Self::Cron(schedule))
    }

    /// Next occurrence strictly after `now`, in `tz`.
    fn next_after(&self, now: DateTime<Tz>, tz: Tz) -> Option<DateTime<Tz>> {
        match self {
            Self::Cron(schedule) => schedule.after(&now).next(),
            Self::Every(dur) => {
                let dur = chrono::Duration::from_std(*dur).unwrap_or(chrono::Duration::zero());
                if dur.is_zero() {
                    None
                } else {
                    Some((now.with_timezone(&Utc) + dur).with_timezone(&tz))
                }
            }
        }
    }
}

pub type EntryId = u64;

/// Receives a job at the moment its schedule fires. Implemented by the firing pipeline;
/// implemented by a recording stub in tests.
#[async_trait]
pub trait Firer: Send + Sync + 'static {
    async fn fire(&self, job: Job);
}

#[derive(Debug, Clone, Copy)]
pub struct EntryTiming {
    pub prev: Option<DateTime<Utc>>,
    pub next: Option<DateTime<Utc>>,
}

struct WheelEntry {
    job_id: String,
    timing: Arc<Mutex<EntryTiming>>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

/// The live scheduler: one entry per active job, each backed by its own tokio task.
///
/// Holds its firing callback as `Arc<dyn Firer>` rather than a generic parameter: the firing
/// pipeline itself needs a handle back to the wheel (to detach one-shot entries after they fire),
/// and a trait object here is simpler than threading a self-referential generic through both
/// types.
pub struct Wheel {
    tz: Tz,
    firer: Arc<dyn Firer>,
    next_entry_id: AtomicU64,
    job_to_entry: DashMap<String, EntryId>,
    entries: DashMap<EntryId, WheelEntry>,
    running: Arc<AtomicBool>,
    resume: Arc<Notify>,
    ready: AtomicBool,
}

impl Wheel {
    pub fn new(tz: Tz, firer: Arc<dyn Firer>) -> Self {
        Self {
            tz,
            firer,
            next_entry_id: AtomicU64::new(1),
            job_to_entry: DashMap::new(),
            entries: DashMap::new(),
            running: Arc::new(AtomicBool::new(true)),
            resume: Arc::new(Notify::new()),
            ready: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Readiness flag for `GET /api/ping`: flipped true once bootstrap rehydration completes,
    /// false again on shutdown. Matches the original's `pingSuccessful`.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }

    /// Resumes ticking across every entry. Idempotent.
    pub fn start(&self) {
        if !self.running.swap(true, Ordering::AcqRel) {
            self.resume.notify_waiters();
        }
    }

    /// Suspends ticking across every entry without removing them; entries already mid-fire are
    /// unaffected. Idempotent.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Registers `job` for active ticking. No-op if `job.job_id` is already scheduled, matching
    /// `AddJobSchedule`'s "only add if not already mapped" guard.
    pub fn add_job(&self, job: Job) -> DcronResult<()> {
        if self.job_to_entry.contains_key(&job.job_id) {
            return Ok(());
        }

        let timing_kind = Timing::parse(&job.interval_pattern)?;

        let entry_id = self.next_entry_id.fetch_add(1, Ordering::Relaxed);
        let timing = Arc::new(Mutex::new(EntryTiming {
            prev: None,
            next: None,
        }));
        let (cancel_tx, cancel_rx) = oneshot::channel();

        self.spawn_entry_task(job.clone(), timing_kind, Arc::clone(&timing), cancel_rx);

        self.job_to_entry.insert(job.job_id.clone(), entry_id);
        self.entries.insert(
            entry_id,
            WheelEntry {
                job_id: job.job_id,
                timing,
                cancel_tx: Some(cancel_tx),
            },
        );
        Ok(())
    }

    /// Cancels and detaches `job_id`'s entry, if present.
    pub fn remove(&self, job_id: &str) {
        if let Some((_, entry_id)) = self.job_to_entry.remove(job_id) {
            if let Some((_, mut entry)) = self.entries.remove(&entry_id) {
                if let Some(tx) = entry.cancel_tx.take() {
                    let _ = tx.send(());
                }
            }
        }
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.job_to_entry.contains_key(job_id)
    }

    /// The raw entry id a job is mapped to, if scheduled — exposed for `/api/job/query/:id`.
    pub fn entry_id(&self, job_id: &str) -> Option<EntryId> {
        self.job_to_entry.get(job_id).map(|e| *e)
    }

    /// Reads `(prev, next)` for a scheduled job, as the original's `cm.Entry(entryID)` does when
    /// overlaying live timing onto a stored job record.
    pub fn entry(&self, job_id: &str) -> Option<EntryTiming> {
        let entry_id = *self.job_to_entry.get(job_id)?;
        let entry = self.entries.get(&entry_id)?;
        Some(*entry.timing.lock())
    }

    pub fn entries(&self) -> Vec<(String, EntryTiming)> {
        self.entries
            .iter()
            .map(|e| (e.job_id.clone(), *e.timing.lock()))
            .collect()
    }

    fn spawn_entry_task(
        &self,
        job: Job,
        timing_kind: Timing,
        timing: Arc<Mutex<EntryTiming>>,
        mut cancel_rx: oneshot::Receiver<()>,
    ) {
        let firer = Arc::clone(&self.firer);
        let tz = self.tz;
        let running = Arc::clone(&self.running);
        let resume = Arc::clone(&self.resume);

        tokio::spawn(async move {
            loop {
                let now = Utc::now().with_timezone(&tz);
                let Some(next) = timing_kind.next_after(now, tz) else {
                    return;
                };
                let next_utc = next.with_timezone(&Utc);
                timing.lock().next = Some(next_utc);

                let delay = (next - now).to_std().unwrap_or_default();

                tokio::select! {
                    _ = &mut cancel_rx => return,
                    _ = tokio::time::sleep(delay) => {}
                }

                if !running.load(Ordering::Acquire) {
                    tokio::select! {
                        _ = &mut cancel_rx => return,
                        _ = resume.notified() => {}
                    }
                }

                {
                    let mut t = timing.lock();
                    t.prev = Some(next_utc);
                }

                let firer = Arc::clone(&firer);
                let mut fire_job = job.clone();
                fire_job.prev = next_utc;
                tokio::spawn(async move { firer.fire(fire_job).await });
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobType;
    use std::sync::atomic::AtomicUsize;

    struct CountingFirer {
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Firer for CountingFirer {
        async fn fire(&self, _job: Job) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn sample_job(pattern: &str) -> Job {
        let now = Utc::now();
        Job {
            job_id: "1".into(),
            group_name: "g".into(),
            name: "n".into(),
            exec_right_now: false,
            request_url: String::new(),
            retry: false,
            interval_pattern: pattern.into(),
            job_type: JobType::Test,
            status: 1,
            nsq_topic: String::new(),
            nsq_message: String::new(),
            register: now,
            prev: now,
            next: now,
            memo: String::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_on_schedule() {
        let count = Arc::new(AtomicUsize::new(0));
        let firer = Arc::new(CountingFirer {
            count: Arc::clone(&count),
        });
        let wheel = Wheel::new(chrono_tz::Asia::Taipei, firer);
        wheel.add_job(sample_job("* * * * * *")).unwrap();

        tokio::time::advance(std::time::Duration::from_secs(3)).await;
        tokio::task::yield_now().await;

        assert!(count.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn duplicate_add_is_a_no_op() {
        let firer = Arc::new(CountingFirer {
            count: Arc::new(AtomicUsize::new(0)),
        });
        let wheel = Wheel::new(chrono_tz::Asia::Taipei, firer);
        wheel.add_job(sample_job("0 0 0 1 1 *")).unwrap();
        wheel.add_job(sample_job("0 0 0 1 1 *")).unwrap();
        assert_eq!(wheel.entries().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn every_descriptor_fires_repeatedly() {
        let count = Arc::new(AtomicUsize::new(0));
        let firer = Arc::new(CountingFirer {
            count: Arc::clone(&count),
        });
        let wheel = Wheel::new(chrono_tz::Asia::Taipei, firer);
        wheel.add_job(sample_job("@every 1s")).unwrap();

        tokio::time::advance(std::time::Duration::from_millis(2500)).await;
        tokio::task::yield_now().await;

        assert!(count.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn remove_detaches_entry() {
        let firer = Arc::new(CountingFirer {
            count: Arc::new(AtomicUsize::new(0)),
        });
        let wheel = Wheel::new(chrono_tz::Asia::Taipei, firer);
        wheel.add_job(sample_job("0 0 0 1 1 *")).unwrap();
        assert!(wheel.contains("1"));
        wheel.remove("1");
        assert!(!wheel.contains("1"));
    }
}
