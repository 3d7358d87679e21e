//! Control-event listener — the pub/sub side of the control plane.
//!
//! Grounded on `internal/ctl/event.go`'s `EventHandling`: a `PubJobEvent` arriving on
//! `dgua_event_channel` mutates the wheel the same way the matching REST route would, without
//! going through the registration path again (the registry write already happened, either on this
//! replica via the route handler, or on a peer replica that published the event).

use dcron_core::PubJobEvent;

use crate::state::AppState;

/// Spawns the subscriber loop as a background task. Runs until the channel closes, logging and
/// continuing on any single message's parse or dispatch failure — one bad event must not take the
/// listener down.
pub fn spawn(state: AppState, channel: &str) {
    let mut rx = state.registry.store().subscribe(channel);
    tokio::spawn(async move {
        loop {
            let message = match rx.recv().await {
                Ok(msg) => msg,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "control event listener lagged, dropped messages");
                    continue;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            };

            let event: PubJobEvent = match serde_json::from_str(&message) {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(error = %e, raw = %message, "failed to parse control event");
                    continue;
                }
            };

            handle(&state, event).await;
        }
    });
}

async fn handle(state: &AppState, event: PubJobEvent) {
    match event.event.to_lowercase().as_str() {
        "add" => {
            let Ok(Some(job)) = state.registry.get_job(&event.group_name, &event.job_id).await else {
                return;
            };
            if let Err(e) = state.control.wheel().add_job(job) {
                tracing::warn!(job_id = %event.job_id, error = %e, "control event: add failed");
            }
        }
        "pause" => {
            if let Err(e) = state.control.pause(&event.group_name, &event.job_id).await {
                tracing::warn!(job_id = %event.job_id, error = %e, "control event: pause failed");
            }
        }
        "active" => {
            if let Err(e) = state.control.active(&event.group_name, &event.job_id).await {
                tracing::warn!(job_id = %event.job_id, error = %e, "control event: active failed");
            }
        }
        "delete" => {
            state.control.wheel().remove(&event.job_id);
        }
        "stop" => state.control.stop(),
        "start" => state.control.start(),
        other => tracing::debug!(event = %other, "control event: unrecognized event kind, ignoring"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support;
    use dcron_core::{Job, JobStatus, JobType, TaskPayloadReq};

    fn event(job_id: &str, group: &str, kind: &str) -> PubJobEvent {
        PubJobEvent {
            job_id: job_id.into(),
            group_name: group.into(),
            name: String::new(),
            event: kind.into(),
            host_name: "other-replica".into(),
        }
    }

    #[tokio::test]
    async fn add_event_schedules_a_job_already_written_by_a_peer() {
        let state = test_support::fresh();
        let job = state
            .control
            .add(TaskPayloadReq {
                group_name: "g".into(),
                name: "n".into(),
                exec_right_now: false,
                request_url: "http://localhost/hook".into(),
                retry: false,
                interval_pattern: "0 */5 * * * *".into(),
                job_type: "http".into(),
                nsq_topic: String::new(),
                nsq_message: String::new(),
            })
            .await
            .unwrap();
        // Simulate the peer replica's own wheel not having picked it up yet.
        state.control.wheel().remove(&job.job_id);
        assert!(!state.control.wheel().contains(&job.job_id));

        handle(&state, event(&job.job_id, "g", "add")).await;
        assert!(state.control.wheel().contains(&job.job_id));
    }

    #[tokio::test]
    async fn delete_event_removes_from_the_wheel() {
        let state = test_support::fresh();
        let job = Job {
            job_id: "j1".into(),
            group_name: "g".into(),
            name: "n".into(),
            exec_right_now: false,
            request_url: String::new(),
            retry: false,
            interval_pattern: "0 */5 * * * *".into(),
            job_type: JobType::Test,
            status: JobStatus::Active as i32,
            nsq_topic: String::new(),
            nsq_message: String::new(),
            register: chrono::Utc::now(),
            prev: chrono::Utc::now(),
            next: chrono::Utc::now(),
            memo: String::new(),
        };
        state.control.wheel().add_job(job).unwrap();
        assert!(state.control.wheel().contains("j1"));

        handle(&state, event("j1", "g", "delete")).await;
        assert!(!state.control.wheel().contains("j1"));
    }

    #[tokio::test]
    async fn unrecognized_event_kind_is_a_no_op() {
        let state = test_support::fresh();
        handle(&state, event("j1", "g", "frobnicate")).await;
    }
}
