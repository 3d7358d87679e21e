//! Mutating routes: register, replace, delete, pause/active.
//!
//! Grounded on `httpserver/router-handler.go`'s `AddJob`/`ReplaceJob`/`DeleteJob`/`DeleteJobs`/
//! `DeleteMatchJob`/`ActiveJob`/`PauseJob`.

use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::{delete, post, put};
use axum::{Json, Router};
use dcron_core::TaskPayloadReq;

use crate::response::{data_err, success, success_err, success_err_from};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/job/add", post(add_job))
        .route("/job/replace", post(replace_job))
        .route("/job/active/:group/:id", put(active_job))
        .route("/job/pause/:group/:id", put(pause_job))
        .route("/job/delete/:group/:id", delete(delete_job))
        .route("/jobs/delete/:group", delete(delete_group))
        .route("/jobs/delete/:group/:m", delete(delete_match))
}

async fn add_job(State(state): State<AppState>, Json(req): Json<TaskPayloadReq>) -> Response {
    match state.control.add(req).await {
        Ok(_) => success(true),
        Err(e) => success_err_from(e),
    }
}

/// `replace` resolves by exact `(group_name, name)` match — see `dcron_core::control::replace`.
async fn replace_job(State(state): State<AppState>, Json(req): Json<TaskPayloadReq>) -> Response {
    match state.control.replace(req).await {
        Ok(_) => success(true),
        Err(e) => success_err_from(e),
    }
}

async fn active_job(State(state): State<AppState>, Path((group, id)): Path<(String, String)>) -> Response {
    if group.is_empty() {
        return data_err("group_name is empty");
    }
    match state.control.active(&group, &id).await {
        Ok(()) => success(true),
        Err(e) => success_err_from(e),
    }
}

async fn pause_job(State(state): State<AppState>, Path((group, id)): Path<(String, String)>) -> Response {
    if group.is_empty() {
        return data_err("group_name is empty");
    }
    match state.control.pause(&group, &id).await {
        Ok(()) => success(true),
        Err(e) => success_err_from(e),
    }
}

async fn delete_job(State(state): State<AppState>, Path((group, id)): Path<(String, String)>) -> Response {
    if group.is_empty() {
        return success_err("group_name is empty");
    }
    let Ok(Some(job)) = state.registry.get_job(&group, &id).await else {
        return success_err("job_id or group_name is error");
    };
    match state.control.delete(&group, &job.name, &id).await {
        Ok(()) => success(true),
        Err(e) => success_err_from(e),
    }
}

async fn delete_group(State(state): State<AppState>, Path(group): Path<String>) -> Response {
    match state.control.delete_group(&group).await {
        Ok(_) => success(true),
        Err(e) => success_err_from(e),
    }
}

async fn delete_match(State(state): State<AppState>, Path((group, m)): Path<(String, String)>) -> Response {
    if group.is_empty() {
        return data_err("group_name is empty");
    }
    if m.is_empty() {
        return data_err("match is empty");
    }
    match state.control.delete_matching(&group, &m).await {
        Ok(_) => success(true),
        Err(e) => success_err_from(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support;

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn sample_req() -> TaskPayloadReq {
        TaskPayloadReq {
            group_name: "g".into(),
            name: "n".into(),
            exec_right_now: false,
            request_url: "http://localhost/hook".into(),
            retry: false,
            interval_pattern: "0 */5 * * * *".into(),
            job_type: "http".into(),
            nsq_topic: String::new(),
            nsq_message: String::new(),
        }
    }

    #[tokio::test]
    async fn add_job_then_delete_job_round_trips() {
        let state = test_support::fresh();
        let added = body_json(add_job(State(state.clone()), Json(sample_req())).await).await;
        assert_eq!(added["success"], true);

        // find_job_id_by_name resolves the id the control plane minted for us.
        let job_id = state.registry.find_job_id_by_name("g", "n").await.unwrap().unwrap();

        let deleted = body_json(delete_job(State(state), Path(("g".into(), job_id))).await).await;
        assert_eq!(deleted["success"], true);
    }

    #[tokio::test]
    async fn delete_job_reports_error_for_unknown_id() {
        let state = test_support::fresh();
        let resp = body_json(delete_job(State(state), Path(("g".into(), "missing".into()))).await).await;
        assert_eq!(resp["success"], false);
        assert_eq!(resp["errors"][0], "job_id or group_name is error");
    }

    #[tokio::test]
    async fn pause_job_rejects_empty_group_name() {
        let state = test_support::fresh();
        let resp = body_json(pause_job(State(state), Path((String::new(), "id".into()))).await).await;
        assert_eq!(resp["errors"][0], "group_name is empty");
    }
}
