//! Bulk import/export routes.
//!
//! Grounded on `httpserver/router-handler.go`'s `ImportHandler`/`ExportGroupHandler`/
//! `ExportMatchHandler`/`ExportAllHandler`/`ExportCronJob`. The original writes a temp file to
//! disk and serves it; this just streams the JSON body with the same `Content-Disposition` header
//! rather than touching the filesystem for what is, in the end, an in-memory response body.

use axum::extract::{Multipart, Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use dcron_core::Job;

use crate::response::{data_err, success_err};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs/export", post(export_all))
        .route("/jobs/export/:group", post(export_group))
        .route("/jobs/export/:group/:m", post(export_match))
        .route("/jobs/import", post(import))
}

fn as_attachment(jobs: Vec<Job>) -> Response {
    (
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=tasks.json".to_string(),
            ),
        ],
        Json(jobs),
    )
        .into_response()
}

async fn export_all(State(state): State<AppState>) -> Response {
    match state.registry.list_all_jobs().await {
        Ok(jobs) => as_attachment(jobs),
        Err(e) => data_err(e.to_string()),
    }
}

async fn export_group(State(state): State<AppState>, Path(group): Path<String>) -> Response {
    match state.registry.list_jobs_in_group(&group).await {
        Ok(jobs) => as_attachment(jobs),
        Err(e) => data_err(e.to_string()),
    }
}

async fn export_match(State(state): State<AppState>, Path((group, m)): Path<(String, String)>) -> Response {
    if group.is_empty() {
        return data_err("group_name is empty");
    }
    if m.is_empty() {
        return data_err("match is empty");
    }
    match state.registry.list_jobs_by_name_substring(&group, &m).await {
        Ok(jobs) => as_attachment(jobs),
        Err(e) => data_err(e.to_string()),
    }
}

/// Accepts a multipart `file` field containing a JSON array of full job records. Each is
/// registered under its own `(group, name)` dedup lock; a record whose lock is already held is
/// logged and skipped, matching the original's "continue on lock failure" loop. A write failure
/// releases that record's lock and aborts the remaining batch, matching the original's early
/// return on `SetTaskPayload` error.
async fn import(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut body = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("file") {
            body = field.bytes().await.ok();
            break;
        }
    }
    let Some(body) = body else {
        return success_err("failed to read file");
    };

    let jobs: Vec<Job> = match serde_json::from_slice(&body) {
        Ok(jobs) => jobs,
        Err(_) => return success_err("failed to parse JSON"),
    };

    for job in jobs {
        match state.registry.acquire_registration(&job.group_name, &job.name).await {
            Ok(true) => {}
            _ => {
                tracing::error!(group = %job.group_name, name = %job.name, job_id = %job.job_id, "job import: lock already held, skipping");
                continue;
            }
        }
        if let Err(e) = state.registry.put_job(&job).await {
            state
                .registry
                .release_registration(&job.group_name, &job.name)
                .await
                .ok();
            return success_err(e.to_string());
        }
    }

    (
        axum::http::StatusCode::OK,
        Json(serde_json::json!({ "message": "imported successfully" })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support;

    #[tokio::test]
    async fn export_all_sets_attachment_headers_on_an_empty_store() {
        let state = test_support::fresh();
        let resp = export_all(State(state)).await;
        assert_eq!(
            resp.headers().get(header::CONTENT_DISPOSITION).unwrap(),
            "attachment; filename=tasks.json",
        );
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let jobs: Vec<Job> = serde_json::from_slice(&bytes).unwrap();
        assert!(jobs.is_empty());
    }

    #[tokio::test]
    async fn export_match_rejects_empty_match() {
        let state = test_support::fresh();
        let resp = export_match(State(state), Path(("g".into(), String::new()))).await;
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["errors"][0], "match is empty");
    }
}
