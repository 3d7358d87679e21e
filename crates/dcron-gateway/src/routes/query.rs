//! Read-only routes: ping, listings, and single-job lookups.
//!
//! Grounded on `httpserver/router-handler.go`'s `Ping`/`ListGroup`/`ListGame`/`ListJobByGroup`/
//! `ListJobByMatch`/`ListJobByGame`/`JobInfo`/`QueryHandler`/`QueryJob`.

use std::collections::BTreeSet;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, routing::get, Router};
use serde::Deserialize;
use serde_json::json;

use dcron_core::control::describe_name;

use crate::response::{data_err, data_err_from, data_ok};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ping", get(ping))
        .route("/group/list", get(group_list))
        .route("/game/list", get(game_list))
        .route("/job/list", get(job_list))
        .route("/job/match/list", get(job_match_list))
        .route("/job/game/list", get(job_game_list))
        .route("/job/info", get(job_info))
        .route("/job/query", get(job_query))
        .route("/job/query/:id", get(job_query_by_id))
}

/// `GET /api/ping` — 200 iff the wheel has finished flipping ready, 400 otherwise.
async fn ping(State(state): State<AppState>) -> Response {
    let ready = state.control.wheel().is_ready();
    let status = if ready { StatusCode::OK } else { StatusCode::BAD_REQUEST };
    (status, Json(json!({ "data": { "pong": if ready { "pong" } else { "" } }, "errors": Vec::<String>::new() }))).into_response()
}

async fn group_list(State(state): State<AppState>) -> Response {
    match state.registry.list_groups().await {
        Ok(groups) => data_ok(groups),
        Err(e) => data_err_from(e),
    }
}

#[derive(Deserialize)]
pub struct GroupNameQuery {
    #[serde(default)]
    pub group_name: String,
}

async fn game_list(State(state): State<AppState>, axum::extract::Query(q): axum::extract::Query<GroupNameQuery>) -> Response {
    if q.group_name.is_empty() {
        return data_err("group_name is empty");
    }
    match state.registry.list_jobs_in_group(&q.group_name).await {
        Ok(jobs) => {
            let mut types: BTreeSet<String> = BTreeSet::new();
            for job in &jobs {
                let (game_type, _) = describe_name(&job.name);
                if !game_type.is_empty() {
                    types.insert(game_type);
                }
            }
            data_ok(types.into_iter().collect::<Vec<_>>())
        }
        Err(e) => data_err_from(e),
    }
}

async fn job_list(State(state): State<AppState>, axum::extract::Query(q): axum::extract::Query<GroupNameQuery>) -> Response {
    if q.group_name.is_empty() {
        return data_err("group_name is empty");
    }
    match state.registry.list_jobs_in_group(&q.group_name).await {
        Ok(jobs) => data_ok(jobs),
        Err(e) => data_err_from(e),
    }
}

#[derive(Deserialize)]
pub struct MatchQuery {
    #[serde(default)]
    pub group_name: String,
    #[serde(default)]
    pub r#match: String,
}

async fn job_match_list(State(state): State<AppState>, axum::extract::Query(q): axum::extract::Query<MatchQuery>) -> Response {
    if q.group_name.is_empty() {
        return data_err("group_name is empty");
    }
    if q.r#match.is_empty() {
        return data_err("match is empty");
    }
    match state.registry.list_jobs_by_name_substring(&q.group_name, &q.r#match).await {
        Ok(jobs) => data_ok(jobs),
        Err(e) => data_err_from(e),
    }
}

#[derive(Deserialize)]
pub struct GameTypeQuery {
    #[serde(default)]
    pub group_name: String,
    #[serde(default)]
    pub game_type: String,
}

async fn job_game_list(State(state): State<AppState>, axum::extract::Query(q): axum::extract::Query<GameTypeQuery>) -> Response {
    if q.group_name.is_empty() {
        return data_err("group_name is empty");
    }
    if q.game_type.is_empty() {
        return data_err("game_type is empty");
    }
    match state.registry.list_jobs_by_game_type(&q.group_name, &q.game_type).await {
        Ok(jobs) => data_ok(jobs),
        Err(e) => data_err_from(e),
    }
}

#[derive(Deserialize)]
pub struct JobInfoQuery {
    #[serde(default)]
    pub group_name: String,
    #[serde(default)]
    pub job_id: String,
}

async fn job_info(State(state): State<AppState>, axum::extract::Query(q): axum::extract::Query<JobInfoQuery>) -> Response {
    if q.group_name.is_empty() {
        return data_err("group_name is empty");
    }
    if q.job_id.is_empty() {
        return data_err("job_id is empty");
    }
    match state.registry.get_job(&q.group_name, &q.job_id).await {
        Ok(Some(job)) => data_ok(job),
        Ok(None) => data_err("No information found"),
        Err(e) => data_err_from(e),
    }
}

/// `GET /api/job/query` — counts of wheel entries vs registered task records.
async fn job_query(State(state): State<AppState>) -> Response {
    let running = state.control.wheel().entries().len();
    match state.registry.list_all_jobs().await {
        Ok(jobs) => data_ok(json!({ "running": running, "register": jobs.len() })),
        Err(e) => data_err_from(e),
    }
}

/// `GET /api/job/query/:id` — whether `id` is currently mapped in the wheel, and its entry id.
async fn job_query_by_id(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let entry_id = state.control.wheel().entry_id(&id);
    data_ok(json!({
        "job_mapping": entry_id.is_some(),
        "map_entry_id": entry_id.unwrap_or(0),
        "cron_entry_id": entry_id.unwrap_or(0),
    }))
}
