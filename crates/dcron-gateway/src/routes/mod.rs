//! REST surface, mirroring `httpserver/router.go`'s route table one-for-one under `/api`.

pub mod io;
pub mod jobs;
pub mod query;
pub mod service;

use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(query::router())
        .merge(jobs::router())
        .merge(io::router())
        .merge(service::router())
}
