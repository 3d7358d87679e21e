//! Service control routes: wheel-wide start/stop.
//!
//! Grounded on `httpserver/router-handler.go`'s `StartCronJob`/`StopCronJob`.

use axum::extract::State;
use axum::response::Response;
use axum::routing::post;
use axum::Router;

use crate::response::success;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/service/cronjob/start", post(start))
        .route("/service/cronjob/stop", post(stop))
}

async fn start(State(state): State<AppState>) -> Response {
    state.control.start();
    success(true)
}

async fn stop(State(state): State<AppState>) -> Response {
    state.control.stop();
    success(true)
}
