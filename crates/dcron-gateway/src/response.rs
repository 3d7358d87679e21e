//! JSON envelope helpers, mirroring `httpserver/router-struct.go`'s `DataRespSchema`/`SuccessRes`.
//!
//! Every route answers HTTP 200 regardless of business outcome; failures are carried in the
//! `errors` array instead of the status code, preserving the original service's client contract.

use axum::Json;
use axum::response::{IntoResponse, Response};
use dcron_core::DcronError;
use serde::Serialize;
use serde_json::json;

/// `{"data": <value>, "errors": []}`
pub fn data_ok<T: Serialize>(value: T) -> Response {
    (
        axum::http::StatusCode::OK,
        Json(json!({ "data": value, "errors": Vec::<String>::new() })),
    )
        .into_response()
}

/// `{"data": [], "errors": [<msg>]}`
pub fn data_err(msg: impl Into<String>) -> Response {
    (
        axum::http::StatusCode::OK,
        Json(json!({ "data": Vec::<String>::new(), "errors": [msg.into()] })),
    )
        .into_response()
}

/// `{"success": <bool>, "errors": []}`
pub fn success(ok: bool) -> Response {
    (
        axum::http::StatusCode::OK,
        Json(json!({ "success": ok, "errors": Vec::<String>::new() })),
    )
        .into_response()
}

/// `{"success": false, "errors": [<msg>]}`
pub fn success_err(msg: impl Into<String>) -> Response {
    (
        axum::http::StatusCode::OK,
        Json(json!({ "success": false, "errors": [msg.into()] })),
    )
        .into_response()
}

/// Converts a core error into the `data`-shaped envelope (used by GET/list routes).
pub fn data_err_from(err: DcronError) -> Response {
    data_err(err.to_string())
}

/// Converts a core error into the `success`-shaped envelope (used by mutation routes).
pub fn success_err_from(err: DcronError) -> Response {
    success_err(err.to_string())
}
