//! Core error type.
//!
//! Validation and store errors are surfaced to API callers as an `errors` array in the JSON
//! envelope, never as a non-200 status — this preserves the original service's client contract.
//! Dispatch and bootstrap failures never reach this type at all: they are logged and swallowed at
//! the point of failure (see `firing` and `bootstrap`).

use axum::{Json, http::StatusCode, response::IntoResponse, response::Response};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DcronError {
    #[error("group_name is empty")]
    EmptyGroupName,

    #[error("name is empty")]
    EmptyName,

    #[error("match is empty")]
    EmptyMatch,

    #[error("game_type is empty")]
    EmptyGameType,

    #[error("job_id is empty")]
    EmptyJobId,

    #[error("job_id or group_name is error")]
    JobIdGroupNameMismatch,

    #[error("type is empty")]
    EmptyType,

    #[error("unknown job type: {0}")]
    UnknownType(String),

    #[error("url is empty")]
    EmptyUrl,

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("nsq topic is empty")]
    EmptyNsqTopic,

    #[error("nsq message is empty")]
    EmptyNsqMessage,

    #[error("nsq message is not json")]
    NsqMessageNotJson,

    #[error("group_name + name has already been registered")]
    AlreadyRegistered,

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("parameter error")]
    ParameterError,

    #[error("store error: {0}")]
    Store(String),
}

pub type DcronResult<T> = Result<T, DcronError>;

impl IntoResponse for DcronError {
    /// Business errors all return HTTP 200 with a populated `errors` array, matching the
    /// original service's compatibility guarantee (preserved for existing API clients).
    fn into_response(self) -> Response {
        (
            StatusCode::OK,
            Json(json!({
                "data": serde_json::Value::Array(Vec::new()),
                "errors": [self.to_string()],
            })),
        )
            .into_response()
    }
}
