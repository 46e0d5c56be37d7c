use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use flowmesh_error::{ErrorKind, FlowError};
use serde_json::json;

/// Wraps [`FlowError`] so route handlers can `?`-propagate it and get a
/// sensible HTTP status for free. Bad input (config/unknown-activity/
/// trigger-config) maps to 422; anything else is a 500 — the executor
/// itself already turned transport/activity failures into node-level
/// outcomes, so a `FlowError` escaping all the way to here means the
/// request itself, not a node, was unprocessable.
pub struct ApiError(pub FlowError);

impl From<FlowError> for ApiError {
    fn from(err: FlowError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.kind {
            ErrorKind::Config | ErrorKind::UnknownActivity | ErrorKind::TriggerConfig => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Resolution | ErrorKind::Activity | ErrorKind::Secret | ErrorKind::Cycle | ErrorKind::Condition => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
