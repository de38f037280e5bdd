//! Response bodies for the command surface.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use tracing::warn;

use crate::error::{CollectError, Error, ErrorKind, VcsError};

/// `{status: "success", message, ...fields}`.
pub fn success(message: impl Into<String>, fields: Value) -> Json<Value> {
    let mut body = json!({
        "status": "success",
        "message": message.into(),
    });
    if let (Some(body), Value::Object(fields)) = (body.as_object_mut(), fields) {
        body.extend(fields);
    }
    Json(body)
}

/// Any orchestrator error, rendered as `{status: "error", message, kind}`.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl<E> From<E> for ApiError
where
    E: Into<Error>,
{
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

impl ApiError {
    fn status_code(kind: ErrorKind) -> StatusCode {
        match kind {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Precondition | ErrorKind::PartialFailure => StatusCode::CONFLICT,
            ErrorKind::Collaborator => StatusCode::BAD_GATEWAY,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = Self::status_code(kind);
        warn!(status = status.as_u16(), error = %self.0, "Command failed");

        let mut body = json!({
            "status": "error",
            "message": self.0.to_string(),
            "kind": kind,
        });
        match &self.0 {
            Error::Collect(CollectError::StashConflict { record, .. }) => {
                body["record"] = json!(record);
            }
            Error::Vcs(VcsError::DirtyWorkspace {
                uncommitted_files, ..
            }) => {
                body["uncommitted_files"] = json!(uncommitted_files);
            }
            _ => {}
        }

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LedgerError, PlanError};

    #[test]
    fn success_merges_fields() {
        let Json(body) = success("Moved 3 jobs", json!({"moved": 3}));
        assert_eq!(body["status"], "success");
        assert_eq!(body["message"], "Moved 3 jobs");
        assert_eq!(body["moved"], 3);
    }

    #[test]
    fn kinds_map_to_status_codes() {
        let cases = [
            (
                ApiError::from(PlanError::InvalidPlan {
                    plan_id: "x".into(),
                }),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(LedgerError::NothingPlanned),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::from(VcsError::Unreachable {
                    reason: "down".into(),
                }),
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
