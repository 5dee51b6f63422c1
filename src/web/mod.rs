//! HTTP surface: JSON over axum, one handler per service operation.

pub mod actor;
pub mod app;
pub mod handlers;
pub mod state;

pub use actor::{Actor, IfMatch};
pub use app::build_router;
pub use state::AppState;

use crate::core::{FieldError, GymError};
use crate::reconcile::ConflictReport;
use crate::service::UNABLE_TO_SAVE;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict: Option<ConflictReport>,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, code: &str) -> Self {
        Self {
            error: error.into(),
            code: code.to_string(),
            field: None,
            errors: Vec::new(),
            conflict: None,
        }
    }
}

#[derive(Debug)]
pub enum WebError {
    Gym(GymError),
    /// The request itself is unusable (bad header, missing token).
    Input(String),
}

impl WebError {
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input(message.into())
    }
}

impl From<GymError> for WebError {
    fn from(err: GymError) -> Self {
        Self::Gym(err)
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let err = match self {
            WebError::Input(message) => {
                return (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(message, "bad_request")))
                    .into_response();
            }
            WebError::Gym(err) => err,
        };

        let message = err.to_string();
        let (status, body) = match err {
            GymError::Validation(errors) => {
                let summary = errors
                    .errors()
                    .iter()
                    .map(|e| e.message.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                let mut body = ErrorResponse::new(summary, "validation_error");
                body.errors = errors.errors().to_vec();
                (StatusCode::UNPROCESSABLE_ENTITY, body)
            }
            GymError::MalformedImportRow { .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorResponse::new(message, "malformed_import_row"),
            ),
            GymError::Forbidden(_) => (StatusCode::FORBIDDEN, ErrorResponse::new(message, "forbidden")),
            GymError::NotFound { .. } => (StatusCode::NOT_FOUND, ErrorResponse::new(message, "not_found")),
            GymError::VersionConflict(report) => {
                let mut body = ErrorResponse::new(message, "version_conflict");
                body.conflict = Some(report);
                (StatusCode::CONFLICT, body)
            }
            GymError::ConstraintViolation { field, .. } => {
                let mut body = ErrorResponse::new(message, "constraint_violation");
                body.field = field;
                (StatusCode::CONFLICT, body)
            }
            GymError::RestrictedDelete { .. } => (
                StatusCode::CONFLICT,
                ErrorResponse::new(message, "restricted_delete"),
            ),
            GymError::TransientStoreFailure { .. } => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorResponse::new(message, "transient_failure"),
            ),
            GymError::NotificationDispatchFailure { .. } => (
                StatusCode::BAD_GATEWAY,
                ErrorResponse::new(message, "notification_failed"),
            ),
            GymError::Schema(_) | GymError::Store(_) => {
                error!(error = %message, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new(UNABLE_TO_SAVE, "internal_error"),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

pub type WebResult<T> = std::result::Result<T, WebError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StoreError;

    #[test]
    fn infrastructure_errors_hide_details() {
        let response = WebError::from(GymError::Store(StoreError::UnknownTable("X".to_string())))
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn recoverable_errors_map_to_client_statuses() {
        let cases = [
            (GymError::validation(Some("email"), "bad"), StatusCode::UNPROCESSABLE_ENTITY),
            (GymError::forbidden("no"), StatusCode::FORBIDDEN),
            (GymError::not_found("Client", 7), StatusCode::NOT_FOUND),
            (
                GymError::RestrictedDelete {
                    relationship: "Enrollments".to_string(),
                    message: "no".to_string(),
                },
                StatusCode::CONFLICT,
            ),
            (GymError::TransientStoreFailure { attempts: 3 }, StatusCode::SERVICE_UNAVAILABLE),
            (GymError::NotificationDispatchFailure { recipients: 2 }, StatusCode::BAD_GATEWAY),
        ];
        for (err, status) in cases {
            assert_eq!(WebError::from(err).into_response().status(), status);
        }
    }
}
