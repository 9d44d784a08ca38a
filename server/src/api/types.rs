//! Shared API types

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::domain::rbac::RbacError;

/// JSON error response for the non-auth routes
#[derive(Debug)]
pub enum ApiError {
    BadRequest { code: String, message: String },
    NotFound { code: String, message: String },
    Forbidden { code: String, message: String },
    Conflict { code: String, message: String },
}

impl ApiError {
    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NotFound {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn forbidden(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Forbidden {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conflict {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<RbacError> for ApiError {
    fn from(e: RbacError) -> Self {
        let message = e.to_string();
        match e {
            RbacError::ResourcePermissionDenied { .. } => {
                Self::forbidden("RESOURCE_PERMISSION_DENIED", message)
            }
            RbacError::PermissionDenied => Self::forbidden("PERMISSION_DENIED", message),
            RbacError::UnknownRole(_) => Self::bad_request("UNKNOWN_ROLE", message),
            RbacError::EntryNotFound(_) => Self::not_found("ENTRY_NOT_FOUND", message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, code, message) = match self {
            Self::BadRequest { code, message } => {
                (StatusCode::BAD_REQUEST, "bad_request", code, message)
            }
            Self::NotFound { code, message } => (StatusCode::NOT_FOUND, "not_found", code, message),
            Self::Forbidden { code, message } => {
                (StatusCode::FORBIDDEN, "forbidden", code, message)
            }
            Self::Conflict { code, message } => (StatusCode::CONFLICT, "conflict", code, message),
        };
        (
            status,
            Json(serde_json::json!({
                "error": error_type,
                "code": code,
                "message": message
            })),
        )
            .into_response()
    }
}
