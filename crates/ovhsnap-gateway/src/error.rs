// SPDX-FileCopyrightText: 2026 Ovhsnap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The control plane's error envelope: `{"error": <message>, "code": <symbolic>}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use ovhsnap_core::SnapError;

/// An API-level error with its HTTP status and symbolic code.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "config_error",
            message: message.into(),
        }
    }

    pub fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "unauthorized",
            message: "invalid API key".into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "not_found",
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            code: "conflict",
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal",
            message: message.into(),
        }
    }
}

impl From<SnapError> for ApiError {
    fn from(e: SnapError) -> Self {
        match e {
            SnapError::Config(message) => ApiError::bad_request(message),
            SnapError::NotFound { message } => ApiError::not_found(message),
            SnapError::Conflict { message } => ApiError::conflict(message),
            other => ApiError::internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message,
            "code": self.code,
        });
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snap_error_mapping() {
        let e: ApiError = SnapError::Config("bad interval".into()).into();
        assert_eq!(e.status, StatusCode::BAD_REQUEST);
        assert_eq!(e.code, "config_error");

        let e: ApiError = SnapError::Conflict {
            message: "busy".into(),
        }
        .into();
        assert_eq!(e.status, StatusCode::CONFLICT);

        let e: ApiError = SnapError::Internal("boom".into()).into();
        assert_eq!(e.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
