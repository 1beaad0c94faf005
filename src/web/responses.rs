//! HTTP response types and utilities
//!
//! Standard envelope for JSON error responses and the mapping from
//! [`AppError`] to status codes.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::{AppError, WebError};

/// Standard API error envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    /// Always false; success bodies use endpoint-specific shapes
    pub success: bool,
    pub error: String,
    /// Additional error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, String>>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ApiResponse {
    pub fn error(message: String) -> Self {
        Self {
            success: false,
            error: message,
            details: None,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn error_with_details(message: String, details: HashMap<String, String>) -> Self {
        Self {
            details: Some(details),
            ..Self::error(message)
        }
    }
}

/// Convert AppError to appropriate HTTP response
pub fn handle_error(error: AppError) -> Response {
    let (status, message, details) = match &error {
        AppError::Validation { message } => (StatusCode::BAD_REQUEST, message.clone(), None),
        AppError::Web(WebError::MissingParameter { parameter }) => (
            StatusCode::BAD_REQUEST,
            format!("Missing {parameter}"),
            None,
        ),
        AppError::Web(WebError::InvalidRequest { field, message }) => (
            StatusCode::BAD_REQUEST,
            format!("Invalid {field}"),
            Some(HashMap::from([(field.clone(), message.clone())])),
        ),
        AppError::NotFound { resource, id } => (
            StatusCode::NOT_FOUND,
            format!("{resource} with id '{id}' not found"),
            None,
        ),
        AppError::Configuration { message } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Configuration error: {message}"),
            None,
        ),
        AppError::Source(_) => (
            StatusCode::BAD_GATEWAY,
            "Source operation failed".to_string(),
            None,
        ),
        AppError::Io(_) | AppError::Json(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Storage operation failed".to_string(),
            None,
        ),
    };

    if status.is_server_error() {
        tracing::error!(error = %error, status = status.as_u16(), "Request failed");
    }

    let response = match details {
        Some(details) => ApiResponse::error_with_details(message, details),
        None => ApiResponse::error(message),
    };

    (status, Json(response)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SourceError;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::validation("bad"), StatusCode::BAD_REQUEST),
            (
                WebError::missing_parameter("locations").into(),
                StatusCode::BAD_REQUEST,
            ),
            (AppError::not_found("probe", "XX"), StatusCode::NOT_FOUND),
            (
                SourceError::Http {
                    status: 503,
                    message: "Service Unavailable".to_string(),
                }
                .into(),
                StatusCode::BAD_GATEWAY,
            ),
            (
                std::io::Error::other("disk full").into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(handle_error(error).status(), expected);
        }
    }

    #[test]
    fn test_error_envelope_shape() {
        let value = serde_json::to_value(ApiResponse::error("nope".to_string())).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "nope");
        assert!(value.get("data").is_none());
        assert!(value.get("timestamp").is_some());
    }
}
