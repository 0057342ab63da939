//! HTTP error envelope.
//!
//! Every failed request answers with `{"code": <status>, "error": <message>}`
//! plus an optional `data` object. Internal detail is logged, never sent.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use pocketbook_access::{AuthenticationError, AuthorizationError, StoreError};
use rootcause::Report;
use serde_json::{Value, json};
use std::fmt;

/// Errors returned by handlers and middleware.
#[derive(Debug)]
pub enum ApiError {
    /// The request body or parameters were unusable.
    BadRequest { message: String, data: Option<Value> },
    /// The credential was missing, malformed, or rejected.
    Unauthenticated(AuthenticationError),
    /// An anonymous caller hit a protected route.
    AuthenticationRequired,
    /// An authenticated caller lacks permission.
    Forbidden,
    NotFound { what: &'static str },
    Conflict { message: String },
    /// A store failed in a way the client may retry.
    Unavailable { details: String },
    Internal { details: String },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
            data: None,
        }
    }

    pub fn internal(details: impl Into<String>) -> Self {
        Self::Internal {
            details: details.into(),
        }
    }

    /// Maps a store failure about `what` ("user", "session", ...).
    pub fn from_store(report: Report<StoreError>, what: &'static str) -> Self {
        match report.current_context() {
            StoreError::NotFound => Self::NotFound { what },
            StoreError::Conflict { .. } => Self::Conflict {
                message: format!("{what} already exists"),
            },
            err if err.is_retryable() => Self::Unavailable {
                details: report.to_string(),
            },
            _ => Self::Internal {
                details: report.to_string(),
            },
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthenticated(AuthenticationError::Internal { .. })
            | Self::Unauthenticated(AuthenticationError::InvalidPrincipal) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Unauthenticated(_) | Self::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::BadRequest { message, .. } | Self::Conflict { message } => message.clone(),
            Self::Unauthenticated(err) => err.public_message().to_string(),
            Self::AuthenticationRequired => "authentication required".to_string(),
            Self::Forbidden => "permission denied".to_string(),
            Self::NotFound { what } => format!("{what} not found"),
            Self::Unavailable { .. } => "service temporarily unavailable".to_string(),
            Self::Internal { .. } => "internal error".to_string(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthenticated(err) => write!(f, "authentication failed: {err}"),
            Self::Unavailable { details } => write!(f, "store unavailable: {details}"),
            Self::Internal { details } => write!(f, "internal error: {details}"),
            other => f.write_str(&other.public_message()),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<AuthenticationError> for ApiError {
    fn from(err: AuthenticationError) -> Self {
        Self::Unauthenticated(err)
    }
}

impl From<AuthorizationError> for ApiError {
    fn from(err: AuthorizationError) -> Self {
        match err {
            AuthorizationError::PermissionDenied => Self::Forbidden,
            AuthorizationError::RoleLookupFailed { reason } => Self::Internal { details: reason },
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest {
            message: "could not decode parameters".to_string(),
            data: Some(json!({ "error": rejection.body_text() })),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Unauthenticated(err) if status.is_server_error() => {
                tracing::error!(error = %err, "token issuance failed");
            }
            Self::Unauthenticated(err) => tracing::debug!(error = %err, "request not authenticated"),
            Self::Unavailable { details } => tracing::warn!(%details, "store unavailable"),
            Self::Internal { details } => tracing::error!(%details, "internal error"),
            _ => {}
        }

        let mut body = json!({
            "code": status.as_u16(),
            "error": self.public_message(),
        });
        if let Self::BadRequest { data: Some(data), .. } = self {
            body["data"] = data;
        }
        (status, Json(body)).into_response()
    }
}
