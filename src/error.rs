//! Error types for LedgerLink
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::gateway::{UpstreamError, UpstreamErrorKind};

/// Text returned to the browser when the OAuth flow fails
pub const GENERIC_FAILURE_TEXT: &str = "Sorry, something went wrong";

/// Application-wide error type
///
/// This enum represents all possible errors that can occur
/// in the application. It implements `IntoResponse` to
/// automatically convert errors to appropriate HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or invalid startup configuration (fatal)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Authorization code exchange failed (502)
    #[error("Authorization exchange failed: {0}")]
    AuthExchange(String),

    /// Tenant enumeration after the exchange failed (502)
    #[error("Tenant fetch failed: {0}")]
    TenantFetch(String),

    /// No session, or no completed authorization in the session (401)
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Upstream accounting API failure, already classified
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// Invalid caller input (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Resource not found (404)
    #[error("{0}")]
    NotFound(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable machine-readable classification used in the error envelope
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config",
            AppError::AuthExchange(_) => "auth_exchange",
            AppError::TenantFetch(_) => "tenant_fetch",
            AppError::NotAuthenticated => "not_authenticated",
            AppError::Upstream(err) => err.kind.as_str(),
            AppError::Validation(_) => "validation",
            AppError::NotFound(_) => "not_found",
            AppError::Internal(_) => "internal",
        }
    }

    /// HTTP status the error is rendered with
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Config(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::AuthExchange(_) | AppError::TenantFetch(_) => StatusCode::BAD_GATEWAY,
            AppError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            AppError::Upstream(err) => err.status(),
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    /// Render as the plain failure text used by the browser-facing routes
    ///
    /// The OAuth pages never expose error details; the cause is logged.
    pub fn into_failure_text(self) -> Response {
        tracing::warn!(error = %self, kind = self.kind(), "Browser flow failed");
        crate::metrics::ERRORS_TOTAL
            .with_label_values(&[self.kind()])
            .inc();

        (self.status(), GENERIC_FAILURE_TEXT).into_response()
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Every error is rendered as the same JSON envelope:
    /// `{"error": message, "kind": kind}` plus `operation` and
    /// `upstream_status` for upstream failures.
    fn into_response(self) -> Response {
        use axum::Json;

        let status = self.status();
        let kind = self.kind();

        let message = match &self {
            AppError::Internal(_) => "Internal server error".to_string(),
            AppError::Config(_) => "Server misconfigured".to_string(),
            _ => self.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, kind, "Request failed");
        } else {
            tracing::debug!(error = %self, kind, "Request rejected");
        }

        crate::metrics::ERRORS_TOTAL.with_label_values(&[kind]).inc();

        let mut body = serde_json::json!({
            "error": message,
            "kind": kind,
        });

        if let AppError::Upstream(err) = &self {
            body["operation"] = serde_json::Value::from(err.operation);
            if let Some(upstream_status) = err.upstream_status {
                body["upstream_status"] = serde_json::Value::from(upstream_status);
            }
        }

        (status, Json(body)).into_response()
    }
}

impl From<UpstreamErrorKind> for StatusCode {
    fn from(kind: UpstreamErrorKind) -> Self {
        match kind {
            UpstreamErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
            UpstreamErrorKind::AuthExpired => StatusCode::UNAUTHORIZED,
            UpstreamErrorKind::NotFound => StatusCode::NOT_FOUND,
            UpstreamErrorKind::Validation => StatusCode::BAD_REQUEST,
            UpstreamErrorKind::Unknown => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn not_authenticated_renders_unauthorized_envelope() {
        let response = AppError::NotAuthenticated.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = body_json(response).await;
        assert_eq!(body["kind"], "not_authenticated");
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn upstream_error_carries_operation_and_status() {
        let err = UpstreamError::new(UpstreamErrorKind::NotFound, "accounts", "missing")
            .with_upstream_status(404);
        let response = AppError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = body_json(response).await;
        assert_eq!(body["kind"], "not_found");
        assert_eq!(body["operation"], "accounts");
        assert_eq!(body["upstream_status"], 404);
    }

    #[tokio::test]
    async fn internal_errors_do_not_leak_details() {
        let response = AppError::Internal(anyhow::anyhow!("secret detail")).into_response();
        let body = body_json(response).await;
        assert_eq!(body["error"], "Internal server error");
    }

    #[tokio::test]
    async fn failure_text_hides_cause() {
        let response = AppError::AuthExchange("invalid_grant".into()).into_failure_text();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], GENERIC_FAILURE_TEXT.as_bytes());
    }
}
