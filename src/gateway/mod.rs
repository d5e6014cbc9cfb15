//! Upstream Gateway
//!
//! Relays registered operations to the accounting API on behalf of the
//! active tenant and classifies failures into a stable set of kinds.

pub mod params;
pub mod registry;

use std::time::Instant;

use axum::body::Bytes;
use axum::http::StatusCode;
use thiserror::Error;
use url::Url;

pub use params::OperationArgs;
pub use registry::{Api, OPERATIONS, Operation};

use crate::auth::TenantId;
use crate::config::ProviderConfig;
use crate::error::AppError;

/// Header naming the tenant an API call is scoped to
pub const TENANT_HEADER: &str = "xero-tenant-id";

/// Stable classification of upstream failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    /// Network failure, timeout, throttling or provider outage
    Transient,
    /// Token rejected, or it could not be refreshed
    AuthExpired,
    NotFound,
    /// Provider rejected the request parameters
    Validation,
    Unknown,
}

impl UpstreamErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            UpstreamErrorKind::Transient => "transient",
            UpstreamErrorKind::AuthExpired => "auth_expired",
            UpstreamErrorKind::NotFound => "not_found",
            UpstreamErrorKind::Validation => "validation",
            UpstreamErrorKind::Unknown => "unknown",
        }
    }

    /// Classify a non-success upstream status
    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            401 | 403 => UpstreamErrorKind::AuthExpired,
            404 => UpstreamErrorKind::NotFound,
            400 | 422 => UpstreamErrorKind::Validation,
            408 | 429 | 500 | 502 | 503 | 504 => UpstreamErrorKind::Transient,
            _ => UpstreamErrorKind::Unknown,
        }
    }
}

/// Classified failure of an upstream call
#[derive(Debug, Error)]
#[error("Upstream call {operation} failed: {message}")]
pub struct UpstreamError {
    pub kind: UpstreamErrorKind,
    pub operation: &'static str,
    pub upstream_status: Option<u16>,
    pub timed_out: bool,
    pub message: String,
}

impl UpstreamError {
    pub fn new(
        kind: UpstreamErrorKind,
        operation: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            operation,
            upstream_status: None,
            timed_out: false,
            message: message.into(),
        }
    }

    pub fn with_upstream_status(mut self, status: u16) -> Self {
        self.upstream_status = Some(status);
        self
    }

    fn from_transport(operation: &'static str, error: &reqwest::Error) -> Self {
        let kind = if error.is_timeout() || error.is_connect() || error.is_request() {
            UpstreamErrorKind::Transient
        } else {
            UpstreamErrorKind::Unknown
        };

        Self {
            timed_out: error.is_timeout(),
            ..Self::new(kind, operation, "upstream request failed")
        }
    }

    /// HTTP status the envelope is returned with
    pub fn status(&self) -> StatusCode {
        if self.timed_out {
            StatusCode::GATEWAY_TIMEOUT
        } else {
            StatusCode::from(self.kind)
        }
    }
}

/// Upstream response body, relayed without modification
#[derive(Debug, Clone)]
pub struct UpstreamBody {
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Client for the accounting and finance APIs
pub struct Gateway {
    http_client: reqwest::Client,
    accounting_base: Url,
    finance_base: Url,
}

impl Gateway {
    pub fn new(provider: &ProviderConfig, http_client: reqwest::Client) -> Result<Self, AppError> {
        Ok(Self {
            http_client,
            accounting_base: api_base(&provider.accounting_api_url, "provider.accounting_api_url")?,
            finance_base: api_base(&provider.finance_api_url, "provider.finance_api_url")?,
        })
    }

    /// Run every upstream call of `operation`, returning the last body
    pub async fn invoke(
        &self,
        operation: &'static Operation,
        tenant_id: &TenantId,
        access_token: &str,
        args: &OperationArgs,
    ) -> Result<UpstreamBody, UpstreamError> {
        let mut last = None;
        for call in operation.calls {
            last = Some(
                self.call(operation, call, tenant_id, access_token, args)
                    .await?,
            );
        }

        last.ok_or_else(|| {
            UpstreamError::new(
                UpstreamErrorKind::Unknown,
                operation.name,
                "operation has no upstream calls",
            )
        })
    }

    async fn call(
        &self,
        operation: &'static Operation,
        call: &registry::UpstreamCall,
        tenant_id: &TenantId,
        access_token: &str,
        args: &OperationArgs,
    ) -> Result<UpstreamBody, UpstreamError> {
        let url = self.endpoint(operation, call, args)?;

        let started = Instant::now();
        let result = self
            .http_client
            .get(url.clone())
            .bearer_auth(access_token)
            .header(TENANT_HEADER, tenant_id.as_str())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await;
        crate::metrics::UPSTREAM_CALL_DURATION_SECONDS
            .with_label_values(&[operation.name])
            .observe(started.elapsed().as_secs_f64());

        let outcome = match result {
            Ok(response) => Self::read_response(operation, response).await,
            Err(error) => {
                tracing::warn!(
                    operation = operation.name,
                    path = url.path(),
                    %error,
                    "Upstream request failed"
                );
                Err(UpstreamError::from_transport(operation.name, &error))
            }
        };

        let label = match &outcome {
            Ok(_) => "success",
            Err(error) => error.kind.as_str(),
        };
        crate::metrics::UPSTREAM_CALLS_TOTAL
            .with_label_values(&[operation.name, label])
            .inc();

        outcome
    }

    async fn read_response(
        operation: &'static Operation,
        response: reqwest::Response,
    ) -> Result<UpstreamBody, UpstreamError> {
        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let bytes = response.bytes().await.map_err(|error| {
            tracing::warn!(operation = operation.name, %error, "Upstream body unreadable");
            UpstreamError::from_transport(operation.name, &error)
        })?;

        if status.is_success() {
            tracing::debug!(
                operation = operation.name,
                status = status.as_u16(),
                bytes = bytes.len(),
                "Upstream call succeeded"
            );
            return Ok(UpstreamBody {
                content_type,
                bytes,
            });
        }

        let kind = UpstreamErrorKind::from_status(status);
        let message = upstream_message(&bytes)
            .unwrap_or_else(|| format!("upstream returned {}", status.as_u16()));

        tracing::warn!(
            operation = operation.name,
            status = status.as_u16(),
            kind = kind.as_str(),
            %message,
            "Upstream call returned an error"
        );

        Err(UpstreamError::new(kind, operation.name, message).with_upstream_status(status.as_u16()))
    }

    fn endpoint(
        &self,
        operation: &'static Operation,
        call: &registry::UpstreamCall,
        args: &OperationArgs,
    ) -> Result<Url, UpstreamError> {
        let base = match call.api {
            Api::Accounting => &self.accounting_base,
            Api::Finance => &self.finance_base,
        };

        let mut url = base.join(&args.render_path(call)).map_err(|e| {
            UpstreamError::new(
                UpstreamErrorKind::Unknown,
                operation.name,
                format!("invalid upstream path: {e}"),
            )
        })?;

        if !args.query().is_empty() {
            url.query_pairs_mut()
                .extend_pairs(args.query().iter().map(|(k, v)| (*k, v.as_str())));
        }

        Ok(url)
    }
}

/// Parse an API base URL, making sure relative joins stay beneath it
fn api_base(raw: &str, setting: &str) -> Result<Url, AppError> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };

    Url::parse(&normalized).map_err(|e| AppError::Config(format!("{setting}: {e}")))
}

/// Short human-readable message from an upstream error body
///
/// Only the message string is kept; the rest of the body stays upstream.
fn upstream_message(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;

    ["Message", "Detail", "Title", "message", "detail", "title"]
        .iter()
        .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
        .map(|message| message.chars().take(300).collect())
}
