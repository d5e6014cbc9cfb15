//! OAuth 2.0 authorization code flow against the accounting provider
//!
//! Handles:
//! - Consent URL construction
//! - Callback parsing and code exchange
//! - Tenant enumeration
//! - Token refresh

use base64::{Engine as _, engine::general_purpose};
use chrono::Utc;
use rand::RngCore;
use serde::Deserialize;
use url::Url;

use super::session::Authorization;
use super::tenant::{Tenant, order_by_recent_connection};
use super::tokens::{
    AccessTokenClaims, IdTokenClaims, TokenResponse, TokenSet, decode_claims,
};
use crate::config::ProviderConfig;
use crate::error::AppError;

/// OAuth error body returned by the token endpoint
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Query parameters the provider sends back to the redirect URI
#[derive(Debug, Default)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl CallbackParams {
    fn from_url(url: &Url) -> Self {
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => params.code = Some(value.into_owned()),
                "state" => params.state = Some(value.into_owned()),
                "error" => params.error = Some(value.into_owned()),
                "error_description" => params.error_description = Some(value.into_owned()),
                _ => {}
            }
        }
        params
    }
}

/// Authorization Flow Controller
///
/// Built once from `ProviderConfig` and shared through `AppState`.
pub struct AuthorizationFlow {
    provider: ProviderConfig,
    http_client: reqwest::Client,
}

impl AuthorizationFlow {
    pub fn new(provider: ProviderConfig, http_client: reqwest::Client) -> Self {
        Self {
            provider,
            http_client,
        }
    }

    /// Generate a random CSRF state token
    pub fn generate_state() -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        general_purpose::URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Build the provider consent URL
    ///
    /// Query: response_type, client_id, redirect_uri, scope, state
    pub fn begin_authorization(&self, state: &str) -> Result<Url, AppError> {
        let mut url = Url::parse(&self.provider.authorize_url)
            .map_err(|e| AppError::Config(format!("provider.authorize_url: {e}")))?;

        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.provider.client_id)
            .append_pair("redirect_uri", &self.provider.redirect_uri)
            .append_pair("scope", &self.provider.scope_list().join(" "))
            .append_pair("state", state);

        Ok(url)
    }

    /// Complete the flow from the URL the provider redirected to
    ///
    /// `callback_url` may be absolute or a path with query
    /// (e.g. `/callback?code=...&state=...`).
    ///
    /// # Steps
    /// 1. Verify provider error / code / CSRF state
    /// 2. Exchange code for a token set
    /// 3. Decode id and access tokens
    /// 4. Fetch and order the tenant list
    pub async fn complete_authorization(
        &self,
        callback_url: &str,
        expected_state: Option<&str>,
    ) -> Result<Authorization, AppError> {
        let base = Url::parse(&self.provider.redirect_uri)
            .map_err(|e| AppError::Config(format!("provider.redirect_uri: {e}")))?;
        let url = base
            .join(callback_url)
            .map_err(|e| AppError::AuthExchange(format!("callback URL is invalid: {e}")))?;
        let params = CallbackParams::from_url(&url);

        if let Some(error) = params.error {
            let description = params.error_description.unwrap_or_default();
            return Err(AppError::AuthExchange(format!(
                "provider returned {error} {description}"
            )));
        }

        let expected_state = expected_state.ok_or_else(|| {
            AppError::AuthExchange("no authorization in progress for this session".to_string())
        })?;
        if params.state.as_deref() != Some(expected_state) {
            return Err(AppError::AuthExchange("state mismatch".to_string()));
        }

        let code = params
            .code
            .filter(|code| !code.is_empty())
            .ok_or_else(|| AppError::AuthExchange("callback is missing code".to_string()))?;

        let token_set = self.exchange_code(&code).await?;

        let id_token = token_set
            .id_token
            .as_deref()
            .ok_or_else(|| AppError::AuthExchange("token response has no id_token".to_string()))?;
        let decoded_id_token: IdTokenClaims = decode_claims(id_token)
            .map_err(|e| AppError::AuthExchange(format!("id_token: {e}")))?;
        let decoded_access_token: AccessTokenClaims = decode_claims(&token_set.access_token)
            .map_err(|e| AppError::AuthExchange(format!("access_token: {e}")))?;

        let tenants = self.fetch_tenants(&token_set.access_token).await?;

        Authorization::new(token_set, decoded_id_token, decoded_access_token, tenants)
    }

    /// Exchange an authorization code for a token set
    async fn exchange_code(&self, code: &str) -> Result<TokenSet, AppError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.provider.redirect_uri.as_str()),
        ];

        let response = self
            .token_request(&form)
            .await
            .map_err(AppError::AuthExchange)?;

        TokenSet::from_response(response, Utc::now())
    }

    /// Refresh an expired token set
    ///
    /// # Errors
    /// `AuthExchange` if there is no refresh token or the provider rejects it
    pub async fn refresh(&self, token_set: &TokenSet) -> Result<TokenSet, AppError> {
        let refresh_token = token_set
            .refresh_token
            .as_deref()
            .ok_or_else(|| AppError::AuthExchange("no refresh token available".to_string()))?;

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];

        let response = self
            .token_request(&form)
            .await
            .map_err(AppError::AuthExchange)?;

        let refreshed = token_set.refreshed(response, Utc::now())?;
        tracing::info!(expires_at = %refreshed.expires_at, "Access token refreshed");
        Ok(refreshed)
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse, String> {
        let response = self
            .http_client
            .post(&self.provider.token_url)
            .basic_auth(
                &self.provider.client_id,
                Some(&self.provider.client_secret),
            )
            .header(reqwest::header::ACCEPT, "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| format!("token endpoint unreachable: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason = serde_json::from_str::<TokenErrorResponse>(&body)
                .map(|err| match err.error_description {
                    Some(description) => format!("{}: {description}", err.error),
                    None => err.error,
                })
                .unwrap_or_else(|_| "unrecognised error body".to_string());
            return Err(format!("token endpoint returned {status}: {reason}"));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| format!("token response is invalid: {e}"))
    }

    /// Fetch the tenants the consent granted, most recent first
    pub async fn fetch_tenants(&self, access_token: &str) -> Result<Vec<Tenant>, AppError> {
        let response = self
            .http_client
            .get(&self.provider.connections_url)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| AppError::TenantFetch(format!("connections endpoint unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::TenantFetch(format!(
                "connections endpoint returned {status}"
            )));
        }

        let mut tenants = response
            .json::<Vec<Tenant>>()
            .await
            .map_err(|e| AppError::TenantFetch(format!("connections response is invalid: {e}")))?;

        order_by_recent_connection(&mut tenants);
        Ok(tenants)
    }
}
