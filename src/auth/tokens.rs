//! Token sets and decoded token claims
//!
//! Tokens are decoded without signature verification. They come straight
//! from the provider's token endpoint over TLS and are only read locally.

use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Duration, TimeDelta, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::AppError;

/// Tokens are treated as expired this long before their real expiry
const EXPIRY_SKEW_SECONDS: i64 = 60;

/// Raw token endpoint response
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub expires_in: i64,
    #[serde(default)]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Access, refresh and id tokens plus expiry
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub token_type: String,
    pub scope: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl TokenSet {
    /// Build a token set from a token endpoint response received at `now`
    ///
    /// # Errors
    /// `AuthExchange` if `expires_in` does not fit a timestamp
    pub fn from_response(response: TokenResponse, now: DateTime<Utc>) -> Result<Self, AppError> {
        let expires_at = TimeDelta::try_seconds(response.expires_in.max(0))
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| {
                AppError::AuthExchange(format!(
                    "token response has out of range expires_in: {}",
                    response.expires_in
                ))
            })?;

        Ok(Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            id_token: response.id_token,
            token_type: response.token_type,
            scope: response.scope,
            expires_at,
        })
    }

    /// Apply a refresh response on top of this token set
    ///
    /// Providers may omit the refresh or id token on refresh; the previous
    /// values are kept in that case.
    pub fn refreshed(&self, response: TokenResponse, now: DateTime<Utc>) -> Result<Self, AppError> {
        let mut next = Self::from_response(response, now)?;
        if next.refresh_token.is_none() {
            next.refresh_token = self.refresh_token.clone();
        }
        if next.id_token.is_none() {
            next.id_token = self.id_token.clone();
        }
        if next.scope.is_none() {
            next.scope = self.scope.clone();
        }
        Ok(next)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_SKEW_SECONDS) >= self.expires_at
    }
}

/// `aud` may be a single string or a list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

/// `scope` may be a space separated string or a list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScopeClaim {
    List(Vec<String>),
    Joined(String),
}


/// Claims of the OpenID Connect id token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: Audience,
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    /// Provider specific claims, kept verbatim
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Claims of the access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub iss: String,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub aud: Option<Audience>,
    pub exp: i64,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub scope: Option<ScopeClaim>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Failure to decode a JWT payload
#[derive(Debug, Error)]
pub enum TokenDecodeError {
    #[error("token is not a three-part JWT")]
    Malformed,

    #[error("token payload is not base64url: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("token payload has unexpected claims: {0}")]
    Claims(#[from] serde_json::Error),
}

/// Decode the payload segment of a JWT into `T`
pub fn decode_claims<T: DeserializeOwned>(token: &str) -> Result<T, TokenDecodeError> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(TokenDecodeError::Malformed);
    };

    let bytes = general_purpose::URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
    Ok(serde_json::from_slice(&bytes)?)
}
