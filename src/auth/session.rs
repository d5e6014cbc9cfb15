//! Session management
//!
//! Sessions live in process memory and are addressed by an opaque id.
//! The browser only holds the id, HMAC-signed so it cannot be forged.

use std::collections::HashMap;

use axum_extra::extract::cookie::{Cookie, SameSite};
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use tokio::sync::RwLock;

use super::tenant::{Tenant, TenantId};
use super::tokens::{AccessTokenClaims, IdTokenClaims, TokenSet};
use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

/// How long a consent redirect may take before its callback is refused
const PENDING_AUTHORIZATION_TTL_SECONDS: i64 = 10 * 60;

/// Authorization request waiting for the provider's callback
#[derive(Debug, Clone)]
pub struct PendingAuthorization {
    /// CSRF `state` sent with the consent redirect
    pub state: String,
    pub started_at: DateTime<Utc>,
}

impl PendingAuthorization {
    pub fn new(state: String) -> Self {
        Self {
            state,
            started_at: Utc::now(),
        }
    }

    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        now - self.started_at > Duration::seconds(PENDING_AUTHORIZATION_TTL_SECONDS)
    }
}

/// Result of a completed consent
#[derive(Debug, Clone, Serialize)]
pub struct Authorization {
    pub decoded_id_token: IdTokenClaims,
    pub decoded_access_token: AccessTokenClaims,
    #[serde(skip)]
    pub token_set: TokenSet,
    pub all_tenants: Vec<Tenant>,
    pub active_tenant: Tenant,
}

impl Authorization {
    /// Assemble an authorization, selecting the first tenant as active
    ///
    /// # Errors
    /// `TenantFetch` if the consent granted no tenants
    pub fn new(
        token_set: TokenSet,
        decoded_id_token: IdTokenClaims,
        decoded_access_token: AccessTokenClaims,
        all_tenants: Vec<Tenant>,
    ) -> Result<Self, AppError> {
        let active_tenant = all_tenants
            .first()
            .cloned()
            .ok_or_else(|| AppError::TenantFetch("consent granted no tenants".to_string()))?;

        Ok(Self {
            decoded_id_token,
            decoded_access_token,
            token_set,
            all_tenants,
            active_tenant,
        })
    }

    /// Make `tenant_id` the active tenant
    ///
    /// # Errors
    /// `NotFound` if the tenant is not part of the granted list
    pub fn select_tenant(&mut self, tenant_id: &TenantId) -> Result<&Tenant, AppError> {
        let tenant = self
            .all_tenants
            .iter()
            .find(|tenant| &tenant.tenant_id == tenant_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Tenant {tenant_id} is not connected")))?;

        self.active_tenant = tenant;
        Ok(&self.active_tenant)
    }
}

/// Per-browser session record
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub pending_authorization: Option<PendingAuthorization>,
    pub authorization: Option<Authorization>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authorization.is_some()
    }
}

/// In-memory session store
///
/// Concurrent writers to the same session are last-write-wins.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    secret: Vec<u8>,
    max_age: Duration,
}

impl SessionStore {
    /// Create a store signing cookies with `secret`
    pub fn new(secret: impl Into<Vec<u8>>, max_age_seconds: i64) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            secret: secret.into(),
            max_age: Duration::seconds(max_age_seconds),
        }
    }

    /// Start a fresh, unauthenticated session
    pub async fn create(&self) -> Session {
        let now = Utc::now();
        let session = Session {
            id: ulid::Ulid::new().to_string(),
            created_at: now,
            expires_at: now + self.max_age,
            pending_authorization: None,
            authorization: None,
        };

        self.save(session.clone()).await;
        tracing::debug!(session_id = %session.id, "Session created");
        session
    }

    /// Look up a live session
    pub async fn get(&self, id: &str) -> Option<Session> {
        let sessions = self.sessions.read().await;
        sessions
            .get(id)
            .filter(|session| !session.is_expired())
            .cloned()
    }

    /// Move `session` to a fresh id and expiry, dropping the old id
    ///
    /// Called when a session becomes authenticated; the id issued before
    /// login stops resolving.
    pub async fn rotate(&self, mut session: Session) -> Session {
        let previous_id = std::mem::replace(&mut session.id, ulid::Ulid::new().to_string());
        let now = Utc::now();
        session.created_at = now;
        session.expires_at = now + self.max_age;

        let mut sessions = self.sessions.write().await;
        sessions.remove(&previous_id);
        sessions.insert(session.id.clone(), session.clone());
        crate::metrics::SESSIONS_ACTIVE.set(sessions.len() as i64);
        drop(sessions);

        tracing::debug!(previous_id = %previous_id, session_id = %session.id, "Session rotated");
        session
    }

    /// Insert or replace a session
    pub async fn save(&self, session: Session) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id.clone(), session);
        crate::metrics::SESSIONS_ACTIVE.set(sessions.len() as i64);
    }

    pub async fn remove(&self, id: &str) -> Option<Session> {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(id);
        crate::metrics::SESSIONS_ACTIVE.set(sessions.len() as i64);
        removed
    }

    /// Drop expired sessions, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired());
        crate::metrics::SESSIONS_ACTIVE.set(sessions.len() as i64);
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub fn max_age_seconds(&self) -> i64 {
        self.max_age.num_seconds()
    }

    /// Signed cookie value for a session id
    ///
    /// Format: `{id}.{base64(hmac_sha256(id))}`
    pub fn sign(&self, session_id: &str) -> Result<String, AppError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid session secret: {e}")))?;
        mac.update(session_id.as_bytes());
        let signature = general_purpose::URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{session_id}.{signature}"))
    }

    /// Verify a signed cookie value and return the session id
    pub fn verify(&self, cookie_value: &str) -> Option<String> {
        let (session_id, signature_b64) = cookie_value.rsplit_once('.')?;
        let signature = general_purpose::URL_SAFE_NO_PAD.decode(signature_b64).ok()?;

        let mut mac = HmacSha256::new_from_slice(&self.secret).ok()?;
        mac.update(session_id.as_bytes());
        mac.verify_slice(&signature).ok()?;

        Some(session_id.to_string())
    }
}

/// Build the session cookie
pub fn session_cookie(
    name: &str,
    value: String,
    max_age_seconds: i64,
    secure: bool,
) -> Cookie<'static> {
    Cookie::build((name.to_string(), value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::seconds(max_age_seconds))
        .build()
}

/// Build a removal cookie for the session
pub fn clear_session_cookie(name: &str) -> Cookie<'static> {
    Cookie::build((name.to_string(), ""))
        .path("/")
        .max_age(time::Duration::ZERO)
        .build()
}
