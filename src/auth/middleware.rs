//! Session extractors
//!
//! Resolves the signed session cookie into a typed `Session`.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, request::Parts},
};
use axum_extra::extract::CookieJar;

use super::session::Session;
use crate::AppState;
use crate::error::AppError;

/// Load the session referenced by the request's cookie, if any
pub async fn session_from_headers(headers: &HeaderMap, state: &AppState) -> Option<Session> {
    let jar = CookieJar::from_headers(headers);
    let cookie = jar.get(&state.config.session.cookie_name)?;

    let Some(session_id) = state.sessions.verify(cookie.value()) else {
        tracing::debug!("Ignoring session cookie with invalid signature");
        return None;
    };

    state.sessions.get(&session_id).await
}

/// Optional session extractor
///
/// Yields `None` when there is no cookie, the signature is invalid,
/// or the session has expired.
#[derive(Debug, Clone)]
pub struct MaybeSession(pub Option<Session>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeSession
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(session) = parts.extensions.get::<Session>().cloned() {
            return Ok(MaybeSession(Some(session)));
        }

        let app_state = AppState::from_ref(state);
        let session = session_from_headers(&parts.headers, &app_state).await;

        if let Some(session) = &session {
            parts.extensions.insert(session.clone());
        }

        Ok(MaybeSession(session))
    }
}

/// Extractor for a session that completed the OAuth callback
///
/// Rejects with `NotAuthenticated` otherwise.
///
/// # Usage
/// ```ignore
/// async fn handler(
///     AuthenticatedSession(session): AuthenticatedSession,
/// ) -> impl IntoResponse {
///     format!("Session {}", session.id)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthenticatedSession(pub Session);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedSession
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Ok(MaybeSession(session)) = MaybeSession::from_request_parts(parts, state).await;

        session
            .filter(Session::is_authenticated)
            .map(AuthenticatedSession)
            .ok_or(AppError::NotAuthenticated)
    }
}
