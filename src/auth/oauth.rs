//! Browser-facing OAuth routes
//!
//! Implements the OAuth 2.0 authorization code flow with the provider.

use axum::{
    Router,
    extract::{OriginalUri, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use axum_extra::extract::CookieJar;
use chrono::Utc;

use super::flow::AuthorizationFlow;
use super::middleware::MaybeSession;
use super::session::{PendingAuthorization, clear_session_cookie, session_cookie};
use crate::AppState;
use crate::error::AppError;

/// Create authentication router
///
/// Routes:
/// - GET / - Landing page
/// - GET /connect - Redirect to the consent page
/// - GET /callback - OAuth callback
/// - GET /disconnect - Drop the session
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/", get(landing_page))
        .route("/connect", get(connect))
        .route("/callback", get(callback))
        .route("/disconnect", get(disconnect))
}

/// 302 Found, as browsers and the provider expect from an OAuth redirect
pub(crate) fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

// =============================================================================
// Landing Page
// =============================================================================

/// GET /
async fn landing_page(State(state): State<AppState>) -> Html<String> {
    let name = html_escape::encode_text(&state.config.provider.display_name);
    Html(format!("<a href='/connect'>Connect to {name}</a>"))
}

// =============================================================================
// Authorization
// =============================================================================

/// GET /connect
///
/// # Steps
/// 1. Reuse or create the session
/// 2. Record a fresh CSRF state in it
/// 3. Redirect to the consent page
async fn connect(
    State(state): State<AppState>,
    MaybeSession(session): MaybeSession,
    jar: CookieJar,
) -> Response {
    let mut session = match session {
        Some(session) => session,
        None => state.sessions.create().await,
    };

    let csrf_state = AuthorizationFlow::generate_state();
    let consent_url = match state.auth_flow.begin_authorization(&csrf_state) {
        Ok(url) => url,
        Err(error) => return error.into_failure_text(),
    };

    session.pending_authorization = Some(PendingAuthorization::new(csrf_state));
    state.sessions.save(session.clone()).await;

    let cookie_value = match state.sessions.sign(&session.id) {
        Ok(value) => value,
        Err(error) => return error.into_failure_text(),
    };
    let jar = jar.add(session_cookie(
        &state.config.session.cookie_name,
        cookie_value,
        state.sessions.max_age_seconds(),
        state.config.should_use_secure_cookies(),
    ));

    crate::metrics::AUTH_FLOWS_TOTAL
        .with_label_values(&["connect", "redirect"])
        .inc();
    tracing::info!(session_id = %session.id, "Redirecting to consent page");

    (jar, found(consent_url.as_str())).into_response()
}

/// GET /callback
///
/// # Steps
/// 1. Match the callback to the session's pending authorization
/// 2. Exchange the code, decode tokens, fetch tenants
/// 3. Store the authorization under a rotated session id
/// 4. Redirect to /organisation
async fn callback(
    State(state): State<AppState>,
    MaybeSession(session): MaybeSession,
    OriginalUri(uri): OriginalUri,
    jar: CookieJar,
) -> Response {
    let Some(mut session) = session else {
        return AppError::AuthExchange("callback without a session".to_string())
            .into_failure_text();
    };

    let callback_url = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.to_string());
    let now = Utc::now();
    let expected_state = match &session.pending_authorization {
        Some(pending) if pending.is_stale_at(now) => {
            tracing::info!(
                session_id = %session.id,
                started_at = %pending.started_at,
                "Ignoring stale authorization request"
            );
            None
        }
        Some(pending) => Some(pending.state.clone()),
        None => None,
    };

    let authorization = match state
        .auth_flow
        .complete_authorization(&callback_url, expected_state.as_deref())
        .await
    {
        Ok(authorization) => authorization,
        Err(error) => {
            crate::metrics::AUTH_FLOWS_TOTAL
                .with_label_values(&["callback", "failure"])
                .inc();
            return error.into_failure_text();
        }
    };

    tracing::info!(
        session_id = %session.id,
        subject = %authorization.decoded_id_token.sub,
        tenants = authorization.all_tenants.len(),
        active_tenant = %authorization.active_tenant.tenant_id,
        expires_at = %authorization.token_set.expires_at,
        "Authorization completed"
    );

    session.pending_authorization = None;
    session.authorization = Some(authorization);
    let session = state.sessions.rotate(session).await;

    let cookie_value = match state.sessions.sign(&session.id) {
        Ok(value) => value,
        Err(error) => return error.into_failure_text(),
    };
    let jar = jar.add(session_cookie(
        &state.config.session.cookie_name,
        cookie_value,
        state.sessions.max_age_seconds(),
        state.config.should_use_secure_cookies(),
    ));

    crate::metrics::AUTH_FLOWS_TOTAL
        .with_label_values(&["callback", "success"])
        .inc();

    (jar, found("/organisation")).into_response()
}

// =============================================================================
// Logout
// =============================================================================

/// GET /disconnect
///
/// Drops the server-side session and clears the cookie.
async fn disconnect(
    State(state): State<AppState>,
    MaybeSession(session): MaybeSession,
    jar: CookieJar,
) -> Response {
    if let Some(session) = session {
        state.sessions.remove(&session.id).await;
        tracing::info!(session_id = %session.id, "Session removed");
    }

    let jar = jar.add(clear_session_cookie(&state.config.session.cookie_name));
    (jar, found("/")).into_response()
}
