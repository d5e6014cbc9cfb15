//! OAuth authentication against the accounting provider
//!
//! Handles:
//! - Authorization code flow and token refresh
//! - Server-side sessions behind a signed cookie
//! - Active tenant selection

mod flow;
mod middleware;
mod oauth;
pub mod session;
pub mod tenant;
pub mod tokens;

pub use flow::AuthorizationFlow;
pub use middleware::{AuthenticatedSession, MaybeSession, session_from_headers};
pub use oauth::auth_router;
pub use session::{Authorization, Session, SessionStore};
pub use tenant::{Tenant, TenantId, active_tenant_id};

use crate::AppState;
use crate::error::AppError;
use crate::gateway::{UpstreamError, UpstreamErrorKind};

/// Refresh the session's token set if it has expired
///
/// The refreshed tokens are written back to the session store.
///
/// # Errors
/// - `NotAuthenticated` if the session has no authorization
/// - `Upstream` with kind `auth_expired` if the refresh fails
pub async fn ensure_fresh_tokens(state: &AppState, session: &mut Session) -> Result<(), AppError> {
    let authorization = session
        .authorization
        .as_mut()
        .ok_or(AppError::NotAuthenticated)?;

    if !authorization.token_set.is_expired() {
        return Ok(());
    }

    tracing::info!(session_id = %session.id, "Access token expired, refreshing");

    let refreshed = match state.auth_flow.refresh(&authorization.token_set).await {
        Ok(token_set) => token_set,
        Err(error) => {
            crate::metrics::AUTH_FLOWS_TOTAL
                .with_label_values(&["refresh", "failure"])
                .inc();
            return Err(UpstreamError::new(
                UpstreamErrorKind::AuthExpired,
                "token_refresh",
                error.to_string(),
            )
            .into());
        }
    };

    match tokens::decode_claims(&refreshed.access_token) {
        Ok(claims) => authorization.decoded_access_token = claims,
        Err(error) => tracing::warn!(%error, "Refreshed access token could not be decoded"),
    }
    authorization.token_set = refreshed;

    crate::metrics::AUTH_FLOWS_TOTAL
        .with_label_values(&["refresh", "success"])
        .inc();

    state.sessions.save(session.clone()).await;
    Ok(())
}
