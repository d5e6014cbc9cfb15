//! Post-login greeting

use axum::{
    extract::State,
    response::{IntoResponse, Response},
};

use crate::AppState;
use crate::auth::{MaybeSession, active_tenant_id, ensure_fresh_tokens};
use crate::error::AppError;
use crate::gateway::{OperationArgs, registry};

/// GET /organisation
///
/// Confirms the session works by greeting the active organisation.
/// Failures render the generic failure text.
pub async fn organisation(
    State(state): State<AppState>,
    MaybeSession(session): MaybeSession,
) -> Response {
    match greeting(&state, session).await {
        Ok(text) => text.into_response(),
        Err(error) => error.into_failure_text(),
    }
}

async fn greeting(
    state: &AppState,
    session: Option<crate::auth::Session>,
) -> Result<String, AppError> {
    let mut session = session.ok_or(AppError::NotAuthenticated)?;
    ensure_fresh_tokens(state, &mut session).await?;

    let tenant_id = active_tenant_id(Some(&session))?;
    let access_token = session
        .authorization
        .as_ref()
        .map(|auth| auth.token_set.access_token.as_str())
        .ok_or(AppError::NotAuthenticated)?;

    let operation = registry::find("organisations")
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("organisations is not registered")))?;
    let body = state
        .gateway
        .invoke(operation, &tenant_id, access_token, &OperationArgs::default())
        .await?;

    let payload: serde_json::Value = serde_json::from_slice(&body.bytes)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("organisation body: {e}")))?;
    let name = payload["Organisations"][0]["Name"]
        .as_str()
        .ok_or_else(|| AppError::NotFound("organisation has no name".to_string()))?;

    Ok(format!("Hello, {name}"))
}
