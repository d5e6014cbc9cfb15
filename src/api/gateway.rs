//! Gateway passthrough routes
//!
//! Every registered operation is served by the same handler.

use std::collections::HashMap;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::AppState;
use crate::auth::{AuthenticatedSession, active_tenant_id, ensure_fresh_tokens};
use crate::error::AppError;
use crate::gateway::{OPERATIONS, Operation, OperationArgs};

/// Create gateway router
///
/// Routes:
/// - GET /operations - Registry listing
/// - GET <operation route> - One per registered operation
pub fn gateway_router() -> Router<AppState> {
    OPERATIONS.iter().fold(
        Router::new().route("/operations", get(list_operations)),
        |router, operation| {
            router.route(
                operation.route,
                get(
                    move |state: State<AppState>,
                          session: AuthenticatedSession,
                          query: Query<HashMap<String, String>>| {
                        invoke_operation(operation, state, session, query)
                    },
                ),
            )
        },
    )
}

/// GET /operations
async fn list_operations() -> Json<&'static [Operation]> {
    Json(OPERATIONS)
}

/// GET <operation route>
///
/// # Steps
/// 1. Validate caller parameters against the operation schema
/// 2. Refresh the token set if it has expired
/// 3. Call upstream for the active tenant
/// 4. Relay the body unchanged
async fn invoke_operation(
    operation: &'static Operation,
    State(state): State<AppState>,
    AuthenticatedSession(mut session): AuthenticatedSession,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    let args = OperationArgs::from_query(operation, &params)?;

    ensure_fresh_tokens(&state, &mut session).await?;
    let tenant_id = active_tenant_id(Some(&session))?;
    let access_token = session
        .authorization
        .as_ref()
        .map(|auth| auth.token_set.access_token.as_str())
        .ok_or(AppError::NotAuthenticated)?;

    tracing::debug!(
        operation = operation.name,
        tenant_id = %tenant_id,
        "Invoking gateway operation"
    );

    let body = state
        .gateway
        .invoke(operation, &tenant_id, access_token, &args)
        .await?;

    let content_type = body
        .content_type
        .unwrap_or_else(|| "application/json".to_string());

    Ok(([(header::CONTENT_TYPE, content_type)], body.bytes).into_response())
}
