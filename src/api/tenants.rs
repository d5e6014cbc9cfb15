//! Tenant listing and switching

use axum::{
    Json, Router,
    extract::{Query, State, rejection::QueryRejection},
    routing::get,
};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::auth::{AuthenticatedSession, Session, Tenant, TenantId};
use crate::error::AppError;

/// Create tenant router
///
/// Routes:
/// - GET /tenants - Granted tenants and the active one
/// - GET /tenants/select?tenant_id= - Switch the active tenant
pub fn tenants_router() -> Router<AppState> {
    Router::new()
        .route("/tenants", get(list_tenants))
        .route("/tenants/select", get(select_tenant))
}

#[derive(Debug, Serialize)]
struct TenantsResponse {
    active_tenant_id: TenantId,
    tenants: Vec<Tenant>,
}

impl TenantsResponse {
    fn from_session(session: &Session) -> Result<Self, AppError> {
        let authorization = session
            .authorization
            .as_ref()
            .ok_or(AppError::NotAuthenticated)?;

        Ok(Self {
            active_tenant_id: authorization.active_tenant.tenant_id.clone(),
            tenants: authorization.all_tenants.clone(),
        })
    }
}

/// GET /tenants
async fn list_tenants(
    AuthenticatedSession(session): AuthenticatedSession,
) -> Result<Json<TenantsResponse>, AppError> {
    TenantsResponse::from_session(&session).map(Json)
}

#[derive(Debug, Deserialize)]
struct SelectTenantQuery {
    tenant_id: String,
}

/// GET /tenants/select
async fn select_tenant(
    State(state): State<AppState>,
    AuthenticatedSession(mut session): AuthenticatedSession,
    query: Result<Query<SelectTenantQuery>, QueryRejection>,
) -> Result<Json<TenantsResponse>, AppError> {
    let Query(query) = query.map_err(|rejection| AppError::Validation(rejection.body_text()))?;
    let tenant_id = TenantId(query.tenant_id);
    let authorization = session
        .authorization
        .as_mut()
        .ok_or(AppError::NotAuthenticated)?;
    authorization.select_tenant(&tenant_id)?;

    tracing::info!(session_id = %session.id, tenant_id = %tenant_id, "Active tenant switched");

    let response = TenantsResponse::from_session(&session)?;
    state.sessions.save(session).await;

    Ok(Json(response))
}
