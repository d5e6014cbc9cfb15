//! LedgerLink - OAuth session backend and accounting API passthrough
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - OAuth routes (/connect, /callback)                       │
//! │  - Gateway passthrough routes (/get*)                       │
//! │  - Tenant switching, metrics                                │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Auth + Gateway Layer                        │
//! │  - Authorization flow, token refresh                        │
//! │  - In-memory session store                                  │
//! │  - Operation registry, upstream client                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers for gateway, tenants and metrics
//! - `auth`: OAuth flow, sessions, tokens, tenant selection
//! - `gateway`: Operation registry and upstream client
//! - `config`: Configuration management
//! - `error`: Error types

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod metrics;

use std::sync::Arc;

/// Application state shared across all handlers
///
/// Cloned for each request; everything inside is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Live sessions, keyed by the id in the signed cookie
    pub sessions: Arc<auth::SessionStore>,

    /// Authorization Flow Controller
    pub auth_flow: Arc<auth::AuthorizationFlow>,

    /// Upstream Gateway
    pub gateway: Arc<gateway::Gateway>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Build the shared HTTP client with the upstream timeout
    /// 2. Resolve the session secret
    /// 3. Construct the flow controller and gateway
    ///
    /// # Errors
    /// Returns error if the HTTP client or gateway cannot be built
    pub fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        let http_client = reqwest::Client::builder()
            .user_agent(concat!("LedgerLink/", env!("CARGO_PKG_VERSION")))
            .timeout(config.upstream.timeout())
            .build()
            .map_err(|e| error::AppError::Internal(e.into()))?;

        let secret = match &config.session.secret {
            Some(secret) => secret.clone().into_bytes(),
            None => {
                tracing::warn!(
                    "session.secret is not set; using a random secret, sessions will not survive a restart"
                );
                random_secret()
            }
        };
        let sessions = auth::SessionStore::new(secret, config.session.max_age);

        let auth_flow = auth::AuthorizationFlow::new(config.provider.clone(), http_client.clone());
        let gateway = gateway::Gateway::new(&config.provider, http_client)?;

        tracing::info!(
            operations = gateway::OPERATIONS.len(),
            timeout_seconds = config.upstream.timeout_seconds,
            "Application state initialized successfully"
        );

        Ok(Self {
            config: Arc::new(config),
            sessions: Arc::new(sessions),
            auth_flow: Arc::new(auth_flow),
            gateway: Arc::new(gateway),
        })
    }
}

fn random_secret() -> Vec<u8> {
    use rand::RngCore;

    let mut secret = vec![0u8; 64];
    rand::thread_rng().fill_bytes(&mut secret);
    secret
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments. When `server.static_dir`
/// is set, paths no route claims are served from it.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use tower_http::services::ServeDir;
    use tower_http::trace::TraceLayer;

    let cors_layer = build_cors_layer(&state.config.server);

    let mut router = Router::new()
        .route("/health", axum::routing::get(health_check))
        .route("/organisation", axum::routing::get(api::organisation))
        .merge(auth::auth_router())
        .merge(api::tenants_router())
        .merge(api::gateway_router());

    if let Some(dir) = &state.config.server.static_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
        .merge(api::metrics_router())
}

fn build_cors_layer(server: &config::ServerConfig) -> tower_http::cors::CorsLayer {
    use axum::http::HeaderValue;
    use tower_http::cors::{Any, CorsLayer};

    if !server.protocol.eq_ignore_ascii_case("https") {
        return CorsLayer::permissive();
    }

    let allowed_origin = server.base_url();
    match HeaderValue::from_str(&allowed_origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin([origin])
            .allow_methods(Any)
            .allow_headers(Any),
        Err(error) => {
            tracing::error!(
                %error,
                origin = %allowed_origin,
                "Failed to parse CORS origin from server base URL; denying cross-origin requests"
            );
            CorsLayer::new().allow_methods(Any).allow_headers(Any)
        }
    }
}

async fn health_check() -> &'static str {
    "OK"
}
