//! LedgerLink binary entry point

use ledgerlink::{AppState, config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application entry point
///
/// # Setup
/// 1. Load configuration (fails fast on missing credentials)
/// 2. Initialize tracing/logging from it
/// 3. Initialize AppState
/// 4. Build Axum router
/// 5. Start background session purge
/// 6. Start HTTP server
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration
    let config = match config::AppConfig::load() {
        Ok(config) => config,
        Err(error) => {
            init_tracing(&config::LoggingConfig::default());
            tracing::error!(%error, "Refusing to start");
            return Err(error.into());
        }
    };

    // 2. Initialize tracing/logging
    init_tracing(&config.logging);
    tracing::info!("Starting LedgerLink...");
    tracing::info!(
        domain = %config.server.domain,
        protocol = %config.server.protocol,
        redirect_uri = %config.provider.redirect_uri,
        static_dir = ?config.server.static_dir,
        "Configuration loaded"
    );

    // 3. Initialize metrics
    ledgerlink::metrics::init_metrics();

    // 4. Initialize application state
    let state = AppState::new(config.clone())?;

    // 5. Build Axum router
    let app = ledgerlink::build_router(state.clone());

    // 6. Start background tasks
    spawn_session_purge_task(state);

    // 7. Start HTTP server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("App listening on {}", addr);
    tracing::info!("Public URL: {}", config.server.base_url());

    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(logging: &config::LoggingConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging.filter_directive().into());

    if logging.is_json() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}

/// Spawn background task removing expired sessions
fn spawn_session_purge_task(state: AppState) {
    let interval_secs = state.config.session.purge_interval_seconds.max(1);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));

        // Consume the immediate first tick.
        interval.tick().await;

        loop {
            interval.tick().await;

            let purged = state.sessions.purge_expired().await;
            if purged > 0 {
                tracing::info!(purged, "Expired sessions purged");
            }
        }
    });

    tracing::info!("Session purge task spawned");
}
