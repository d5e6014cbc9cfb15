//! API layer
//!
//! HTTP handlers for:
//! - Gateway passthrough routes
//! - Session greeting and tenant switching
//! - Metrics (Prometheus)

mod gateway;
pub mod metrics;
mod organisation;
mod tenants;

pub use gateway::gateway_router;
pub use metrics::metrics_router;
pub use organisation::organisation;
pub use tenants::tenants_router;
