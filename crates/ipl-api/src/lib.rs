//! ipl-api: the HTTP surface of the ip-labels action service
//!
//! | Route            | Purpose                                   |
//! |------------------|-------------------------------------------|
//! | `POST /execute`  | run an action request from the platform   |
//! | `GET /manifest`  | actions and params offered to the platform |
//! | `GET /health`    | liveness and version                      |
//! | `GET /metrics`   | prometheus text format                    |
pub mod config;
pub mod handlers;
pub mod metrics;
pub mod middleware;

pub use config::{ServiceConfig, StartupError};
pub use metrics::Metrics;

use axum::{
    routing::{get, post},
    Router,
};
use ipl_platform::{HttpPlatformFactory, PlatformFactory};
use ipl_share::{MountedShareConnector, ShareConnector};
use std::sync::Arc;

/// Shared by every request; nothing in here is mutated per request except
/// the metrics counters.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub connector: Arc<dyn ShareConnector>,
    pub platforms: Arc<dyn PlatformFactory>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        config: ServiceConfig,
        connector: Arc<dyn ShareConnector>,
        platforms: Arc<dyn PlatformFactory>,
    ) -> Result<Self, StartupError> {
        let metrics = Metrics::new().map_err(|e| StartupError {
            code: "ERR_METRICS",
            message: e.to_string(),
        })?;
        Ok(Self {
            config: Arc::new(config),
            connector,
            platforms,
            metrics,
        })
    }

    /// Production wiring: mounted shares and the platform REST API
    pub fn from_config(config: ServiceConfig) -> Result<Self, StartupError> {
        let connector = Arc::new(MountedShareConnector::new(config.share_root.clone()));
        let platforms = HttpPlatformFactory::new(config.platform_timeout()).map_err(|e| StartupError {
            code: "ERR_HTTP_CLIENT",
            message: e.to_string(),
        })?;
        Self::new(config, connector, Arc::new(platforms))
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/execute", post(handlers::execute))
        .route("/manifest", get(handlers::manifest))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .layer(axum::middleware::from_fn(middleware::log_failures))
        .layer(middleware::trace())
        .layer(middleware::cors())
        .with_state(state)
}
