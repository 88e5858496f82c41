//! HTTP control surface for workspace-sync
//!
//! Exposes the boundary collaborators consume: sync status queries, manual
//! sync triggers, single-record sync with a direction, a webhook receiver,
//! and monitor reports. Webhook payload signature verification is the
//! deployment's ingress responsibility, not implemented here.

pub mod router;

pub use router::{build_router, AppState};

use std::future::Future;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::AppError;

/// HTTP server wrapper
pub struct Server {
    config: ServerConfig,
    state: AppState,
}

impl Server {
    /// Create a server
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Run until the shutdown future resolves
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<(), AppError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to bind {}: {}", addr, e)))?;

        info!(addr = %addr, "Control surface listening");

        axum::serve(listener, build_router(self.state))
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| AppError::Internal(format!("Server error: {}", e)))
    }
}
