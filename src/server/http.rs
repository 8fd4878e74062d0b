//! HTTP server with axum router and graceful shutdown.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use super::connection::{ws_handler, AppState};
use super::error::ServerError;
use crate::config::{ConnectionConfig, ServerConfig};
use crate::hub::{HubHandle, DEFAULT_QUEUE_CAPACITY};
use crate::trace::TraceController;

/// Serves the observer WebSocket endpoint and the optional web client.
pub struct ProfilerServer {
    config: ServerConfig,
    state: AppState,
}

impl ProfilerServer {
    /// Create a server with default listener and connection settings.
    #[must_use]
    pub fn new(hub: HubHandle, controller: Arc<TraceController>) -> Self {
        Self {
            config: ServerConfig::default(),
            state: AppState {
                hub,
                controller,
                connection: ConnectionConfig::default(),
                queue_capacity: DEFAULT_QUEUE_CAPACITY,
            },
        }
    }

    /// Set the listener configuration (builder pattern).
    #[must_use]
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the per-connection configuration (builder pattern).
    #[must_use]
    pub fn with_connection(mut self, connection: ConnectionConfig, queue_capacity: usize) -> Self {
        self.state.connection = connection;
        self.state.queue_capacity = queue_capacity;
        self
    }

    /// Get the configured address as a string.
    #[must_use]
    pub fn address(&self) -> String {
        self.config.addr()
    }

    /// Build the axum router with all routes and middleware.
    pub fn build_router(&self) -> Router {
        let mut router = Router::new()
            .route("/ws", get(ws_handler))
            .with_state(self.state.clone());

        if let Some(dir) = &self.config.static_dir {
            router = router.fallback_service(ServeDir::new(dir));
        }

        let router = router.layer(TraceLayer::new_for_http());

        if self.config.cors_permissive {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    /// Bind the configured address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let address = self.address();
        TcpListener::bind(&address)
            .await
            .map_err(|source| ServerError::Bind { address, source })
    }

    /// Serve on an already bound listener until `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns an error if serving fails.
    pub async fn serve(
        self,
        listener: TcpListener,
        cancel: CancellationToken,
    ) -> Result<(), ServerError> {
        let app = self.build_router();

        if let Ok(addr) = listener.local_addr() {
            tracing::info!(address = %addr, "Profiler server listening");
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel.cancelled().await;
                tracing::info!("Profiler server shutting down gracefully");
            })
            .await?;
        Ok(())
    }
}
