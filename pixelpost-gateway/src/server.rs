//! Gateway HTTP server

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router,
    routing::{get, post},
};
use pixelpost_common::Signal;
use pixelpost_delivery::{Enqueuer, QueueService, destination::config::EnabledDestinations};
use tokio::{net::TcpListener, sync::broadcast};
use tower_http::timeout::TimeoutLayer;

use crate::{GatewayConfig, GatewayError, RateLimiter, Result, health, ingest};

/// Requests that have not been answered within this are abandoned
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything the handlers share.
#[derive(Clone)]
pub struct GatewayState {
    pub(crate) enqueuer: Enqueuer,
    pub(crate) service: Arc<QueueService>,
    pub(crate) destinations: EnabledDestinations,
    pub(crate) ingest_token: Option<Arc<str>>,
    pub(crate) limiter: Arc<RateLimiter>,
}

impl GatewayState {
    #[must_use]
    pub fn new(
        enqueuer: Enqueuer,
        service: Arc<QueueService>,
        destinations: EnabledDestinations,
        config: &GatewayConfig,
    ) -> Self {
        Self {
            enqueuer,
            service,
            destinations,
            ingest_token: config.ingest_token.as_deref().map(Arc::from),
            limiter: Arc::new(RateLimiter::new(config.rate_limit)),
        }
    }
}

pub struct GatewayServer {
    listener: TcpListener,
    router: Router,
}

impl GatewayServer {
    /// Bind the listen address and build the routes.
    ///
    /// # Errors
    ///
    /// Returns an error if binding to the configured address fails.
    pub async fn new(config: &GatewayConfig, state: GatewayState) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_address)
            .await
            .map_err(|source| GatewayError::Bind {
                address: config.listen_address.clone(),
                source,
            })?;

        tracing::info!(address = %config.listen_address, "Gateway bound successfully");

        Ok(Self {
            listener,
            router: Self::router(state),
        })
    }

    /// The routes without a listener, for serving elsewhere or testing.
    pub fn router(state: GatewayState) -> Router {
        Router::new()
            .route("/health", get(health::report))
            .route("/health/live", get(health::live))
            .route("/health/ready", get(health::ready))
            .route("/v1/events", post(ingest::enqueue))
            .with_state(state)
            .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
    }

    /// # Errors
    ///
    /// Returns an error if the listener has no local address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| GatewayError::Server(e.to_string()))
    }

    /// Serve until a shutdown signal arrives, letting in-flight requests finish.
    ///
    /// # Errors
    ///
    /// Returns an error if the server encounters a runtime error.
    pub async fn serve(self, mut shutdown: broadcast::Receiver<Signal>) -> Result<()> {
        tracing::info!("Gateway starting");

        axum::serve(
            self.listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("Gateway received shutdown signal");
        })
        .await
        .map_err(|e| GatewayError::Server(e.to_string()))?;

        tracing::info!("Gateway stopped");
        Ok(())
    }
}
