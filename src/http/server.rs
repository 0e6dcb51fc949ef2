//! HTTP server setup and lifecycle.
//!
//! # Responsibilities
//! - Build the router: mount table wrapped in the middleware pipeline
//! - Start guarded background tasks (rate window sweeper, store persistence
//!   watcher)
//! - Serve with client addresses available to the rate limiter
//! - Stop accepting on shutdown and drain in-flight requests, bounded by
//!   `SHUTDOWN_TIMEOUT_SECS`

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;

use crate::api;
use crate::config::{AppConfig, Stage};
use crate::db::Database;
use crate::http::pipeline;
use crate::lifecycle::{FailureGuard, Shutdown, ShutdownReason};
use crate::security::RateLimiter;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Database,
}

/// HTTP server for the API.
pub struct HttpServer {
    router: Router,
    config: Arc<AppConfig>,
    limiter: Arc<RateLimiter>,
    db: Database,
    shutdown: Shutdown,
    guard: FailureGuard,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration and store.
    pub fn new(config: AppConfig, db: Database, shutdown: Shutdown) -> Self {
        let config = Arc::new(config);
        let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));

        let state = AppState {
            config: config.clone(),
            db: db.clone(),
        };
        let router = pipeline::apply(
            api::mount(Router::new()).with_state(state),
            &config,
            limiter.clone(),
        );

        Self {
            router,
            config,
            limiter,
            db,
            guard: FailureGuard::new(shutdown.clone()),
            shutdown,
        }
    }

    /// The fully layered router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Guard for tasks whose failure must stop the server.
    pub fn guard(&self) -> FailureGuard {
        self.guard.clone()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Run the server until shutdown is triggered. Returns why it stopped.
    pub async fn run(self, listener: TcpListener) -> Result<ShutdownReason, std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            environment = %self.config.server.environment,
            "HTTP server starting"
        );

        if self.config.pipeline.is_enabled(Stage::RateLimit) {
            let period = Duration::from_secs(self.config.rate_limit.sweep_interval_secs);
            self.guard.spawn(
                "rate-limit-sweeper",
                self.limiter.clone().run_sweeper(period, self.shutdown.subscribe()),
            );
        }

        // A store that cannot write its snapshot stops the server.
        if self.db.is_persistent() {
            self.guard.spawn(
                "store-persistence",
                self.db.clone().watch_persistence(self.shutdown.subscribe()),
            );
        }

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        let mut stop_accepting = self.shutdown.subscribe();
        let serve = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                stop_accepting.recv().await;
            })
            .into_future();

        let drain_timeout = Duration::from_secs(self.config.server.shutdown_timeout_secs);
        let mut drain_started = self.shutdown.subscribe();
        let deadline = async move {
            drain_started.recv().await;
            tokio::time::sleep(drain_timeout).await;
        };

        tokio::select! {
            result = serve => result?,
            _ = deadline => {
                tracing::warn!(
                    timeout_secs = drain_timeout.as_secs(),
                    "Drain deadline reached, abandoning in-flight requests"
                );
            }
        }

        let reason = self.shutdown.reason().unwrap_or(ShutdownReason::Closed);
        tracing::info!(reason = %reason, "HTTP server stopped");
        Ok(reason)
    }
}
