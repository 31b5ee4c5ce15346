//! HTTP server assembly: shared state, routes, middleware, and serving with
//! graceful shutdown.

use crate::config::HttpConfig;
use crate::constants::MAX_REQUEST_BODY_BYTES;
use crate::handlers;
use crate::shutdown::SharedShutdownController;
use crate::store::SharedStore;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::future::IntoFuture;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    /// Report data source.
    pub store: SharedStore,
}

impl AppState {
    /// Create application state around a store.
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }
}

/// Build the application router.
///
/// Routes:
/// - `GET /api/get_budget_names`
/// - `POST /api/get_report` (also mounted at `/api/get_budget_report`)
/// - `GET /health`
///
/// When a static directory is configured it serves every other path.
pub fn build_router(state: AppState, config: &HttpConfig) -> Router {
    let mut router = Router::new()
        .route("/api/get_budget_names", get(handlers::get_budget_names))
        .route("/api/get_report", post(handlers::get_report))
        .route("/api/get_budget_report", post(handlers::get_report))
        .route("/health", get(handlers::health))
        .with_state(state);

    if let Some(dir) = &config.static_dir {
        info!("Serving static files from {}", dir.display());
        router = router.fallback_service(ServeDir::new(dir));
    }

    if config.enable_cors {
        router = router.layer(CorsLayer::permissive());
    }

    router.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES)),
    )
}

/// Serve `router` on `listener` until shutdown.
///
/// After the shutdown signal the server stops accepting connections and waits
/// for in-flight requests, but no longer than the controller's drain timeout.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: SharedShutdownController,
) -> Result<(), anyhow::Error> {
    if let Ok(addr) = listener.local_addr() {
        info!("HTTP server listening on http://{}", addr);
    }

    let mut signal = shutdown.signal();
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        signal.recv().await;
        info!("HTTP server received shutdown signal, draining requests");
    });

    tokio::select! {
        result = server.into_future() => {
            result?;
            info!("HTTP server stopped");
        }
        _ = shutdown.drain_deadline() => {
            warn!(
                "Drain timeout of {:?} elapsed with requests still in flight",
                shutdown.drain_timeout()
            );
        }
    }

    Ok(())
}
