//! Budget report API entry point.
//!
//! Loads configuration from the environment, builds the report store, and
//! serves HTTP until SIGTERM, SIGINT, or SIGHUP.

use anyhow::{Context, Result};
use budget_report_api::constants::DEFAULT_LOG_FILTER;
use budget_report_api::database::ReportQueries;
use budget_report_api::shutdown::{install_signal_handlers, new_shutdown_controller};
use budget_report_api::{build_router, build_store, serve, AppState, Config};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!(
        "{} v{} starting",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let config = Config::from_env();

    match &config.database {
        Ok(db) => info!("Database: {}", db.redacted_connection_string()),
        Err(e) => warn!("Database settings incomplete, report endpoints will fail: {}", e),
    }

    let queries = ReportQueries::new(&config.report)?;
    let store = build_store(&config.database, queries);

    let shutdown = new_shutdown_controller(&config.shutdown);
    install_signal_handlers(shutdown.clone()).await;

    let router = build_router(AppState::new(store), &config.http);

    let addr = config.http.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    serve(listener, router, shutdown).await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing subscriber with stderr output.
fn init_logging() {
    let filter = std::env::var("RUST_LOG")
        .map(EnvFilter::new)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}
