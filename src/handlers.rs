//! HTTP request handlers for the report endpoints.

use crate::database::ReportRow;
use crate::error::ServerError;
use crate::report::ReportRequest;
use crate::server::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use tracing::{debug, info};

/// `GET /api/get_budget_names`
///
/// Distinct budget names in ascending order as a JSON array of strings.
pub async fn get_budget_names(
    State(state): State<AppState>,
) -> Result<Json<Vec<String>>, ServerError> {
    let names = state.store.budget_names().await?;
    debug!("Returning {} budget names", names.len());
    Ok(Json(names))
}

/// `POST /api/get_report`
///
/// The body is read as raw bytes so a parse failure is reported as a 400 with
/// a fixed message instead of axum's extractor rejection.
pub async fn get_report(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Vec<ReportRow>>, ServerError> {
    let params = ReportRequest::from_body(&body)?.validate()?;

    info!(
        budget_names = %params.budget_names,
        amount_flag = %params.amount_flag,
        start_date = %params.start_date,
        end_date = %params.end_date,
        "Running monthly budget report"
    );

    let rows = state.store.monthly_report(&params).await?;
    debug!("Report returned {} rows", rows.len());
    Ok(Json(rows))
}

/// `GET /health`
///
/// Liveness plus store state. Never opens a database connection.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let store = state.store.health();
    Json(json!({
        "status": if store.configured { "healthy" } else { "degraded" },
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "database": store,
    }))
}
