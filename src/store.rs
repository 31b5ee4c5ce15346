//! Report data access.
//!
//! Handlers talk to a [`ReportStore`] rather than to the pool directly. The
//! SQL Server store runs the two report statements; the unconfigured store
//! stands in when database settings are missing so every request fails with a
//! configuration error before any network call.

use crate::config::{DatabaseConfig, PoolConfig};
use crate::constants::LOG_QUERY_TRUNCATE_LENGTH;
use crate::database::{
    checkout, create_pool, pool_status, truncate_for_log, ConnectionPool, PoolStatus,
    ReportQueries, ReportRow, ResultSet,
};
use crate::error::ServerError;
use crate::report::ReportParams;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

/// Source of budget names and monthly report rows.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Distinct, non-empty budget names in ascending order.
    async fn budget_names(&self) -> Result<Vec<String>, ServerError>;

    /// Rows produced by the monthly report procedure.
    async fn monthly_report(&self, params: &ReportParams) -> Result<Vec<ReportRow>, ServerError>;

    /// Snapshot of store health. Must not touch the network.
    fn health(&self) -> StoreHealth;
}

/// Shared store handle.
pub type SharedStore = Arc<dyn ReportStore>;

/// Health information reported by `/health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreHealth {
    /// Whether database settings were loaded.
    pub configured: bool,

    /// Pool counters, when a pool exists.
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub pool: Option<PoolStatus>,
}

/// Store backed by a SQL Server connection pool.
pub struct SqlServerStore {
    pool: ConnectionPool,
    queries: ReportQueries,
    pool_config: PoolConfig,
}

impl SqlServerStore {
    /// Create a store with a lazily-connecting pool.
    pub fn new(db_config: &DatabaseConfig, queries: ReportQueries) -> Result<Self, ServerError> {
        let pool = create_pool(db_config)?;
        Ok(Self::with_pool(pool, queries, &db_config.pool))
    }

    /// Create a store around an existing pool built from `pool_config`.
    pub fn with_pool(
        pool: ConnectionPool,
        queries: ReportQueries,
        pool_config: &PoolConfig,
    ) -> Self {
        Self {
            pool,
            queries,
            pool_config: pool_config.clone(),
        }
    }

    /// Run one statement on a pooled connection and read its first result set.
    ///
    /// The connection goes back to the pool when the guard drops, on success
    /// and on every error path.
    async fn run(&self, sql: &str, params: &[&str]) -> Result<ResultSet, ServerError> {
        let start = Instant::now();
        debug!("Executing: {}", truncate_for_log(sql, LOG_QUERY_TRUNCATE_LENGTH));

        let mut conn = checkout(&self.pool, &self.pool_config).await?;

        let bound: Vec<&dyn tiberius::ToSql> =
            params.iter().map(|p| p as &dyn tiberius::ToSql).collect();
        let stream = conn.query(sql, &bound).await?;
        let result = ResultSet::from_stream(stream).await?;

        debug!(
            "Statement completed: {} rows in {} ms",
            result.rows.len(),
            start.elapsed().as_millis()
        );

        Ok(result)
    }
}

#[async_trait]
impl ReportStore for SqlServerStore {
    async fn budget_names(&self) -> Result<Vec<String>, ServerError> {
        let result = self.run(self.queries.budget_names_sql(), &[]).await?;
        Ok(result.first_column_strings())
    }

    async fn monthly_report(&self, params: &ReportParams) -> Result<Vec<ReportRow>, ServerError> {
        let result = self
            .run(self.queries.report_sql(), &params.positional())
            .await?;
        Ok(result.into_report_rows())
    }

    fn health(&self) -> StoreHealth {
        StoreHealth {
            configured: true,
            pool: Some(pool_status(&self.pool, self.pool_config.max_connections)),
        }
    }
}

/// Store used when database configuration could not be loaded.
pub struct UnconfiguredStore {
    reason: String,
}

impl UnconfiguredStore {
    /// Create a store that fails every call with `reason`.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn fail<T>(&self) -> Result<T, ServerError> {
        Err(ServerError::config(self.reason.clone()))
    }
}

#[async_trait]
impl ReportStore for UnconfiguredStore {
    async fn budget_names(&self) -> Result<Vec<String>, ServerError> {
        self.fail()
    }

    async fn monthly_report(&self, _params: &ReportParams) -> Result<Vec<ReportRow>, ServerError> {
        self.fail()
    }

    fn health(&self) -> StoreHealth {
        StoreHealth {
            configured: false,
            pool: None,
        }
    }
}

/// Build the store for the loaded configuration.
///
/// Missing or unusable database settings are logged and replaced by an
/// [`UnconfiguredStore`]; the service keeps running and answers 500.
pub fn build_store(
    database: &Result<DatabaseConfig, ServerError>,
    queries: ReportQueries,
) -> SharedStore {
    let db_config = match database {
        Ok(db_config) => db_config,
        Err(e) => {
            error!("Database is not configured: {}", e);
            return Arc::new(UnconfiguredStore::new(e.to_string()));
        }
    };

    match SqlServerStore::new(db_config, queries) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Database configuration is unusable: {}", e);
            Arc::new(UnconfiguredStore::new(e.to_string()))
        }
    }
}
