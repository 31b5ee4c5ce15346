//! Centralized constants for the budget report API.
//!
//! Default values and fixed names used throughout the codebase, kept in one
//! place so they are easy to find and change.

use std::time::Duration;

// =============================================================================
// Timeout Constants
// =============================================================================

/// Default connection checkout timeout in seconds.
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 30;

/// Default connection checkout timeout as Duration.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration =
    Duration::from_secs(DEFAULT_CONNECTION_TIMEOUT_SECS);

/// Default idle timeout for pooled connections in seconds.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

// =============================================================================
// Connection Pool Constants
// =============================================================================

/// Default minimum idle connections kept by the pool.
pub const DEFAULT_MIN_IDLE_CONNECTIONS: u32 = 0;

/// Default maximum connections in pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Default SQL Server port.
pub const DEFAULT_SQL_PORT: u16 = 1433;

/// Driver name recorded in assembled connection strings.
pub const DEFAULT_DB_DRIVER: &str = "ODBC Driver 18 for SQL Server";

/// Application name reported to SQL Server.
pub const APPLICATION_NAME: &str = "budget-report-api";

// =============================================================================
// Report Query Constants
// =============================================================================

/// Stored procedure producing the monthly budget report.
pub const DEFAULT_REPORT_PROCEDURE: &str = "dbo.usp_GetMonthlyBudgetReport";

/// Table listing budget categories.
pub const DEFAULT_CATEGORY_TABLE: &str = "dbo.Category";

/// Column holding the budget name.
pub const DEFAULT_BUDGET_COLUMN: &str = "BudgetName";

/// Separator used when a list of budget names is bound as one parameter.
pub const BUDGET_NAME_SEPARATOR: &str = ",";

// =============================================================================
// HTTP Constants
// =============================================================================

/// Default bind address.
pub const DEFAULT_HTTP_HOST: &str = "0.0.0.0";

/// Default bind port.
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Maximum accepted request body in bytes.
pub const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

// =============================================================================
// Shutdown Constants
// =============================================================================

/// Default shutdown drain timeout in seconds.
pub const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 30;

/// Default shutdown drain timeout as Duration.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(DEFAULT_DRAIN_TIMEOUT_SECS);

// =============================================================================
// Logging Constants
// =============================================================================

/// Default log filter when RUST_LOG is unset.
pub const DEFAULT_LOG_FILTER: &str = "warn,budget_report_api=info,tower_http=info";

/// Truncation length for SQL text in logs.
pub const LOG_QUERY_TRUNCATE_LENGTH: usize = 200;

// =============================================================================
// Client-Facing Messages
// =============================================================================

/// Body returned when a required report parameter is absent.
pub const MSG_MISSING_PARAMETERS: &str = "Missing required parameters in request body.";

/// Body returned when the request body is not valid JSON.
pub const MSG_INVALID_JSON: &str = "Invalid JSON format in request body.";

/// Body returned for configuration failures.
pub const MSG_CONFIGURATION_ERROR: &str = "Server configuration error.";

/// Body returned for every other server-side failure.
pub const MSG_INTERNAL_ERROR: &str = "An internal server error occurred.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_durations() {
        assert_eq!(DEFAULT_CONNECTION_TIMEOUT, Duration::from_secs(30));
        assert_eq!(DEFAULT_DRAIN_TIMEOUT, Duration::from_secs(30));
    }

    #[test]
    fn test_pool_bounds() {
        assert!(DEFAULT_MIN_IDLE_CONNECTIONS <= DEFAULT_MAX_CONNECTIONS);
        assert!(DEFAULT_MAX_CONNECTIONS > 0);
    }
}
