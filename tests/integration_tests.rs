//! Integration tests against a real SQL Server.
//!
//! These tests support two modes:
//! 1. **Testcontainers** (default): Automatically spins up a SQL Server container
//! 2. **External server**: Connect to existing server via MSSQL_HOST env var
//!
//! ## Running with testcontainers (requires Docker):
//! ```bash
//! cargo test --test integration_tests -- --ignored --test-threads=1
//! ```
//!
//! ## Running against external server:
//! ```bash
//! MSSQL_HOST=localhost MSSQL_PORT=1433 MSSQL_PASSWORD='yourPass' \
//!   cargo test --test integration_tests -- --ignored --test-threads=1
//! ```
//!
//! Note: SQL Server container requires ~2GB RAM and takes 30-60 seconds to start.

use budget_report_api::config::{ConnectionSource, DatabaseConfig, PoolConfig};
use budget_report_api::database::ReportQueries;
use budget_report_api::report::ReportParams;
use budget_report_api::store::{ReportStore, SqlServerStore};
use budget_report_api::ServerError;
use serial_test::serial;
use std::time::Duration;
use testcontainers::{runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::mssql_server::MssqlServer;
use tiberius::{Client, Config};
use tokio::net::TcpStream;
use tokio_util::compat::TokioAsyncWriteCompatExt;

/// Default SA password for testcontainers.
const DEFAULT_SA_PASSWORD: &str = "yourStrong(!)Password";

/// SQL Server image tag used when MSSQL_TEST_VERSION is unset.
const DEFAULT_VERSION: &str = "2022-latest";

/// Database created for the report fixtures.
const TEST_DATABASE: &str = "BudgetReportTest";

/// Check if we should use an external server (vs testcontainers).
fn use_external_server() -> bool {
    std::env::var("MSSQL_HOST").is_ok()
}

#[allow(dead_code)] // Variants held for lifetime management (Drop trait)
enum TestDatabaseSource {
    External,
    Container(Box<ContainerAsync<MssqlServer>>),
}

/// Helper struct to manage the test database connection.
struct TestDatabase {
    #[allow(dead_code)] // Held for lifetime management (Drop trait on Container)
    source: TestDatabaseSource,
    host: String,
    port: u16,
    password: String,
}

impl TestDatabase {
    /// Uses an external server if MSSQL_HOST is set, otherwise testcontainers.
    async fn new() -> Self {
        if use_external_server() {
            Self::from_external()
        } else {
            let version = std::env::var("MSSQL_TEST_VERSION")
                .unwrap_or_else(|_| DEFAULT_VERSION.to_string());
            Self::from_testcontainer(&version).await
        }
    }

    fn from_external() -> Self {
        let host = std::env::var("MSSQL_HOST").expect("MSSQL_HOST must be set");
        let port = std::env::var("MSSQL_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(1433);
        let password =
            std::env::var("MSSQL_PASSWORD").unwrap_or_else(|_| DEFAULT_SA_PASSWORD.to_string());

        eprintln!("Using external SQL Server at {}:{}", host, port);

        Self {
            source: TestDatabaseSource::External,
            host,
            port,
            password,
        }
    }

    async fn from_testcontainer(version: &str) -> Self {
        eprintln!("Starting SQL Server {} container...", version);

        let container = MssqlServer::default()
            .with_accept_eula()
            .with_tag(version)
            .start()
            .await
            .unwrap_or_else(|e| panic!("Failed to start SQL Server {} container: {}", version, e));

        let host = container.get_host().await.expect("Failed to get host");
        let port = container
            .get_host_port_ipv4(1433)
            .await
            .expect("Failed to get port");

        // Wait a bit for SQL Server to fully initialize
        tokio::time::sleep(Duration::from_secs(5)).await;

        Self {
            source: TestDatabaseSource::Container(Box::new(container)),
            host: host.to_string(),
            port,
            password: DEFAULT_SA_PASSWORD.to_string(),
        }
    }

    /// Raw tiberius client on `master`, used to build fixtures.
    async fn connect(&self) -> Client<tokio_util::compat::Compat<TcpStream>> {
        let mut config = Config::new();
        config.host(&self.host);
        config.port(self.port);
        config.authentication(tiberius::AuthMethod::sql_server("sa", &self.password));
        config.trust_cert();

        let tcp = TcpStream::connect(format!("{}:{}", self.host, self.port))
            .await
            .expect("Failed to connect to TCP");
        tcp.set_nodelay(true).expect("Failed to set TCP_NODELAY");

        Client::connect(config, tcp.compat_write())
            .await
            .expect("Failed to connect to SQL Server")
    }

    /// Store configuration pointing at the fixture database.
    fn database_config(&self, database: &str, password: &str) -> DatabaseConfig {
        DatabaseConfig {
            driver: "ODBC Driver 18 for SQL Server".to_string(),
            source: ConnectionSource::Parts {
                host: self.host.clone(),
                port: self.port,
                database: database.to_string(),
                username: "sa".to_string(),
                password: password.to_string(),
            },
            pool: PoolConfig {
                max_connections: 4,
                connection_timeout: Duration::from_secs(10),
                ..PoolConfig::default()
            },
            encrypt: true,
            trust_server_certificate: true,
            application_name: "budget-report-api-tests".to_string(),
        }
    }

    /// Create the category table, report data, and report procedure.
    async fn create_fixtures(&self) {
        let mut client = self.connect().await;

        let batches = [
            format!(
                "IF DB_ID('{db}') IS NOT NULL BEGIN \
                 ALTER DATABASE [{db}] SET SINGLE_USER WITH ROLLBACK IMMEDIATE; \
                 DROP DATABASE [{db}]; END",
                db = TEST_DATABASE
            ),
            format!("CREATE DATABASE [{}]", TEST_DATABASE),
            format!(
                "USE [{}]; \
                 CREATE TABLE dbo.Category (Id INT IDENTITY PRIMARY KEY, BudgetName NVARCHAR(100) NULL); \
                 INSERT INTO dbo.Category (BudgetName) VALUES \
                 (N'Rent'), (N'Groceries'), (NULL), (N'Utilities'), (N'Groceries'), (N''); \
                 CREATE TABLE dbo.Entry (BudgetName NVARCHAR(100) NOT NULL, EntryMonth DATE NOT NULL, \
                 Amount DECIMAL(10,2) NOT NULL, Note NVARCHAR(100) NULL); \
                 INSERT INTO dbo.Entry VALUES \
                 (N'Groceries', '2024-01-01', 120.50, NULL), \
                 (N'Groceries', '2024-02-01', 98.25, N'holiday'), \
                 (N'Rent', '2024-01-01', 900.00, NULL), \
                 (N'Groceries', '2025-01-01', 10.00, NULL);",
                TEST_DATABASE
            ),
        ];

        for batch in &batches {
            client
                .simple_query(batch.as_str())
                .await
                .expect("Fixture batch failed")
                .into_results()
                .await
                .expect("Fixture batch results failed");
        }

        // CREATE PROCEDURE must be the first statement of its batch.
        client
            .simple_query(format!("USE [{}]", TEST_DATABASE))
            .await
            .expect("USE failed")
            .into_results()
            .await
            .expect("USE results failed");

        client
            .simple_query(
                "CREATE PROCEDURE dbo.usp_GetMonthlyBudgetReport \
                     @BudgetNames NVARCHAR(MAX), @AmountFlag NVARCHAR(10), \
                     @StartDate NVARCHAR(20), @EndDate NVARCHAR(20) \
                 AS BEGIN \
                     SET NOCOUNT ON; \
                     SELECT e.BudgetName, \
                            CASE WHEN @AmountFlag = N'A' THEN e.Amount ELSE -e.Amount END AS Amount, \
                            e.EntryMonth AS [Month], \
                            e.Note \
                     FROM dbo.Entry e \
                     WHERE e.BudgetName IN (SELECT value FROM STRING_SPLIT(@BudgetNames, N',')) \
                       AND e.EntryMonth BETWEEN CAST(@StartDate AS DATE) AND CAST(@EndDate AS DATE) \
                     ORDER BY e.EntryMonth, e.BudgetName; \
                 END",
            )
            .await
            .expect("CREATE PROCEDURE failed")
            .into_results()
            .await
            .expect("CREATE PROCEDURE results failed");
    }

    async fn store(&self) -> SqlServerStore {
        self.create_fixtures().await;
        SqlServerStore::new(
            &self.database_config(TEST_DATABASE, &self.password),
            ReportQueries::default(),
        )
        .expect("Failed to create store")
    }
}

fn params(budget_names: &str, amount_flag: &str, start: &str, end: &str) -> ReportParams {
    ReportParams {
        budget_names: budget_names.to_string(),
        amount_flag: amount_flag.to_string(),
        start_date: start.to_string(),
        end_date: end.to_string(),
    }
}

// =============================================================================
// Budget Names
// =============================================================================

mod budget_name_tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires Docker"]
    #[serial]
    async fn test_budget_names_distinct_sorted_without_empties() {
        let db = TestDatabase::new().await;
        let store = db.store().await;

        let names = store.budget_names().await.expect("budget_names failed");

        assert_eq!(names, vec!["Groceries", "Rent", "Utilities"]);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    #[serial]
    async fn test_connection_is_returned_to_pool() {
        let db = TestDatabase::new().await;
        let store = db.store().await;

        for _ in 0..10 {
            store.budget_names().await.expect("budget_names failed");
        }

        let health = store.health();
        let pool = health.pool.expect("pool status");
        assert!(pool.connections <= 4);
        assert_eq!(pool.connections, pool.idle_connections);
    }
}

// =============================================================================
// Monthly Report
// =============================================================================

mod report_tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires Docker"]
    #[serial]
    async fn test_report_rows_as_strings() {
        let db = TestDatabase::new().await;
        let store = db.store().await;

        let rows = store
            .monthly_report(&params("Groceries", "A", "2024-01-01", "2024-01-31"))
            .await
            .expect("monthly_report failed");

        assert_eq!(
            serde_json::to_value(&rows).unwrap(),
            serde_json::json!([
                {"BudgetName": "Groceries", "Amount": "120.50", "Month": "2024-01-01", "Note": null}
            ])
        );
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    #[serial]
    async fn test_report_parameter_order_and_name_list() {
        let db = TestDatabase::new().await;
        let store = db.store().await;

        let rows = store
            .monthly_report(&params("Groceries,Rent", "E", "2024-01-01", "2024-12-31"))
            .await
            .expect("monthly_report failed");

        assert_eq!(rows.len(), 3);
        let names: Vec<&str> = rows[0].column_names().collect();
        assert_eq!(names, vec!["BudgetName", "Amount", "Month", "Note"]);

        let json = serde_json::to_value(&rows).unwrap();
        assert_eq!(json[0]["BudgetName"], "Groceries");
        assert_eq!(json[0]["Amount"], "-120.50");
        assert_eq!(json[1]["BudgetName"], "Rent");
        assert_eq!(json[2]["Note"], "holiday");
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    #[serial]
    async fn test_report_no_matching_rows() {
        let db = TestDatabase::new().await;
        let store = db.store().await;

        let rows = store
            .monthly_report(&params("Travel", "A", "2024-01-01", "2024-12-31"))
            .await
            .expect("monthly_report failed");

        assert!(rows.is_empty());
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    #[serial]
    async fn test_report_bad_date_is_server_error() {
        let db = TestDatabase::new().await;
        let store = db.store().await;

        let err = store
            .monthly_report(&params("Groceries", "A", "not-a-date", "2024-12-31"))
            .await
            .unwrap_err();

        assert!(!err.is_client_error());
    }
}

// =============================================================================
// Failure Mapping
// =============================================================================

mod failure_tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires Docker"]
    #[serial]
    async fn test_wrong_password_maps_to_server_error() {
        let db = TestDatabase::new().await;
        let store = SqlServerStore::new(
            &db.database_config("master", "definitely-wrong"),
            ReportQueries::default(),
        )
        .expect("Failed to create store");

        let err = store.budget_names().await.unwrap_err();

        assert!(!err.is_client_error());
        assert!(!err.user_message().contains("definitely-wrong"));
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    #[serial]
    async fn test_missing_procedure_maps_to_object_not_found() {
        let db = TestDatabase::new().await;
        let store = SqlServerStore::new(
            &db.database_config("master", &db.password),
            ReportQueries::default(),
        )
        .expect("Failed to create store");

        let err = store
            .monthly_report(&params("Groceries", "A", "2024-01-01", "2024-12-31"))
            .await
            .unwrap_err();

        assert!(matches!(err, ServerError::ObjectNotFound { .. }));
    }
}
