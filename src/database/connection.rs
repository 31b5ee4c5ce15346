//! Connection pool management for SQL Server.

use crate::config::{ConnectionSource, DatabaseConfig, PoolConfig};
use crate::error::ServerError;
use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use tiberius::{AuthMethod, Client, Config, EncryptionLevel};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, error, info};

/// Type alias for a raw tiberius connection.
pub type RawConnection = Client<Compat<TcpStream>>;

/// Type alias for the connection pool.
pub type ConnectionPool = Pool<ConnectionManager>;

/// Type alias for a pooled connection.
pub type PooledConn<'a> = PooledConnection<'a, ConnectionManager>;

/// bb8 connection manager opening tiberius clients over TCP.
#[derive(Clone)]
pub struct ConnectionManager {
    config: Config,
}

impl ConnectionManager {
    /// Create a manager from a prepared tiberius configuration.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Open a single connection: TCP connect followed by the TDS handshake.
    async fn open(&self) -> Result<RawConnection, tiberius::error::Error> {
        let address = self.config.get_addr();
        debug!("Opening connection to {}", address);

        let tcp = TcpStream::connect(&address).await?;
        tcp.set_nodelay(true)?;

        let client = Client::connect(self.config.clone(), tcp.compat_write()).await?;

        debug!("Connection established");
        Ok(client)
    }
}

#[async_trait]
impl bb8::ManageConnection for ConnectionManager {
    type Connection = RawConnection;
    type Error = tiberius::error::Error;

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        self.open().await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// Forwards connection failures from bb8's background tasks to the log.
#[derive(Debug, Clone, Copy)]
struct LogErrorSink;

impl bb8::ErrorSink<tiberius::error::Error> for LogErrorSink {
    fn sink(&self, error: tiberius::error::Error) {
        error!("Failed to open database connection: {}", error);
    }

    fn boxed_clone(&self) -> Box<dyn bb8::ErrorSink<tiberius::error::Error>> {
        Box::new(*self)
    }
}

/// Create a tiberius Config from DatabaseConfig.
///
/// Auto-commit is the server default and nothing here opens a transaction.
pub fn create_client_config(db_config: &DatabaseConfig) -> Result<Config, ServerError> {
    let mut config = match &db_config.source {
        ConnectionSource::ConnectionString(conn_str) => Config::from_ado_string(conn_str)
            .map_err(|e| {
                // The parser error may quote the input; keep it out of the message.
                debug!("SqlConnectionString rejected: {}", e);
                ServerError::config("SqlConnectionString could not be parsed")
            })?,
        ConnectionSource::Parts {
            host,
            port,
            database,
            username,
            password,
        } => {
            let mut config = Config::new();
            config.host(host);
            config.port(*port);
            config.database(database);
            config.authentication(AuthMethod::sql_server(username, password));

            if db_config.encrypt {
                config.encryption(EncryptionLevel::Required);
            } else {
                config.encryption(EncryptionLevel::Off);
            }

            if db_config.trust_server_certificate {
                config.trust_cert();
            }

            config
        }
    };

    config.application_name(&db_config.application_name);

    Ok(config)
}

/// Create a connection pool from configuration.
///
/// Connections are opened lazily, so the service starts even while the
/// database is unreachable; the first request then reports the failure.
pub fn create_pool(db_config: &DatabaseConfig) -> Result<ConnectionPool, ServerError> {
    let client_config = create_client_config(db_config)?;
    let pool_config = &db_config.pool;

    info!(
        "Creating connection pool for {} (driver: {}, min idle: {}, max: {})",
        client_config.get_addr(),
        db_config.driver,
        pool_config.min_idle,
        pool_config.max_connections
    );

    let min_idle = (pool_config.min_idle > 0).then_some(pool_config.min_idle);

    let pool = Pool::builder()
        .max_size(pool_config.max_connections)
        .min_idle(min_idle)
        .connection_timeout(pool_config.connection_timeout)
        .idle_timeout(Some(pool_config.idle_timeout))
        .retry_connection(false)
        .error_sink(Box::new(LogErrorSink))
        .build_unchecked(ConnectionManager::new(client_config));

    Ok(pool)
}

/// Check a connection out of the pool.
///
/// With no idle connection and room in the pool, a fresh connection is opened
/// directly and handed to the pool, so a connect failure reaches the caller as
/// soon as it happens rather than after the pool's checkout timeout. No retry.
pub async fn checkout<'a>(
    pool: &'a ConnectionPool,
    pool_config: &PoolConfig,
) -> Result<PooledConn<'a>, ServerError> {
    let state = pool.state();
    if state.idle_connections == 0 && state.connections < pool_config.max_connections {
        let connect = pool.dedicated_connection();
        let conn = tokio::time::timeout(pool_config.connection_timeout, connect)
            .await
            .map_err(|_| ServerError::timeout("Timed out connecting to the database"))??;

        if pool.add(conn).is_err() {
            debug!("Pool at capacity, waiting for a pooled connection");
        }
    }

    Ok(pool.get().await?)
}

/// Get pool health status.
pub fn pool_status(pool: &ConnectionPool, max_size: u32) -> PoolStatus {
    let state = pool.state();
    PoolStatus {
        connections: state.connections,
        idle_connections: state.idle_connections,
        max_size,
    }
}

/// Pool status information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PoolStatus {
    /// Connections currently open (idle or checked out).
    pub connections: u32,
    /// Open connections waiting in the pool.
    pub idle_connections: u32,
    /// Maximum allowed connections.
    pub max_size: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn test_config(source: ConnectionSource) -> DatabaseConfig {
        DatabaseConfig {
            driver: "ODBC Driver 18 for SQL Server".to_string(),
            source,
            pool: PoolConfig {
                connection_timeout: Duration::from_millis(200),
                ..PoolConfig::default()
            },
            encrypt: false,
            trust_server_certificate: true,
            application_name: "test".to_string(),
        }
    }

    fn parts() -> ConnectionSource {
        ConnectionSource::Parts {
            host: "127.0.0.1".to_string(),
            port: 1,
            database: "Budget".to_string(),
            username: "report".to_string(),
            password: "secret".to_string(),
        }
    }

    #[test]
    fn test_client_config_from_parts() {
        let config = create_client_config(&test_config(parts())).unwrap();
        assert_eq!(config.get_addr(), "127.0.0.1:1");
    }

    #[test]
    fn test_client_config_from_ado_string() {
        let config = create_client_config(&test_config(ConnectionSource::ConnectionString(
            "server=tcp:sql.internal,14330;database=Budget;user id=report;password=pw;TrustServerCertificate=true".to_string(),
        )))
        .unwrap();
        assert_eq!(config.get_addr(), "sql.internal:14330");
    }

    #[tokio::test]
    async fn test_pool_is_lazy() {
        let pool = create_pool(&test_config(parts())).unwrap();
        let status = pool_status(&pool, 10);
        assert_eq!(status.connections, 0);
        assert_eq!(status.max_size, 10);
    }

    #[tokio::test]
    async fn test_checkout_failure_surfaces_immediately() {
        let mut config = test_config(parts());
        config.pool.connection_timeout = Duration::from_secs(5);
        let pool = create_pool(&config).unwrap();

        let start = Instant::now();
        let err = match checkout(&pool, &config.pool).await {
            Ok(_) => panic!("nothing listens on port 1"),
            Err(e) => e,
        };

        assert!(
            start.elapsed() < Duration::from_secs(2),
            "connect failure took {:?}",
            start.elapsed()
        );
        assert!(
            matches!(err, ServerError::Connection { .. }),
            "unexpected error: {:?}",
            err
        );
        assert!(!err.is_client_error());
        assert!(!err.user_message().contains("secret"));

        // A second attempt fails the same way; nothing is cached.
        let start = Instant::now();
        let err = match checkout(&pool, &config.pool).await {
            Ok(_) => panic!("nothing listens on port 1"),
            Err(e) => e,
        };
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(matches!(err, ServerError::Connection { .. }));
    }
}
