//! Configuration management for the budget report API.
//!
//! Configuration is loaded once at startup from environment variables following
//! the 12-factor app pattern. Every loader has a `from_lookup` variant taking a
//! key lookup function so tests never touch the process environment.

use crate::constants::{
    APPLICATION_NAME, DEFAULT_BUDGET_COLUMN, DEFAULT_CATEGORY_TABLE, DEFAULT_CONNECTION_TIMEOUT,
    DEFAULT_CONNECTION_TIMEOUT_SECS, DEFAULT_DB_DRIVER, DEFAULT_HTTP_HOST, DEFAULT_HTTP_PORT,
    DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_MAX_CONNECTIONS, DEFAULT_MIN_IDLE_CONNECTIONS,
    DEFAULT_REPORT_PROCEDURE, DEFAULT_SQL_PORT,
};
use crate::error::ServerError;
use crate::shutdown::ShutdownConfig;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Full service configuration.
#[derive(Debug)]
pub struct Config {
    /// HTTP listener configuration
    pub http: HttpConfig,

    /// Names of the database objects the report endpoints use
    pub report: ReportConfig,

    /// Shutdown behaviour
    pub shutdown: ShutdownConfig,

    /// Database connection configuration, or the reason it could not be loaded.
    ///
    /// A missing database setting does not stop the process; the endpoints
    /// answer with a configuration error instead.
    pub database: Result<DatabaseConfig, ServerError>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    /// Load configuration using a custom variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            http: HttpConfig::from_lookup(&lookup),
            report: ReportConfig::from_lookup(&lookup),
            shutdown: ShutdownConfig::from_lookup(&lookup),
            database: DatabaseConfig::from_lookup(&lookup),
        }
    }
}

/// Where the SQL Server connection settings come from.
#[derive(Clone)]
pub enum ConnectionSource {
    /// Assembled from the individual `DB_*` variables.
    Parts {
        host: String,
        port: u16,
        database: String,
        username: String,
        password: String,
    },

    /// A complete ADO connection string (`SqlConnectionString`).
    ConnectionString(String),
}

impl fmt::Debug for ConnectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionSource::Parts {
                host,
                port,
                database,
                username,
                ..
            } => f
                .debug_struct("Parts")
                .field("host", host)
                .field("port", port)
                .field("database", database)
                .field("username", username)
                .field("password", &"***")
                .finish(),
            ConnectionSource::ConnectionString(_) => {
                f.debug_tuple("ConnectionString").field(&"***").finish()
            }
        }
    }
}

/// Database connection configuration.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Driver name (informational; recorded in the rendered connection string)
    pub driver: String,

    /// Server address, database, and credentials
    pub source: ConnectionSource,

    /// Connection pool configuration
    pub pool: PoolConfig,

    /// Enable TLS encryption
    pub encrypt: bool,

    /// Trust server certificate (for self-signed certs)
    pub trust_server_certificate: bool,

    /// Application name sent to SQL Server
    pub application_name: String,
}

/// Connection pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Idle connections the pool tries to keep open
    pub min_idle: u32,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// How long a request waits to check out a connection
    pub connection_timeout: Duration,

    /// Idle connection timeout
    pub idle_timeout: Duration,
}

impl DatabaseConfig {
    /// Load database configuration using a custom variable lookup.
    ///
    /// # Environment Variables
    ///
    /// ## Either
    /// - `SqlConnectionString`: complete ADO connection string
    ///
    /// ## Or (all required)
    /// - `DB_SERVER`: host, optionally with `,port` or `:port`
    /// - `DB_NAME`: database name
    /// - `DB_USER`: SQL Server login
    /// - `DB_PASSWORD`: SQL Server password
    ///
    /// ## Optional
    /// - `DB_DRIVER`: driver name (default: ODBC Driver 18 for SQL Server)
    /// - `DB_PORT`: port when not part of `DB_SERVER` (default: 1433)
    /// - `DB_ENCRYPT`: require TLS (default: true)
    /// - `DB_TRUST_CERT`: trust server certificate (default: false)
    /// - `DB_POOL_MAX`: maximum pool connections (default: 10)
    /// - `DB_POOL_MIN_IDLE`: idle connections kept open (default: 0)
    /// - `DB_CONNECT_TIMEOUT`: checkout timeout in seconds (default: 30)
    /// - `DB_IDLE_TIMEOUT`: idle connection timeout in seconds (default: 600)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ServerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let source = match get("SqlConnectionString") {
            Some(conn_str) => ConnectionSource::ConnectionString(conn_str),
            None => {
                let server = get("DB_SERVER")
                    .ok_or_else(|| ServerError::config("DB_SERVER environment variable is required"))?;
                let database = get("DB_NAME")
                    .ok_or_else(|| ServerError::config("DB_NAME environment variable is required"))?;
                let username = get("DB_USER")
                    .ok_or_else(|| ServerError::config("DB_USER environment variable is required"))?;
                let password = get("DB_PASSWORD").ok_or_else(|| {
                    ServerError::config("DB_PASSWORD environment variable is required")
                })?;

                let default_port = parse_or(get("DB_PORT"), DEFAULT_SQL_PORT);
                let (host, port) = split_server(&server, default_port)?;

                ConnectionSource::Parts {
                    host,
                    port,
                    database,
                    username,
                    password,
                }
            }
        };

        let driver = get("DB_DRIVER").unwrap_or_else(|| DEFAULT_DB_DRIVER.to_string());

        let encrypt = flag_or(get("DB_ENCRYPT"), true);
        let trust_server_certificate = flag_or(get("DB_TRUST_CERT"), false);

        let max_connections = parse_or(get("DB_POOL_MAX"), DEFAULT_MAX_CONNECTIONS).max(1);
        let min_idle =
            parse_or(get("DB_POOL_MIN_IDLE"), DEFAULT_MIN_IDLE_CONNECTIONS).min(max_connections);
        let connection_timeout_secs =
            parse_or(get("DB_CONNECT_TIMEOUT"), DEFAULT_CONNECTION_TIMEOUT_SECS);
        let idle_timeout_secs = parse_or(get("DB_IDLE_TIMEOUT"), DEFAULT_IDLE_TIMEOUT_SECS);

        Ok(DatabaseConfig {
            driver,
            source,
            pool: PoolConfig {
                min_idle,
                max_connections,
                connection_timeout: Duration::from_secs(connection_timeout_secs),
                idle_timeout: Duration::from_secs(idle_timeout_secs),
            },
            encrypt,
            trust_server_certificate,
            application_name: APPLICATION_NAME.to_string(),
        })
    }

    /// Render the ODBC-style connection string with the password masked.
    ///
    /// Only for logging; the driver is configured from the structured fields.
    pub fn redacted_connection_string(&self) -> String {
        match &self.source {
            ConnectionSource::Parts {
                host,
                port,
                database,
                username,
                ..
            } => format!(
                "Driver={{{}}};Server=tcp:{},{};Database={};Uid={};Pwd=***;Encrypt={};TrustServerCertificate={}",
                self.driver,
                host,
                port,
                database,
                username,
                yes_no(self.encrypt),
                yes_no(self.trust_server_certificate),
            ),
            ConnectionSource::ConnectionString(conn_str) => redact_connection_string(conn_str),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_idle: DEFAULT_MIN_IDLE_CONNECTIONS,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
        }
    }
}

/// Names of the database objects behind the report endpoints.
#[derive(Debug, Clone)]
pub struct ReportConfig {
    /// Stored procedure returning the monthly report
    pub procedure: String,

    /// Table listing budget categories
    pub category_table: String,

    /// Column holding budget names
    pub budget_column: String,
}

impl ReportConfig {
    /// Load object names using a custom variable lookup.
    ///
    /// - `REPORT_PROCEDURE` (default: dbo.usp_GetMonthlyBudgetReport)
    /// - `REPORT_CATEGORY_TABLE` (default: dbo.Category)
    /// - `REPORT_BUDGET_COLUMN` (default: BudgetName)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            procedure: get("REPORT_PROCEDURE", DEFAULT_REPORT_PROCEDURE),
            category_table: get("REPORT_CATEGORY_TABLE", DEFAULT_CATEGORY_TABLE),
            budget_column: get("REPORT_BUDGET_COLUMN", DEFAULT_BUDGET_COLUMN),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            procedure: DEFAULT_REPORT_PROCEDURE.to_string(),
            category_table: DEFAULT_CATEGORY_TABLE.to_string(),
            budget_column: DEFAULT_BUDGET_COLUMN.to_string(),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Host to bind to.
    pub host: String,

    /// Port to listen on.
    pub port: u16,

    /// Enable a permissive CORS layer.
    pub enable_cors: bool,

    /// Directory with the report front end, served for unmatched paths.
    pub static_dir: Option<PathBuf>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HTTP_HOST.to_string(),
            port: DEFAULT_HTTP_PORT,
            enable_cors: false,
            static_dir: None,
        }
    }
}

impl HttpConfig {
    /// Create configuration using a custom variable lookup.
    ///
    /// - `HTTP_HOST` (default: 0.0.0.0)
    /// - `HTTP_PORT`, falling back to `PORT` (default: 8080)
    /// - `HTTP_CORS` (default: false)
    /// - `HTTP_STATIC_DIR` (default: unset)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup("HTTP_HOST").filter(|h| !h.trim().is_empty()) {
            config.host = host;
        }

        if let Some(port) = lookup("HTTP_PORT")
            .or_else(|| lookup("PORT"))
            .and_then(|p| p.trim().parse().ok())
        {
            config.port = port;
        }

        config.enable_cors = flag_or(lookup("HTTP_CORS"), false);

        config.static_dir = lookup("HTTP_STATIC_DIR")
            .filter(|d| !d.trim().is_empty())
            .map(PathBuf::from);

        config
    }

    /// Socket address string to bind.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Parse a value, falling back to a default when absent or invalid.
pub(crate) fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

/// Interpret a boolean flag (`true`/`1`/`yes` or `false`/`0`/`no`).
pub(crate) fn flag_or(value: Option<String>, default: bool) -> bool {
    match value.map(|v| v.trim().to_lowercase()).as_deref() {
        Some("true") | Some("1") | Some("yes") => true,
        Some("false") | Some("0") | Some("no") => false,
        _ => default,
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

/// Split `DB_SERVER` into host and port.
///
/// Accepts `host`, `host,port`, `host:port`, and the `tcp:` prefix Azure
/// connection strings use.
fn split_server(server: &str, default_port: u16) -> Result<(String, u16), ServerError> {
    let server = server.trim();
    let server = server.strip_prefix("tcp:").unwrap_or(server);

    let (host, port) = match server.rsplit_once(',').or_else(|| server.rsplit_once(':')) {
        Some((host, port)) => {
            let port = port.trim().parse::<u16>().map_err(|_| {
                ServerError::config(format!("DB_SERVER has an invalid port: '{}'", port))
            })?;
            (host.trim(), port)
        }
        None => (server, default_port),
    };

    if host.is_empty() {
        return Err(ServerError::config("DB_SERVER has an empty host"));
    }

    Ok((host.to_string(), port))
}

/// Mask password values in an ADO/ODBC connection string.
fn redact_connection_string(conn_str: &str) -> String {
    split_connection_string(conn_str)
        .into_iter()
        .filter(|part| !part.trim().is_empty())
        .map(|part| match part.split_once('=') {
            Some((key, _))
                if matches!(
                    key.trim().to_lowercase().as_str(),
                    "password" | "pwd"
                ) =>
            {
                format!("{}=***", key.trim())
            }
            _ => part.trim().to_string(),
        })
        .collect::<Vec<_>>()
        .join(";")
}

/// Split a connection string into `key=value` segments.
///
/// A `;` inside a `{...}`, `"..."` or `'...'` quoted value does not end the
/// segment. A doubled closing character inside quotes is an escaped literal.
fn split_connection_string(conn_str: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut seen_eq = false;
    let mut at_value_start = false;
    let mut closing: Option<char> = None;
    let mut chars = conn_str.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if let Some(close) = closing {
            if c == close {
                if chars.peek().map(|&(_, next)| next) == Some(close) {
                    chars.next();
                } else {
                    closing = None;
                }
            }
            continue;
        }

        match c {
            ';' => {
                parts.push(&conn_str[start..i]);
                start = i + 1;
                seen_eq = false;
                at_value_start = false;
            }
            '=' if !seen_eq => {
                seen_eq = true;
                at_value_start = true;
            }
            c if at_value_start && c.is_whitespace() => {}
            '{' if at_value_start => {
                closing = Some('}');
                at_value_start = false;
            }
            '"' | '\'' if at_value_start => {
                closing = Some(c);
                at_value_start = false;
            }
            _ => at_value_start = false,
        }
    }

    parts.push(&conn_str[start..]);
    parts
}
