//! Error types for the budget report API.
//!
//! This module defines semantic error types with SQL Server error code mapping
//! and the conversion of those errors into HTTP responses. Client-facing bodies
//! are fixed strings; driver detail only reaches the server log.

use crate::constants::{
    MSG_CONFIGURATION_ERROR, MSG_INTERNAL_ERROR, MSG_INVALID_JSON, MSG_MISSING_PARAMETERS,
};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Domain-specific errors for the budget report API.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A required report parameter is missing or empty
    #[error("Missing required parameters: {0}")]
    MissingParameters(String),

    /// Request body could not be parsed
    #[error("Malformed request body: {0}")]
    MalformedBody(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection error
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Authentication error
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Database not found
    #[error("Database not found: {0}")]
    DatabaseNotFound(String),

    /// Object not found (table, procedure, etc.)
    #[error("{object_type} not found: {name}")]
    ObjectNotFound { object_type: String, name: String },

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Query execution error
    #[error("Query execution error: {message}")]
    QueryExecution {
        message: String,
        sql_error_code: Option<i32>,
    },

    /// Connection checkout or command timeout
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Create a missing parameters error.
    pub fn missing_parameters(fields: impl Into<String>) -> Self {
        Self::MissingParameters(fields.into())
    }

    /// Create a malformed body error.
    pub fn malformed_body(msg: impl Into<String>) -> Self {
        Self::MalformedBody(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a connection error with a source.
    pub fn connection_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an authentication error.
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create an object not found error.
    pub fn object_not_found(object_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self::ObjectNotFound {
            object_type: object_type.into(),
            name: name.into(),
        }
    }

    /// Create a permission denied error.
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    /// Create a query execution error.
    pub fn query_error(msg: impl Into<String>) -> Self {
        Self::QueryExecution {
            message: msg.into(),
            sql_error_code: None,
        }
    }

    /// Create a query execution error with the SQL Server error number.
    pub fn query_error_with_code(msg: impl Into<String>, code: i32) -> Self {
        Self::QueryExecution {
            message: msg.into(),
            sql_error_code: Some(code),
        }
    }

    /// Create a timeout error.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create an invalid input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingParameters(_) | Self::MalformedBody(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to the caller.
    ///
    /// Server-side failures collapse to fixed strings so driver messages, host
    /// names, and credentials never leave the process.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::MissingParameters(_) => MSG_MISSING_PARAMETERS,
            Self::MalformedBody(_) => MSG_INVALID_JSON,
            Self::Config(_) => MSG_CONFIGURATION_ERROR,
            _ => MSG_INTERNAL_ERROR,
        }
    }

    /// Check if this error was caused by the client.
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        match &self {
            Self::Config(_) => {
                tracing::error!("Configuration error while handling request: {}", self);
            }
            Self::MissingParameters(_) | Self::MalformedBody(_) => {
                tracing::debug!("Client error: {}", self);
            }
            _ => {
                tracing::error!("Internal service error: {:#}", self);
            }
        }

        (self.status_code(), self.user_message()).into_response()
    }
}

/// Map SQL Server error codes to semantic ServerError types.
pub fn from_sql_error(code: i32, message: &str) -> ServerError {
    match code {
        // Authentication errors
        18456 => ServerError::auth(format!("Login failed: {}", message)),

        // Database errors
        4060 => ServerError::DatabaseNotFound(message.to_string()),

        // Object not found errors
        208 => ServerError::object_not_found("Object", message),
        2812 => ServerError::object_not_found("Stored procedure", message),

        // Permission errors
        229 | 230 => ServerError::permission_denied(message),

        // Timeout
        -2 => ServerError::timeout(message),

        // Connection errors
        -1 => ServerError::connection("Connection broken"),
        53 => ServerError::connection("Server not found or not accessible"),

        // Procedure argument errors
        201 => ServerError::query_error_with_code(
            format!("Procedure expects a parameter that was not supplied: {}", message),
            code,
        ),
        8144 => ServerError::query_error_with_code(
            format!("Procedure has too many arguments specified: {}", message),
            code,
        ),

        // Conversion errors (e.g. an unparsable date handed to the procedure)
        241 | 242 | 8114 => {
            ServerError::query_error_with_code(format!("Conversion failed: {}", message), code)
        }

        // Deadlock
        1205 => ServerError::query_error_with_code(
            "Transaction was deadlocked and has been rolled back",
            code,
        ),

        // Default: generic query error
        _ => ServerError::query_error_with_code(message, code),
    }
}

impl From<tiberius::error::Error> for ServerError {
    fn from(e: tiberius::error::Error) -> Self {
        use tiberius::error::Error;

        match &e {
            Error::Server(token) => from_sql_error(token.code() as i32, token.message()),
            Error::Io { .. } => ServerError::connection_with_source("IO error", e),
            Error::Tls(_) => ServerError::connection_with_source("TLS error", e),
            Error::Protocol(_) => ServerError::connection_with_source("Protocol error", e),
            Error::Routing { host, port } => {
                ServerError::connection(format!("Server requested routing to {}:{}", host, port))
            }
            Error::Conversion(_) | Error::Utf8 | Error::Utf16 | Error::ParseInt(_) => {
                ServerError::query_error(format!("Type conversion error: {}", e))
            }
            Error::Encoding(_) => ServerError::query_error(format!("Encoding error: {}", e)),
            _ => ServerError::internal(e.to_string()),
        }
    }
}

impl From<bb8::RunError<tiberius::error::Error>> for ServerError {
    fn from(e: bb8::RunError<tiberius::error::Error>) -> Self {
        match e {
            bb8::RunError::User(inner) => match ServerError::from(inner) {
                ServerError::Connection { message, source } => ServerError::Connection {
                    message: format!("Failed to acquire pooled connection: {}", message),
                    source,
                },
                other => other,
            },
            bb8::RunError::TimedOut => {
                ServerError::timeout("Timed out waiting for a pooled connection")
            }
        }
    }
}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match e.kind() {
            ErrorKind::ConnectionRefused => ServerError::connection_with_source("Connection refused", e),
            ErrorKind::ConnectionReset => ServerError::connection_with_source("Connection reset", e),
            ErrorKind::TimedOut => ServerError::timeout(e.to_string()),
            _ => ServerError::connection_with_source("IO error", e),
        }
    }
}
