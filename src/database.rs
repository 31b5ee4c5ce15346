//! Database connectivity and query execution.

mod connection;
mod query;
pub mod types;

pub use connection::{
    checkout, create_client_config, create_pool, pool_status, ConnectionManager, ConnectionPool,
    PoolStatus, PooledConn, RawConnection,
};
pub use query::{truncate_for_log, ReportQueries, ReportRow, ResultSet};
pub use types::{SqlValue, TypeMapper};
