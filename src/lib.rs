//! # Budget Report API
//!
//! A small HTTP service in front of a SQL Server budget database.
//!
//! This crate provides:
//! - **Budget names**: the distinct budget names from the category table
//! - **Monthly report**: rows from the report stored procedure, as JSON objects
//! - **Health**: a liveness endpoint that reports pool state
//!
//! ## Architecture
//!
//! Configuration is read once at startup. Handlers validate requests and call a
//! [`store::ReportStore`]; the SQL Server store checks connections out of a
//! lazily-filled bb8 pool. Every failure becomes a [`ServerError`] whose HTTP
//! response carries a fixed, credential-free message.

pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod handlers;
pub mod report;
pub mod security;
pub mod server;
pub mod shutdown;
pub mod store;

pub use config::Config;
pub use error::ServerError;
pub use server::{build_router, serve, AppState};
pub use store::{build_store, ReportStore};
