//! SQL drivers.
//!
//! `common` holds the driver-independent traits. Each driver module turns
//! [`shardline_sql::Value`] arguments into its own bind types and buffers
//! results into a [`shardline_sql::ResultSet`].

pub mod common;
#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "sqlite")]
pub mod sqlite;
