//! Driver layer for shardline.
//!
//! Every node in a cluster is reached through an [`Connection`] opened by a
//! [`Connector`]. The built-in connectors cover SQLite (default feature) and
//! MySQL (feature `mysql`); other drivers are plugged in by implementing
//! [`Connector`] and registering it.

pub mod sources;

pub use sources::sql::common::{Connection, Connector, ExecResult, TransactionHandle};
pub use sources::{connector_for, default_registry, ConnectorRegistry};
