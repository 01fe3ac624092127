//! Connector registry.
//!
//! Each driver implements the `Connector` trait and is looked up by its short
//! driver key when the engine opens a cluster.
//!
//! # Built-in Connectors
//!
//! | Driver keys | Implementation | Feature |
//! |-------------|----------------|---------|
//! | `sqlite`, `sqlite3` | `SqliteConnector` | `sqlite` (default) |
//! | `mysql`, `mymysql`, `mariadb` | `MySqlConnector` | `mysql` |
//!
//! # Adding a New Driver
//!
//! 1. Implement `Connection` (and `TransactionHandle`) over the driver.
//! 2. Implement `Connector` returning that connection.
//! 3. Register it with `ConnectorRegistry::register_connector`, or hand it
//!    straight to `Engine::open_with`.

use shardline_common::config::RetrySettings;
use shardline_error::{ErrorCode, Result, ShardlineError};
use std::collections::HashMap;
use std::sync::Arc;

pub mod sql;

use sql::common::Connector;

#[derive(Default)]
pub struct ConnectorRegistry {
    connectors: HashMap<&'static str, Arc<dyn Connector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connector under every driver key it answers to.
    pub fn register_connector(&mut self, connector: Arc<dyn Connector>) {
        for key in connector.drivers() {
            self.connectors.insert(*key, connector.clone());
        }
    }

    pub fn connector(&self, driver: &str) -> Result<Arc<dyn Connector>> {
        let key = driver.trim().to_lowercase();
        self.connectors.get(key.as_str()).cloned().ok_or_else(|| {
            ShardlineError::new(
                ErrorCode::UnsupportedDriver,
                format!("No connector registered for driver '{}'", driver),
            )
            .with_hint("Enable the matching crate feature or pass a connector to Engine::open_with")
        })
    }

    pub fn drivers(&self) -> Vec<&'static str> {
        let mut keys: Vec<&'static str> = self.connectors.keys().copied().collect();
        keys.sort_unstable();
        keys
    }
}

pub fn default_registry(retry: RetrySettings) -> ConnectorRegistry {
    #[allow(unused_mut)]
    let mut registry = ConnectorRegistry::new();
    #[cfg(feature = "sqlite")]
    registry.register_connector(Arc::new(sql::sqlite::SqliteConnector { retry }));
    #[cfg(feature = "mysql")]
    registry.register_connector(Arc::new(sql::mysql::MySqlConnector { retry }));
    #[cfg(not(any(feature = "sqlite", feature = "mysql")))]
    let _ = retry;
    registry
}

/// Built-in connector for a driver key.
pub fn connector_for(driver: &str, retry: RetrySettings) -> Result<Arc<dyn Connector>> {
    default_registry(retry).connector(driver)
}
