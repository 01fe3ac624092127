//! Driver name to SQL dialect.
//!
//! The engine is configured with a short driver key (`"mysql"`, `"mssql"`,
//! ...). Only SQL Server needs its own rendering; every other supported
//! driver accepts the generic dialect.

use crate::sql_generator::Dialect;
use shardline_error::{ErrorCode, ErrorContext, Result, ShardlineError};

/// Routes a driver key to the dialect its statements are rendered in.
pub fn route_dialect(driver: &str) -> Result<Dialect> {
    match driver.trim().to_lowercase().as_str() {
        "mssql" | "sqlserver" => Ok(Dialect::Mssql),
        "mysql" | "mymysql" | "mariadb" | "postgres" | "postgresql" | "sqlite" | "sqlite3" => {
            Ok(Dialect::Generic)
        }
        _ => {
            tracing::warn!(driver = %driver, "No dialect registered for driver");
            Err(ShardlineError::new(
                ErrorCode::UnsupportedDriver,
                format!("Unsupported driver '{}'", driver),
            )
            .with_context(ErrorContext::Config {
                file_path: None,
                field: Some("driver".to_string()),
            })
            .with_hint("Use one of: mssql, sqlserver, mysql, mymysql, postgres, sqlite"))
        }
    }
}
