use async_trait::async_trait;
use shardline_error::{DriverError, ErrorCode, Result, ShardlineError};
use shardline_sql::{ResultSet, Statement, Value};
use std::sync::Arc;

/// Outcome of a data-modifying statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: u64,
    /// Key generated by the last insert, when the driver reports one.
    pub last_insert_id: Option<i64>,
}

impl ExecResult {
    pub fn new(rows_affected: u64, last_insert_id: Option<i64>) -> Self {
        Self {
            rows_affected,
            last_insert_id,
        }
    }
}

/// Open handle to one database node. Shared by every session and fan-out
/// worker, so implementations must tolerate concurrent calls.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Driver key this connection was opened with.
    fn driver(&self) -> &'static str;

    /// Run a query and buffer every row.
    async fn query(&self, sql: &str, args: &[Value]) -> Result<ResultSet>;

    async fn execute(&self, sql: &str, args: &[Value]) -> Result<ExecResult>;

    /// Run all statements inside one driver transaction. Either every
    /// statement applies or none does.
    async fn execute_batch(&self, statements: &[Statement]) -> Result<ExecResult>;

    async fn begin(&self) -> Result<Box<dyn TransactionHandle>>;

    async fn close(&self) -> Result<()>;
}

/// Driver transaction pinned to one connection. Dropping an unfinished
/// handle rolls it back.
#[async_trait]
pub trait TransactionHandle: Send {
    async fn query(&mut self, sql: &str, args: &[Value]) -> Result<ResultSet>;

    async fn execute(&mut self, sql: &str, args: &[Value]) -> Result<ExecResult>;

    /// Statements run in order inside the open transaction.
    async fn execute_batch(&mut self, statements: &[Statement]) -> Result<ExecResult> {
        let mut total = ExecResult::default();
        for statement in statements {
            let result = self.execute(&statement.sql, &statement.args).await?;
            total.rows_affected += result.rows_affected;
            total.last_insert_id = result.last_insert_id.or(total.last_insert_id);
        }
        Ok(total)
    }

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Opens connections for one family of drivers.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Driver keys this connector answers to.
    fn drivers(&self) -> &'static [&'static str];

    async fn connect(&self, node: &str, descriptor: &str) -> Result<Arc<dyn Connection>>;
}

pub(crate) fn driver_error(err: impl std::fmt::Display) -> ShardlineError {
    DriverError::Driver(err.to_string()).into()
}

pub(crate) fn join_error(err: tokio::task::JoinError) -> ShardlineError {
    DriverError::Join(err.to_string()).into()
}

pub(crate) fn connect_error(driver: &str, node: &str, err: impl std::fmt::Display) -> ShardlineError {
    ShardlineError::new(
        ErrorCode::ConnectionFailed,
        format!("Failed to open {} node '{}': {}", driver, node, err),
    )
}

pub(crate) fn transaction_error(action: &str, err: ShardlineError) -> ShardlineError {
    ShardlineError::new(
        ErrorCode::TransactionFailed,
        format!("Failed to {} transaction: {}", action, err.message),
    )
}
