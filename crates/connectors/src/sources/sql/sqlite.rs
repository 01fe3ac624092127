use async_trait::async_trait;
use rusqlite::params_from_iter;
use rusqlite::types::{Value as SqliteValue, ValueRef};
use shardline_common::config::RetrySettings;
use shardline_common::retry::retry_async;
use shardline_error::{DriverError, Result, ShardlineError};
use shardline_sql::{ResultSet, Statement, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::common::{
    connect_error, driver_error, join_error, transaction_error, Connection, Connector,
    ExecResult, TransactionHandle,
};

const DRIVER: &str = "sqlite";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// `None` once the connection has been closed.
type Slot = Option<rusqlite::Connection>;

pub struct SqliteConnector {
    pub retry: RetrySettings,
}

#[async_trait]
impl Connector for SqliteConnector {
    fn drivers(&self) -> &'static [&'static str] {
        &["sqlite", "sqlite3"]
    }

    async fn connect(&self, node: &str, descriptor: &str) -> Result<Arc<dyn Connection>> {
        let path = descriptor.trim_start_matches("sqlite://").to_string();
        let conn = retry_async(&format!("open_sqlite({})", node), self.retry, || {
            open(path.clone())
        })
        .await
        .map_err(|e| connect_error(DRIVER, node, e))?;

        tracing::debug!(target: "shardline::driver", node = %node, "Opened SQLite connection");
        Ok(Arc::new(SqliteConnection {
            node: node.to_string(),
            conn: Arc::new(Mutex::new(Some(conn))),
        }))
    }
}

async fn open(path: String) -> std::result::Result<rusqlite::Connection, DriverError> {
    tokio::task::spawn_blocking(move || {
        let conn = rusqlite::Connection::open(&path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok::<_, rusqlite::Error>(conn)
    })
    .await
    .map_err(|e| DriverError::Join(e.to_string()))?
    .map_err(|e| DriverError::Driver(e.to_string()))
}

/// Single rusqlite connection serialized behind an async mutex. Every call
/// runs on the blocking pool.
pub struct SqliteConnection {
    node: String,
    conn: Arc<Mutex<Slot>>,
}

impl SqliteConnection {
    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let guard = self.conn.clone().lock_owned().await;
        let (_guard, out) = run_blocking(&self.node, guard, f).await?;
        out
    }
}

/// Run `f` on the blocking pool and hand the guard back with the outcome.
async fn run_blocking<T, F>(
    node: &str,
    mut guard: OwnedMutexGuard<Slot>,
    f: F,
) -> Result<(OwnedMutexGuard<Slot>, Result<T>)>
where
    T: Send + 'static,
    F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<T> + Send + 'static,
{
    let node = node.to_string();
    tokio::task::spawn_blocking(move || {
        let out = match guard.as_mut() {
            Some(conn) => f(conn).map_err(driver_error),
            None => Err(DriverError::NotConnected { node }.into()),
        };
        (guard, out)
    })
    .await
    .map_err(join_error)
}

#[async_trait]
impl Connection for SqliteConnection {
    fn driver(&self) -> &'static str {
        DRIVER
    }

    async fn query(&self, sql: &str, args: &[Value]) -> Result<ResultSet> {
        let sql = sql.to_string();
        let args = bind(args);
        self.run(move |conn| query_rows(conn, &sql, &args)).await
    }

    async fn execute(&self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        let sql = sql.to_string();
        let args = bind(args);
        self.run(move |conn| execute_one(conn, &sql, &args)).await
    }

    async fn execute_batch(&self, statements: &[Statement]) -> Result<ExecResult> {
        let batch = bind_batch(statements);
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let total = execute_all(&tx, &batch)?;
            tx.commit()?;
            Ok(total)
        })
        .await
    }

    async fn begin(&self) -> Result<Box<dyn TransactionHandle>> {
        let guard = self.conn.clone().lock_owned().await;
        let (guard, out) = run_blocking(&self.node, guard, |conn| conn.execute_batch("BEGIN")).await?;
        out.map_err(|e| transaction_error("begin", e))?;
        Ok(Box::new(SqliteTransaction {
            node: self.node.clone(),
            guard: Some(guard),
        }))
    }

    async fn close(&self) -> Result<()> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, e)| driver_error(e))?;
            tracing::debug!(target: "shardline::driver", node = %self.node, "Closed SQLite connection");
        }
        Ok(())
    }
}

/// Holds the connection lock for its whole lifetime.
struct SqliteTransaction {
    node: String,
    guard: Option<OwnedMutexGuard<Slot>>,
}

impl SqliteTransaction {
    async fn run<T, F>(&mut self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let guard = self.guard.take().ok_or_else(|| {
            ShardlineError::from(DriverError::Driver("transaction already finished".into()))
        })?;
        let (guard, out) = run_blocking(&self.node, guard, f).await?;
        self.guard = Some(guard);
        out
    }

    async fn finish(&mut self, command: &'static str) -> Result<()> {
        self.run(move |conn| conn.execute_batch(command)).await?;
        self.guard = None;
        Ok(())
    }
}

#[async_trait]
impl TransactionHandle for SqliteTransaction {
    async fn query(&mut self, sql: &str, args: &[Value]) -> Result<ResultSet> {
        let sql = sql.to_string();
        let args = bind(args);
        self.run(move |conn| query_rows(conn, &sql, &args)).await
    }

    async fn execute(&mut self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        let sql = sql.to_string();
        let args = bind(args);
        self.run(move |conn| execute_one(conn, &sql, &args)).await
    }

    async fn execute_batch(&mut self, statements: &[Statement]) -> Result<ExecResult> {
        let batch = bind_batch(statements);
        self.run(move |conn| execute_all(conn, &batch)).await
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        self.finish("COMMIT")
            .await
            .map_err(|e| transaction_error("commit", e))
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        self.finish("ROLLBACK")
            .await
            .map_err(|e| transaction_error("roll back", e))
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        if let Some(guard) = self.guard.take() {
            if let Some(conn) = &*guard {
                if let Err(e) = conn.execute_batch("ROLLBACK") {
                    tracing::warn!(node = %self.node, error = %e, "Rollback of abandoned transaction failed");
                }
            }
        }
    }
}

fn bind(args: &[Value]) -> Vec<SqliteValue> {
    args.iter().map(to_sqlite).collect()
}

fn bind_batch(statements: &[Statement]) -> Vec<(String, Vec<SqliteValue>)> {
    statements
        .iter()
        .map(|s| (s.sql.clone(), bind(&s.args)))
        .collect()
}

fn to_sqlite(value: &Value) -> SqliteValue {
    match value {
        Value::Null => SqliteValue::Null,
        Value::Bool(b) => SqliteValue::Integer(i64::from(*b)),
        Value::Int(i) => SqliteValue::Integer(*i),
        Value::UInt(u) => match i64::try_from(*u) {
            Ok(i) => SqliteValue::Integer(i),
            Err(_) => SqliteValue::Text(u.to_string()),
        },
        Value::Float(f) => SqliteValue::Real(*f),
        Value::Text(s) => SqliteValue::Text(s.clone()),
        Value::Bytes(b) => SqliteValue::Blob(b.clone()),
        Value::Timestamp(_) => SqliteValue::Text(value.to_string()),
    }
}

fn from_sqlite(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}

fn query_rows(
    conn: &rusqlite::Connection,
    sql: &str,
    args: &[SqliteValue],
) -> rusqlite::Result<ResultSet> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();
    let mut rows = stmt.query(params_from_iter(args.iter()))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(width);
        for i in 0..width {
            values.push(from_sqlite(row.get_ref(i)?));
        }
        out.push(values);
    }
    Ok(ResultSet::new(columns, out))
}

fn execute_one(
    conn: &rusqlite::Connection,
    sql: &str,
    args: &[SqliteValue],
) -> rusqlite::Result<ExecResult> {
    let rows = conn.execute(sql, params_from_iter(args.iter()))?;
    Ok(ExecResult::new(rows as u64, Some(conn.last_insert_rowid())))
}

fn execute_all(
    conn: &rusqlite::Connection,
    batch: &[(String, Vec<SqliteValue>)],
) -> rusqlite::Result<ExecResult> {
    let mut total = ExecResult::default();
    for (sql, args) in batch {
        let result = execute_one(conn, sql, args)?;
        total.rows_affected += result.rows_affected;
        total.last_insert_id = result.last_insert_id;
    }
    Ok(total)
}
