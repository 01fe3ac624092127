use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Timelike};
use mysql_async::prelude::Queryable;
use mysql_async::{Opts, Params, Pool, Row, TxOpts};
use shardline_common::config::RetrySettings;
use shardline_common::retry::retry_async;
use shardline_error::{DriverError, Result, ShardlineError};
use shardline_sql::{ResultSet, Statement, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::common::{
    connect_error, driver_error, transaction_error, Connection, Connector, ExecResult,
    TransactionHandle,
};

const DRIVER: &str = "mysql";

pub struct MySqlConnector {
    pub retry: RetrySettings,
}

#[async_trait]
impl Connector for MySqlConnector {
    fn drivers(&self) -> &'static [&'static str] {
        &["mysql", "mymysql", "mariadb"]
    }

    async fn connect(&self, node: &str, descriptor: &str) -> Result<Arc<dyn Connection>> {
        let opts = Opts::from_url(descriptor).map_err(|e| connect_error(DRIVER, node, e))?;
        let pool = Pool::new(opts);

        // The pool is lazy; take one connection so a bad descriptor fails here.
        retry_async(&format!("open_mysql({})", node), self.retry, || {
            let pool = pool.clone();
            async move {
                let mut conn = pool.get_conn().await?;
                conn.ping().await
            }
        })
        .await
        .map_err(|e| connect_error(DRIVER, node, e))?;

        tracing::debug!(target: "shardline::driver", node = %node, "Opened MySQL pool");
        Ok(Arc::new(MySqlConnection {
            node: node.to_string(),
            pool,
            closed: AtomicBool::new(false),
        }))
    }
}

/// Pooled MySQL node. Concurrent callers each borrow their own pooled
/// connection.
pub struct MySqlConnection {
    node: String,
    pool: Pool,
    closed: AtomicBool,
}

impl MySqlConnection {
    async fn conn(&self) -> Result<mysql_async::Conn> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DriverError::NotConnected {
                node: self.node.clone(),
            }
            .into());
        }
        self.pool.get_conn().await.map_err(driver_error)
    }
}

#[async_trait]
impl Connection for MySqlConnection {
    fn driver(&self) -> &'static str {
        DRIVER
    }

    async fn query(&self, sql: &str, args: &[Value]) -> Result<ResultSet> {
        let mut conn = self.conn().await?;
        query_rows(&mut conn, sql, args).await
    }

    async fn execute(&self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        let mut conn = self.conn().await?;
        conn.exec_drop(sql, bind(args))
            .await
            .map_err(driver_error)?;
        Ok(ExecResult::new(
            conn.affected_rows(),
            conn.last_insert_id().map(|id| id as i64),
        ))
    }

    async fn execute_batch(&self, statements: &[Statement]) -> Result<ExecResult> {
        let mut conn = self.conn().await?;
        let mut tx = conn
            .start_transaction(TxOpts::default())
            .await
            .map_err(driver_error)?;
        let mut total = ExecResult::default();
        for statement in statements {
            tx.exec_drop(statement.sql.as_str(), bind(&statement.args))
                .await
                .map_err(driver_error)?;
            total.rows_affected += tx.affected_rows();
            total.last_insert_id = tx.last_insert_id().map(|id| id as i64).or(total.last_insert_id);
        }
        tx.commit().await.map_err(driver_error)?;
        Ok(total)
    }

    async fn begin(&self) -> Result<Box<dyn TransactionHandle>> {
        let mut conn = self.conn().await?;
        conn.query_drop("START TRANSACTION")
            .await
            .map_err(|e| transaction_error("begin", driver_error(e)))?;
        Ok(Box::new(MySqlTransaction {
            node: self.node.clone(),
            conn: Some(conn),
        }))
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.pool.clone().disconnect().await.map_err(driver_error)?;
        tracing::debug!(target: "shardline::driver", node = %self.node, "Closed MySQL pool");
        Ok(())
    }
}

/// Owns one pooled connection with an open transaction.
struct MySqlTransaction {
    node: String,
    conn: Option<mysql_async::Conn>,
}

impl MySqlTransaction {
    fn conn(&mut self) -> Result<&mut mysql_async::Conn> {
        self.conn.as_mut().ok_or_else(|| {
            ShardlineError::from(DriverError::Driver("transaction already finished".into()))
        })
    }

    async fn finish(&mut self, command: &str) -> Result<()> {
        self.conn()?.query_drop(command).await.map_err(driver_error)?;
        self.conn = None;
        Ok(())
    }
}

#[async_trait]
impl TransactionHandle for MySqlTransaction {
    async fn query(&mut self, sql: &str, args: &[Value]) -> Result<ResultSet> {
        query_rows(self.conn()?, sql, args).await
    }

    async fn execute(&mut self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        let conn = self.conn()?;
        conn.exec_drop(sql, bind(args)).await.map_err(driver_error)?;
        Ok(ExecResult::new(
            conn.affected_rows(),
            conn.last_insert_id().map(|id| id as i64),
        ))
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

impl Drop for MySqlTransaction {
    fn drop(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            let node = self.node.clone();
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    if let Err(e) = conn.query_drop("ROLLBACK").await {
                        tracing::warn!(node = %node, error = %e, "Rollback of abandoned transaction failed");
                    }
                });
            }
        }
    }
}

async fn query_rows<Q: Queryable>(conn: &mut Q, sql: &str, args: &[Value]) -> Result<ResultSet> {
    let rows: Vec<Row> = conn.exec(sql, bind(args)).await.map_err(driver_error)?;
    let columns = rows
        .first()
        .map(|row| {
            row.columns_ref()
                .iter()
                .map(|c| c.name_str().into_owned())
                .collect()
        })
        .unwrap_or_default();
    let rows = rows
        .into_iter()
        .map(|row| {
            (0..row.len())
                .map(|i| from_mysql(row.get(i).unwrap_or(mysql_async::Value::NULL)))
                .collect()
        })
        .collect();
    Ok(ResultSet::new(columns, rows))
}

fn bind(args: &[Value]) -> Params {
    if args.is_empty() {
        Params::Empty
    } else {
        Params::Positional(args.iter().map(to_mysql).collect())
    }
}

fn to_mysql(value: &Value) -> mysql_async::Value {
    use mysql_async::Value as My;
    match value {
        Value::Null => My::NULL,
        Value::Bool(b) => My::Int(i64::from(*b)),
        Value::Int(i) => My::Int(*i),
        Value::UInt(u) => My::UInt(*u),
        Value::Float(f) => My::Double(*f),
        Value::Text(s) => My::Bytes(s.clone().into_bytes()),
        Value::Bytes(b) => My::Bytes(b.clone()),
        Value::Timestamp(ts) => My::Date(
            ts.year() as u16,
            ts.month() as u8,
            ts.day() as u8,
            ts.hour() as u8,
            ts.minute() as u8,
            ts.second() as u8,
            ts.nanosecond() / 1_000,
        ),
    }
}

fn from_mysql(value: mysql_async::Value) -> Value {
    use mysql_async::Value as My;
    match value {
        My::NULL => Value::Null,
        My::Int(i) => Value::Int(i),
        My::UInt(u) => Value::UInt(u),
        My::Float(f) => Value::Float(f64::from(f)),
        My::Double(f) => Value::Float(f),
        My::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(text) => Value::Text(text),
            Err(e) => Value::Bytes(e.into_bytes()),
        },
        My::Date(y, mo, d, h, mi, s, us) => NaiveDate::from_ymd_opt(y.into(), mo.into(), d.into())
            .and_then(|date| date.and_hms_micro_opt(h.into(), mi.into(), s.into(), us))
            .map(Value::Timestamp)
            .unwrap_or(Value::Null),
        My::Time(negative, days, h, mi, s, us) => {
            let hours = days * 24 + u32::from(h);
            let sign = if negative { "-" } else { "" };
            Value::Text(format!("{}{:02}:{:02}:{:02}.{:06}", sign, hours, mi, s, us))
        }
    }
}
