//! Concurrent execution across groups.
//!
//! One task per group runs on a [`JoinSet`]. Reads race a shared deadline;
//! when it passes, or when a read already has its answer, the remaining
//! tasks are aborted instead of left running. Writes wait for every group.

use crate::cluster::{DbGroup, DbNode};
use shardline_connectors::Connection;
use shardline_error::{ErrorCode, ErrorContext, GroupFailure, Result, ShardlineError};
use shardline_sql::{ResultSet, Statement};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{timeout_at, Instant};

/// A resolved node of one group, ready to run a statement.
#[derive(Clone)]
pub(crate) struct Target {
    pub group: String,
    pub node: String,
    pub conn: Arc<dyn Connection>,
}

impl Target {
    pub fn new(group: &DbGroup, node: &Arc<DbNode>) -> Result<Self> {
        Ok(Self {
            group: group.name().to_string(),
            node: node.name().to_string(),
            conn: node.connection()?,
        })
    }

    /// Attach the group and node to a driver error and log it.
    pub fn fail(&self, err: ShardlineError) -> ShardlineError {
        tracing::error!(group = %self.group, node = %self.node, error = %err, "Statement failed");
        let message = format!("{} (group {}, node {})", err.message, self.group, self.node);
        ShardlineError {
            message,
            ..err
        }
        .with_context(ErrorContext::Node {
            group: self.group.clone(),
            node: self.node.clone(),
        })
    }

    fn failure(&self, err: &ShardlineError) -> GroupFailure {
        GroupFailure::new(&self.group, &self.node, &err.message)
    }
}

struct Outcome<T> {
    target: Target,
    result: Result<T>,
}

fn spawn_all<T, F, Fut>(targets: Vec<Target>, op: F) -> JoinSet<Outcome<T>>
where
    T: Send + 'static,
    F: Fn(Arc<dyn Connection>) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let mut set = JoinSet::new();
    for target in targets {
        tracing::debug!(target: "shardline::fanout", group = %target.group, node = %target.node, "Dispatching to group");
        let work = op(target.conn.clone());
        set.spawn(async move {
            Outcome {
                result: work.await,
                target,
            }
        });
    }
    set
}

fn spawn_queries(targets: Vec<Target>, statement: Arc<Statement>) -> JoinSet<Outcome<ResultSet>> {
    spawn_all(targets, |conn: Arc<dyn Connection>| {
        let statement = statement.clone();
        async move { conn.query(&statement.sql, &statement.args).await }
    })
}

fn panicked(err: JoinError) -> GroupFailure {
    GroupFailure::new("unknown", "unknown", format!("worker failed: {}", err))
}

fn timed_out(operation: &str, timeout: Duration, pending: usize) -> ShardlineError {
    ShardlineError::new(
        ErrorCode::QueryTimeout,
        format!(
            "{} timed out after {:?} with {} group(s) still running",
            operation, timeout, pending
        ),
    )
}

/// First non-empty result from any group. `Ok(None)` when every group
/// answered with no rows.
pub(crate) async fn first_rows(
    operation: &str,
    targets: Vec<Target>,
    statement: Arc<Statement>,
    timeout: Duration,
) -> Result<Option<ResultSet>> {
    let deadline = Instant::now() + timeout;
    let mut set = spawn_queries(targets, statement);
    let mut failures = Vec::new();

    loop {
        match timeout_at(deadline, set.join_next()).await {
            Err(_) => {
                let pending = set.len();
                set.abort_all();
                tracing::warn!(operation, pending, "Fan-out read timed out");
                return Err(timed_out(operation, timeout, pending));
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => failures.push(panicked(e)),
            Ok(Some(Ok(outcome))) => match outcome.result {
                Ok(rows) if !rows.is_empty() => {
                    set.abort_all();
                    tracing::debug!(target: "shardline::fanout", group = %outcome.target.group, "First rows received");
                    return Ok(Some(rows));
                }
                Ok(_) => {}
                Err(e) => failures.push(outcome.target.failure(&e)),
            },
        }
    }

    if failures.is_empty() {
        Ok(None)
    } else {
        Err(ShardlineError::fan_out(operation, failures, None))
    }
}

/// Rows of every group concatenated in completion order.
pub(crate) async fn merged_rows(
    operation: &str,
    targets: Vec<Target>,
    statement: Arc<Statement>,
    timeout: Duration,
) -> Result<ResultSet> {
    let deadline = Instant::now() + timeout;
    let mut set = spawn_queries(targets, statement);
    let mut merged = ResultSet::default();
    let mut failures = Vec::new();

    loop {
        match timeout_at(deadline, set.join_next()).await {
            Err(_) => {
                let pending = set.len();
                set.abort_all();
                tracing::warn!(operation, pending, "Fan-out read timed out");
                return Err(timed_out(operation, timeout, pending));
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => failures.push(panicked(e)),
            Ok(Some(Ok(outcome))) => match outcome.result {
                Ok(rows) => merged.merge(rows),
                Err(e) => failures.push(outcome.target.failure(&e)),
            },
        }
    }

    if failures.is_empty() {
        Ok(merged)
    } else {
        Err(ShardlineError::fan_out(operation, failures, None))
    }
}

/// Sum of the scalar each group returns. Groups still running at the
/// deadline are dropped from the sum and the partial total is returned
/// without an error.
pub(crate) async fn summed_counts(
    operation: &str,
    targets: Vec<Target>,
    statement: Arc<Statement>,
    timeout: Duration,
) -> Result<i64> {
    let deadline = Instant::now() + timeout;
    let mut set = spawn_queries(targets, statement);
    let mut total = 0i64;
    let mut failures = Vec::new();

    loop {
        match timeout_at(deadline, set.join_next()).await {
            Err(_) => {
                let pending = set.len();
                set.abort_all();
                tracing::warn!(operation, pending, partial = total, "Fan-out count timed out, returning partial sum");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => failures.push(panicked(e)),
            Ok(Some(Ok(outcome))) => match outcome.result {
                Ok(rows) => total += rows.scalar().and_then(|v| v.as_i64()).unwrap_or(0),
                Err(e) => failures.push(outcome.target.failure(&e)),
            },
        }
    }

    if failures.is_empty() {
        Ok(total)
    } else {
        Err(ShardlineError::fan_out(operation, failures, None))
    }
}

/// Run one statement on every target and sum the affected rows.
pub(crate) async fn executed_everywhere(
    operation: &str,
    targets: Vec<Target>,
    statement: Arc<Statement>,
) -> Result<u64> {
    let mut set = spawn_all(targets, move |conn: Arc<dyn Connection>| {
        let statement = statement.clone();
        async move { conn.execute(&statement.sql, &statement.args).await }
    });
    let mut affected = 0u64;
    let mut failures = Vec::new();

    while let Some(joined) = set.join_next().await {
        match joined {
            Err(e) => failures.push(panicked(e)),
            Ok(outcome) => match outcome.result {
                Ok(result) => affected += result.rows_affected,
                Err(e) => failures.push(outcome.target.failure(&e)),
            },
        }
    }

    if failures.is_empty() {
        Ok(affected)
    } else {
        tracing::warn!(operation, failed = failures.len(), affected, "Fan-out write partially failed");
        Err(ShardlineError::fan_out(operation, failures, Some(affected)))
    }
}

/// One group's share of a batched insert.
pub(crate) struct Batch {
    pub target: std::result::Result<Target, GroupFailure>,
    pub statements: Vec<Statement>,
    pub indices: Vec<usize>,
}

/// Per-batch outcome: the input indices and either the affected rows or the
/// failure that sank the whole batch.
pub(crate) type BatchResult = (Vec<usize>, std::result::Result<u64, GroupFailure>);

/// Run every batch on its own group concurrently. Each batch is atomic on
/// its node; batches never share a transaction.
pub(crate) async fn executed_batches(batches: Vec<Batch>) -> Vec<BatchResult> {
    let mut set = JoinSet::new();
    let mut results = Vec::new();

    for batch in batches {
        match batch.target {
            Err(failure) => results.push((batch.indices, Err(failure))),
            Ok(target) => {
                let statements = batch.statements;
                let indices = batch.indices;
                set.spawn(async move {
                    tracing::debug!(target: "shardline::fanout", group = %target.group, node = %target.node, statements = statements.len(), "Executing batch");
                    let result = target
                        .conn
                        .execute_batch(&statements)
                        .await
                        .map(|r| r.rows_affected)
                        .map_err(|e| target.failure(&e));
                    (indices, result)
                });
            }
        }
    }

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(result) => results.push(result),
            Err(e) => results.push((Vec::new(), Err(panicked(e)))),
        }
    }
    results
}
