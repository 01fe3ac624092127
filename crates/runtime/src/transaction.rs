//! Single-group transactions.
//!
//! A [`Transaction`] pins one driver transaction on the master of one group
//! for its whole life. Statements never fan out. Clause tokens accumulate
//! exactly as on a session and are cleared by every terminal call. Dropping
//! an unfinished transaction rolls it back.

use crate::engine::Engine;
use crate::session::{check_bounded, check_id, SessionState};
use shardline_connectors::{ExecResult, TransactionHandle};
use shardline_error::{Result, ShardlineError};
use shardline_sql::{
    metadata_of, Clause, ClauseBuilder, ClauseKind, ClauseList, Entity, RowMapper, Statement,
    Value,
};

pub struct Transaction {
    engine: Engine,
    group: String,
    node: String,
    handle: Box<dyn TransactionHandle>,
    clauses: ClauseList,
}

impl Transaction {
    pub(crate) async fn begin(engine: Engine, shard_value: i64) -> Result<Self> {
        let mut routing = SessionState::default();
        routing.route(&engine, shard_value);
        routing.check_routing()?;
        let group = match routing.group {
            Some(group) => group,
            None => engine.cluster().default_group()?,
        };
        let master = group.master()?;
        let handle = master.connection()?.begin().await.map_err(|e| {
            tracing::error!(group = %group.name(), node = %master.name(), error = %e, "Failed to begin transaction");
            e
        })?;
        tracing::debug!(target: "shardline::session", group = %group.name(), node = %master.name(), shard_value, "Transaction started");
        Ok(Self {
            engine,
            group: group.name().to_string(),
            node: master.name().to_string(),
            handle,
            clauses: ClauseList::new(),
        })
    }

    /// Group the transaction is bound to.
    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub async fn insert<E: Entity>(&mut self, entity: &mut E) -> Result<u64> {
        let clauses = std::mem::take(&mut self.clauses);
        let table = metadata_of::<E>()?;
        let statement = self.engine.dialect().insert(&table, entity, &clauses)?;
        let result = self.run_execute(&statement).await?;
        if let (Some(auto), Some(id)) = (table.auto_column(), result.last_insert_id) {
            table.write(auto, entity, Value::Int(id))?;
        }
        Ok(result.rows_affected)
    }

    /// Insert every entity inside the transaction. Shard values are ignored;
    /// all rows land on this transaction's group.
    pub async fn insert_slice<E: Entity>(&mut self, entities: &[E]) -> Result<u64> {
        let clauses = std::mem::take(&mut self.clauses);
        let table = metadata_of::<E>()?;
        let dialect = self.engine.dialect();
        let statements = entities
            .iter()
            .map(|entity| dialect.insert(&table, entity, &clauses))
            .collect::<Result<Vec<Statement>>>()?;
        let result = self
            .handle
            .execute_batch(&statements)
            .await
            .map_err(|e| self.located(e))?;
        Ok(result.rows_affected)
    }

    /// Update from `entity`, keyed on its primary key when no filter is set.
    pub async fn update<E: Entity>(&mut self, entity: &E) -> Result<u64> {
        let mut clauses = std::mem::take(&mut self.clauses);
        let table = metadata_of::<E>()?;
        if !clauses.has_filter() && !clauses.has(ClauseKind::RawQuery) {
            clauses.id(table.primary_key_value(entity)?);
        }
        check_id(&table, &clauses)?;
        let statement = self.engine.dialect().update(&table, entity, &clauses)?;
        check_bounded(&self.engine, &statement, "update", table.name())?;
        Ok(self.run_execute(&statement).await?.rows_affected)
    }

    pub async fn delete<E: Entity>(&mut self) -> Result<u64> {
        let clauses = std::mem::take(&mut self.clauses);
        let table = metadata_of::<E>()?;
        check_id(&table, &clauses)?;
        let statement = self.engine.dialect().delete(&table, &clauses);
        check_bounded(&self.engine, &statement, "delete", table.name())?;
        Ok(self.run_execute(&statement).await?.rows_affected)
    }

    /// Reads see the transaction's own uncommitted writes.
    pub async fn get<E: Entity>(&mut self, entity: &mut E) -> Result<bool> {
        let mut clauses = std::mem::take(&mut self.clauses);
        let table = metadata_of::<E>()?;
        check_id(&table, &clauses)?;
        clauses.push(Clause::new(ClauseKind::Top, "", vec![Value::UInt(1)]));
        let statement = self.engine.dialect().select(&table, &clauses);
        let result = self.run_query(&statement).await?;
        let Some(row) = result.rows.into_iter().next() else {
            return Ok(false);
        };
        RowMapper::new(&table, &result.columns).assign(entity, row)?;
        Ok(true)
    }

    pub async fn find<E: Entity>(&mut self) -> Result<Vec<E>> {
        let clauses = std::mem::take(&mut self.clauses);
        let table = metadata_of::<E>()?;
        check_id(&table, &clauses)?;
        let statement = self.engine.dialect().select(&table, &clauses);
        let result = self.run_query(&statement).await?;
        RowMapper::new(&table, &result.columns).map_all(result.rows)
    }

    pub async fn exec(&mut self, sql: &str, args: Vec<Value>) -> Result<ExecResult> {
        self.clauses.clear();
        self.run_execute(&Statement::new(sql, args)).await
    }

    pub async fn commit(self) -> Result<()> {
        let (group, node) = (self.group, self.node);
        self.handle.commit().await.map_err(|e| {
            tracing::error!(group = %group, node = %node, error = %e, "Commit failed");
            e
        })?;
        tracing::debug!(target: "shardline::session", group = %group, "Transaction committed");
        Ok(())
    }

    pub async fn rollback(self) -> Result<()> {
        let (group, node) = (self.group, self.node);
        self.handle.rollback().await.map_err(|e| {
            tracing::error!(group = %group, node = %node, error = %e, "Rollback failed");
            e
        })?;
        tracing::debug!(target: "shardline::session", group = %group, "Transaction rolled back");
        Ok(())
    }

    async fn run_execute(&mut self, statement: &Statement) -> Result<ExecResult> {
        tracing::debug!(target: "shardline::session", group = %self.group, sql = %statement, "Execute in transaction");
        match self.handle.execute(&statement.sql, &statement.args).await {
            Ok(result) => Ok(result),
            Err(e) => Err(self.located(e)),
        }
    }

    async fn run_query(&mut self, statement: &Statement) -> Result<shardline_sql::ResultSet> {
        tracing::debug!(target: "shardline::session", group = %self.group, sql = %statement, "Query in transaction");
        match self.handle.query(&statement.sql, &statement.args).await {
            Ok(rows) => Ok(rows),
            Err(e) => Err(self.located(e)),
        }
    }

    fn located(&self, err: ShardlineError) -> ShardlineError {
        tracing::error!(group = %self.group, node = %self.node, error = %err, "Statement failed in transaction");
        err.with_context(shardline_error::ErrorContext::Node {
            group: self.group.clone(),
            node: self.node.clone(),
        })
    }
}

impl ClauseBuilder for Transaction {
    fn push_clause(&mut self, clause: Clause) -> &mut Self {
        self.clauses.push(clause);
        self
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("group", &self.group)
            .field("node", &self.node)
            .field("clauses", &self.clauses)
            .finish()
    }
}
