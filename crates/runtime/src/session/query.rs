use super::{check_bounded, read_targets, Session};
use crate::fanout::{self, Target};
use shardline_error::Result;
use shardline_sql::{metadata_of, Clause, ClauseKind, Entity, ResultSet, RowMapper, Statement, Value};
use std::sync::Arc;

impl Session {
    /// Load the first matching row into `entity`. `Ok(false)` when no row
    /// matches; `entity` is left untouched then.
    ///
    /// Unrouted reads race every group and keep the first non-empty answer.
    pub async fn get<E: Entity>(&mut self, entity: &mut E) -> Result<bool> {
        let mut state = self.take();
        state.check_routing()?;
        let table = metadata_of::<E>()?;
        state.check_id(&table)?;
        state
            .clauses
            .push(Clause::new(ClauseKind::Top, "", vec![Value::UInt(1)]));

        let statement = self.engine.dialect().select(&table, &state.clauses);
        let rows = match state.pinned_group(&self.engine)? {
            Some(group) => {
                let target = Target::new(&group, &group.pick(state.force_master)?)?;
                Some(query_one(&target, &statement).await?)
            }
            None => {
                let targets = read_targets(&self.engine, state.force_master)?;
                let timeout = self.engine.settings().fanout_timeout();
                fanout::first_rows("get", targets, Arc::new(statement), timeout).await?
            }
        };

        let Some(ResultSet { columns, rows }) = rows else {
            return Ok(false);
        };
        let Some(row) = rows.into_iter().next() else {
            return Ok(false);
        };
        RowMapper::new(&table, &columns).assign(entity, row)?;
        Ok(true)
    }

    /// All matching rows. Unrouted reads concatenate the rows of every group
    /// in completion order; no global ordering or paging is applied.
    pub async fn find<E: Entity>(&mut self) -> Result<Vec<E>> {
        let state = self.take();
        state.check_routing()?;
        let table = metadata_of::<E>()?;
        state.check_id(&table)?;

        let statement = self.engine.dialect().select(&table, &state.clauses);
        check_bounded(&self.engine, &statement, "select", table.name())?;

        let result = match state.pinned_group(&self.engine)? {
            Some(group) => {
                let target = Target::new(&group, &group.pick(state.force_master)?)?;
                query_one(&target, &statement).await?
            }
            None => {
                let targets = read_targets(&self.engine, state.force_master)?;
                let timeout = self.engine.settings().fanout_timeout();
                fanout::merged_rows("find", targets, Arc::new(statement), timeout).await?
            }
        };

        let mapper = RowMapper::new(&table, &result.columns);
        mapper.map_all(result.rows)
    }

    /// Matching row count. An unrouted count sums every group; groups that
    /// miss the fan-out deadline are left out of the total.
    pub async fn count<E: Entity>(&mut self) -> Result<i64> {
        let state = self.take();
        state.check_routing()?;
        let table = metadata_of::<E>()?;
        state.check_id(&table)?;

        let statement = self.engine.dialect().count(&table, &state.clauses);
        match state.pinned_group(&self.engine)? {
            Some(group) => {
                let target = Target::new(&group, &group.pick(state.force_master)?)?;
                let rows = query_one(&target, &statement).await?;
                Ok(rows.scalar().and_then(Value::as_i64).unwrap_or(0))
            }
            None => {
                let targets = read_targets(&self.engine, state.force_master)?;
                let timeout = self.engine.settings().fanout_timeout();
                fanout::summed_counts("count", targets, Arc::new(statement), timeout).await
            }
        }
    }

    /// First cell of a raw query on the default group's read node.
    pub async fn scalar(&mut self, sql: &str, args: Vec<Value>) -> Result<Option<Value>> {
        let state = self.take();
        let group = self.engine.cluster().default_group()?;
        let target = Target::new(&group, &group.pick(state.force_master)?)?;
        let rows = query_one(&target, &Statement::new(sql, args)).await?;
        Ok(rows.scalar().cloned())
    }
}

pub(crate) async fn query_one(target: &Target, statement: &Statement) -> Result<ResultSet> {
    tracing::debug!(target: "shardline::session", group = %target.group, node = %target.node, sql = %statement, "Query");
    target
        .conn
        .query(&statement.sql, &statement.args)
        .await
        .map_err(|e| target.fail(e))
}
