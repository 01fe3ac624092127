use super::{check_bounded, master_targets, Session, SessionState};
use crate::cluster::DbGroup;
use crate::engine::Engine;
use crate::fanout::{self, Batch, Target};
use shardline_connectors::ExecResult;
use shardline_error::{GroupFailure, Result};
use shardline_sql::{metadata_of, ClauseBuilder, ClauseKind, Entity, Statement, Value};
use std::sync::Arc;

/// Group name reported for elements that never reached a group.
pub const UNROUTED: &str = "unrouted";

/// Outcome of a batched insert. Groups succeed or fail as a whole; an
/// element that cannot be routed fails on its own under [`UNROUTED`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertReport {
    /// Rows written across all successful groups.
    pub success: u64,
    /// Input positions of the entities that were not written, ascending.
    pub failed: Vec<usize>,
    pub errors: Vec<GroupFailure>,
}

impl InsertReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.errors.is_empty()
    }
}

impl Session {
    /// Insert one entity on the master of its group. A generated key is
    /// written back into the auto-increment column.
    pub async fn insert<E: Entity>(&mut self, entity: &mut E) -> Result<u64> {
        let state = self.take();
        insert_with(&self.engine, &state, entity).await
    }

    /// Insert each entity in turn, stopping at the first failure. Not
    /// atomic: rows written before the failure stay written.
    pub async fn insert_multi<E: Entity>(&mut self, entities: &mut [E]) -> Result<u64> {
        let state = self.take();
        let mut affected = 0;
        for (i, entity) in entities.iter_mut().enumerate() {
            match insert_with(&self.engine, &state, entity).await {
                Ok(rows) => affected += rows,
                Err(e) => {
                    tracing::warn!(index = i, written = affected, "insert_multi stopped early");
                    return Err(e);
                }
            }
        }
        Ok(affected)
    }

    /// Insert entities grouped by shard, one atomic batch per group, all
    /// groups concurrently. Generated keys are not written back.
    pub async fn insert_slice<E: Entity>(&mut self, entities: &[E]) -> Result<InsertReport> {
        let state = self.take();
        state.check_routing()?;
        let table = metadata_of::<E>()?;
        let dialect = self.engine.dialect();

        let mut report = InsertReport::default();
        let mut grouped: Vec<(Arc<DbGroup>, Vec<Statement>, Vec<usize>)> = Vec::new();
        for (i, entity) in entities.iter().enumerate() {
            let prepared = state
                .insert_group(&self.engine, &table, entity)
                .and_then(|group| Ok((group, dialect.insert(&table, entity, &state.clauses)?)));
            // An element that cannot be routed or rendered fails alone.
            let (group, statement) = match prepared {
                Ok(prepared) => prepared,
                Err(e) => {
                    tracing::warn!(index = i, error = %e, "Batched insert skipped an element");
                    report.failed.push(i);
                    report
                        .errors
                        .push(GroupFailure::new(UNROUTED, "", format!("element {}: {}", i, e.message)));
                    continue;
                }
            };
            match grouped.iter_mut().find(|(g, _, _)| Arc::ptr_eq(g, &group)) {
                Some((_, statements, indices)) => {
                    statements.push(statement);
                    indices.push(i);
                }
                None => grouped.push((group, vec![statement], vec![i])),
            }
        }

        let batches = grouped
            .into_iter()
            .map(|(group, statements, indices)| Batch {
                target: group
                    .master()
                    .and_then(|node| Target::new(&group, &node))
                    .map_err(|e| GroupFailure::new(group.name(), "", e.message)),
                statements,
                indices,
            })
            .collect();

        for (indices, outcome) in fanout::executed_batches(batches).await {
            match outcome {
                Ok(rows) => report.success += rows,
                Err(failure) => {
                    report.failed.extend(indices);
                    report.errors.push(failure);
                }
            }
        }
        report.failed.sort_unstable();
        if !report.is_complete() {
            tracing::warn!(
                table = %table.name(),
                failed = report.failed.len(),
                groups = report.errors.len(),
                "Batched insert partially failed"
            );
        }
        Ok(report)
    }

    /// Update from `entity`. Without any filter the update is keyed on the
    /// entity's primary key. Unrouted updates run on every master.
    pub async fn update<E: Entity>(&mut self, entity: &E) -> Result<u64> {
        let mut state = self.take();
        state.check_routing()?;
        let table = metadata_of::<E>()?;

        if !state.clauses.has_filter() && !state.clauses.has(ClauseKind::RawQuery) {
            let pk = table.primary_key_value(entity)?;
            state.clauses.id(pk);
        }
        state.check_id(&table)?;
        if state.group.is_none() {
            if let Some(value) = table.shard_value(entity) {
                state.route(&self.engine, value);
                state.check_routing()?;
            }
        }

        let statement = self.engine.dialect().update(&table, entity, &state.clauses)?;
        check_bounded(&self.engine, &statement, "update", table.name())?;
        write(&self.engine, &state, "update", statement).await
    }

    /// Delete matching rows. Unrouted deletes run on every master.
    pub async fn delete<E: Entity>(&mut self) -> Result<u64> {
        let state = self.take();
        state.check_routing()?;
        let table = metadata_of::<E>()?;
        state.check_id(&table)?;

        let statement = self.engine.dialect().delete(&table, &state.clauses);
        check_bounded(&self.engine, &statement, "delete", table.name())?;
        write(&self.engine, &state, "delete", statement).await
    }

    /// Run a raw statement on the routed master, or the default group's
    /// master when unrouted.
    pub async fn exec(&mut self, sql: &str, args: Vec<Value>) -> Result<ExecResult> {
        let state = self.take();
        state.check_routing()?;
        let group = match &state.group {
            Some(group) => group.clone(),
            None => self.engine.cluster().default_group()?,
        };
        let target = Target::new(&group, &group.master()?)?;
        execute_one(&target, &Statement::new(sql, args)).await
    }
}

async fn insert_with<E: Entity>(engine: &Engine, state: &SessionState, entity: &mut E) -> Result<u64> {
    state.check_routing()?;
    let table = metadata_of::<E>()?;
    let group = state.insert_group(engine, &table, entity)?;
    let statement = engine.dialect().insert(&table, entity, &state.clauses)?;

    let target = Target::new(&group, &group.master()?)?;
    let result = execute_one(&target, &statement).await?;
    if let (Some(auto), Some(id)) = (table.auto_column(), result.last_insert_id) {
        table.write(auto, entity, Value::Int(id))?;
    }
    Ok(result.rows_affected)
}

/// Pinned writes go to one master; the rest run on all of them.
async fn write(engine: &Engine, state: &SessionState, operation: &str, statement: Statement) -> Result<u64> {
    match state.pinned_group(engine)? {
        Some(group) => {
            let target = Target::new(&group, &group.master()?)?;
            Ok(execute_one(&target, &statement).await?.rows_affected)
        }
        None => {
            let targets = master_targets(engine)?;
            fanout::executed_everywhere(operation, targets, Arc::new(statement)).await
        }
    }
}

pub(crate) async fn execute_one(target: &Target, statement: &Statement) -> Result<ExecResult> {
    tracing::debug!(target: "shardline::session", group = %target.group, node = %target.node, sql = %statement, "Execute");
    target
        .conn
        .execute(&statement.sql, &statement.args)
        .await
        .map_err(|e| target.fail(e))
}
