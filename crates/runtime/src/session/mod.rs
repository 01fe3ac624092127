//! Sessions.
//!
//! A [`Session`] accumulates clause tokens and an optional shard route, then
//! a terminal call (`get`, `find`, `count`, `insert`, `update`, ...) renders
//! one statement and dispatches it. Every terminal call starts by taking the
//! accumulated state, so the session is empty again afterwards whether the
//! call succeeded or not.
//!
//! Dispatch rules:
//! - reads with a resolved shard key, or on a one-group cluster, go to one
//!   node of that group (a replica unless `force_master`);
//! - other reads fan out to every group;
//! - inserts go to the master of the routed group, else the default group;
//! - updates and deletes without a resolved shard key run on every master.

mod exec;
mod query;

pub use exec::{InsertReport, UNROUTED};

use crate::cluster::DbGroup;
use crate::engine::Engine;
use crate::fanout::Target;
use shardline_error::{ErrorCode, Result, ShardlineError};
use shardline_sql::{Clause, ClauseBuilder, ClauseKind, ClauseList, Statement, TableMetadata};
use std::sync::Arc;

/// Accumulated clauses and routing of one pending statement.
#[derive(Debug, Clone, Default)]
pub(crate) struct SessionState {
    pub clauses: ClauseList,
    pub group: Option<Arc<DbGroup>>,
    pub has_shard_key: bool,
    pub force_master: bool,
    /// Set when a shard value matched no group and no default exists.
    pub routing_error: Option<ShardlineError>,
}

impl SessionState {
    /// Resolve `value` to its group. A miss falls back to the default group
    /// without marking the key as resolved.
    pub fn route(&mut self, engine: &Engine, value: i64) {
        let cluster = engine.cluster();
        match cluster.find_group(value) {
            Ok(group) => {
                tracing::debug!(target: "shardline::routing", shard_value = value, group = %group.name(), "Routed");
                self.group = Some(group);
                self.has_shard_key = true;
                self.routing_error = None;
            }
            Err(miss) => {
                self.has_shard_key = false;
                match cluster.default_group() {
                    Ok(group) => {
                        tracing::debug!(target: "shardline::routing", shard_value = value, group = %group.name(), "No group owns value, using default");
                        self.group = Some(group);
                        self.routing_error = None;
                    }
                    Err(_) => {
                        self.group = None;
                        self.routing_error = Some(
                            miss.with_hint("Cover the value with a group range or flag a default group"),
                        );
                    }
                }
            }
        }
    }

    pub fn check_routing(&self) -> Result<()> {
        match &self.routing_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    pub fn check_id<E>(&self, table: &TableMetadata<E>) -> Result<()> {
        check_id(table, &self.clauses)
    }

    /// The single group a statement is pinned to, if any.
    pub fn pinned_group(&self, engine: &Engine) -> Result<Option<Arc<DbGroup>>> {
        if self.has_shard_key {
            if let Some(group) = &self.group {
                return Ok(Some(group.clone()));
            }
        }
        let cluster = engine.cluster();
        if cluster.has_single_group() {
            return Ok(Some(cluster.default_group()?));
        }
        Ok(None)
    }

    /// Group an insert lands on: the explicit route, else the entity's own
    /// shard value, else the default group.
    pub fn insert_group<E>(
        &self,
        engine: &Engine,
        table: &TableMetadata<E>,
        entity: &E,
    ) -> Result<Arc<DbGroup>> {
        if let Some(group) = &self.group {
            return Ok(group.clone());
        }
        match table.shard_value(entity) {
            Some(value) => {
                let mut routed = SessionState::default();
                routed.route(engine, value);
                routed.check_routing()?;
                routed.group.map_or_else(|| engine.cluster().default_group(), Ok)
            }
            None => engine.cluster().default_group(),
        }
    }
}

/// An `id` token needs a primary key column to render.
pub(crate) fn check_id<E>(table: &TableMetadata<E>, clauses: &ClauseList) -> Result<()> {
    if clauses.has(ClauseKind::Id) && table.primary_key().is_none() {
        return Err(table.missing_primary_key());
    }
    Ok(())
}

/// With `refuse_table_scan` on, refuse a statement that would touch every
/// row of `table`.
pub(crate) fn check_bounded(engine: &Engine, statement: &Statement, verb: &str, table: &str) -> Result<()> {
    if engine.settings().refuse_table_scan && !statement.is_bounded() {
        return Err(ShardlineError::new(
            ErrorCode::UnboundedScan,
            format!("Refusing to {} every row of '{}'", verb, table),
        )
        .with_hint("Add a where clause or a limit, or disable refuse_table_scan"));
    }
    Ok(())
}

/// Read node of every group, for fan-out reads.
pub(crate) fn read_targets(engine: &Engine, force_master: bool) -> Result<Vec<Target>> {
    engine
        .cluster()
        .groups()
        .iter()
        .map(|group| Target::new(group, &group.pick(force_master)?))
        .collect()
}

/// Master of every group, for fan-out writes.
pub(crate) fn master_targets(engine: &Engine) -> Result<Vec<Target>> {
    engine
        .cluster()
        .groups()
        .iter()
        .map(|group| Target::new(group, &group.master()?))
        .collect()
}

pub struct Session {
    engine: Engine,
    state: SessionState,
}

impl Session {
    pub(crate) fn new(engine: Engine) -> Self {
        Self {
            engine,
            state: SessionState::default(),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Pin the next statement to the group owning `value`. A value no group
    /// owns falls back to the default group and the statement is treated as
    /// unrouted.
    pub fn shard_value(&mut self, value: i64) -> &mut Self {
        self.state.route(&self.engine, value);
        self
    }

    /// Read from the master instead of a replica.
    pub fn force_master(&mut self) -> &mut Self {
        self.state.force_master = true;
        self
    }

    /// Append a prepared filter.
    pub fn extend(&mut self, list: &ClauseList) -> &mut Self {
        self.state.clauses.append(list);
        self
    }

    /// New session with the same clauses and routing.
    pub fn fork(&self) -> Session {
        Session {
            engine: self.engine.clone(),
            state: self.state.clone(),
        }
    }

    /// Accumulated tokens, in call order.
    pub fn clauses(&self) -> &ClauseList {
        &self.state.clauses
    }

    pub fn has_shard_key(&self) -> bool {
        self.state.has_shard_key
    }

    /// Routed group name, if any.
    pub fn group_name(&self) -> Option<&str> {
        self.state.group.as_deref().map(DbGroup::name)
    }

    /// Drop everything accumulated so far.
    pub fn reset(&mut self) {
        self.state = SessionState::default();
    }

    fn take(&mut self) -> SessionState {
        std::mem::take(&mut self.state)
    }
}

impl ClauseBuilder for Session {
    fn push_clause(&mut self, clause: Clause) -> &mut Self {
        self.state.clauses.push(clause);
        self
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("clauses", &self.state.clauses)
            .field("group", &self.group_name())
            .field("has_shard_key", &self.state.has_shard_key)
            .field("force_master", &self.state.force_master)
            .finish()
    }
}
