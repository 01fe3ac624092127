//! Cluster topology.
//!
//! A [`Cluster`] is a fixed list of [`DbGroup`]s, each owning a `[from,to)`
//! slice of the shard space and one master plus optional replicas. The graph
//! never changes after construction; the only shared mutable state is each
//! group's replica cursor and the memoized lookups.

use secrecy::{ExposeSecret, SecretString};
use shardline_common::config::{ClusterConfig, GroupConfig, NodeConfig, NodeRole};
use shardline_connectors::{Connection, Connector};
use shardline_error::{ErrorCode, ErrorContext, GroupFailure, Result, ShardlineError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

pub struct DbNode {
    name: String,
    role: NodeRole,
    weight: i8,
    descriptor: SecretString,
    conn: OnceLock<Arc<dyn Connection>>,
}

impl DbNode {
    pub fn new(name: impl Into<String>, role: NodeRole, descriptor: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role,
            weight: 0,
            descriptor: SecretString::from(descriptor.into()),
            conn: OnceLock::new(),
        }
    }

    pub fn from_config(config: &NodeConfig) -> Self {
        let mut node = Self::new(&config.name, config.node_type, config.connection_string());
        node.weight = config.weight;
        node
    }

    /// Node with an already open connection.
    pub fn with_connection(
        name: impl Into<String>,
        role: NodeRole,
        conn: Arc<dyn Connection>,
    ) -> Self {
        let node = Self::new(name, role, "");
        let _ = node.conn.set(conn);
        node
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn is_master(&self) -> bool {
        self.role == NodeRole::Master
    }

    /// Advisory; routing ignores it.
    pub fn weight(&self) -> i8 {
        self.weight
    }

    pub fn is_open(&self) -> bool {
        self.conn.get().is_some()
    }

    pub fn connection(&self) -> Result<Arc<dyn Connection>> {
        self.conn.get().cloned().ok_or_else(|| {
            ShardlineError::new(
                ErrorCode::NotConnected,
                format!("Node '{}' has not been opened", self.name),
            )
            .with_hint("Call Engine::open before running statements")
        })
    }

    async fn open(&self, connector: &dyn Connector) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }
        let conn = connector
            .connect(&self.name, self.descriptor.expose_secret())
            .await?;
        let _ = self.conn.set(conn);
        Ok(())
    }
}

impl std::fmt::Debug for DbNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbNode")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("weight", &self.weight)
            .field("open", &self.is_open())
            .finish()
    }
}

#[derive(Debug)]
pub struct DbGroup {
    name: String,
    range_from: i64,
    range_to: i64,
    is_default: bool,
    nodes: Vec<Arc<DbNode>>,
    master: OnceLock<Option<Arc<DbNode>>>,
    replicas: OnceLock<Vec<Arc<DbNode>>>,
    cursor: AtomicUsize,
}

impl DbGroup {
    pub fn new(name: impl Into<String>, range_from: i64, range_to: i64, nodes: Vec<DbNode>) -> Self {
        Self {
            name: name.into(),
            range_from,
            range_to,
            is_default: false,
            nodes: nodes.into_iter().map(Arc::new).collect(),
            master: OnceLock::new(),
            replicas: OnceLock::new(),
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn from_config(config: &GroupConfig) -> Self {
        let nodes = config.nodes.iter().map(DbNode::from_config).collect();
        Self::new(&config.name, config.range_from, config.range_to, nodes)
            .with_default(config.is_default)
    }

    pub fn with_default(mut self, is_default: bool) -> Self {
        self.is_default = is_default;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn range(&self) -> (i64, i64) {
        (self.range_from, self.range_to)
    }

    pub fn is_default(&self) -> bool {
        self.is_default
    }

    pub fn nodes(&self) -> &[Arc<DbNode>] {
        &self.nodes
    }

    pub fn contains(&self, value: i64) -> bool {
        value >= self.range_from && value < self.range_to
    }

    /// The sole node, else the node flagged master.
    pub fn master(&self) -> Result<Arc<DbNode>> {
        let master = self.master.get_or_init(|| {
            if self.nodes.len() == 1 {
                return self.nodes.first().cloned();
            }
            self.nodes.iter().find(|n| n.is_master()).cloned()
        });
        master.clone().ok_or_else(|| {
            ShardlineError::new(
                ErrorCode::NoMasterNode,
                format!("Group '{}' has no master node", self.name),
            )
            .with_hint("Flag one node with node_type \"master\"")
        })
    }

    /// Read node: the sole node, else the next replica in round-robin order.
    /// A group without replicas reads from its master.
    pub fn node(&self) -> Result<Arc<DbNode>> {
        if self.nodes.len() == 1 {
            return self.master();
        }
        let replicas = self.replicas.get_or_init(|| {
            self.nodes
                .iter()
                .filter(|n| n.role() == NodeRole::Slave)
                .cloned()
                .collect()
        });
        if replicas.is_empty() {
            return self.master();
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % replicas.len();
        let node = replicas[index].clone();
        tracing::debug!(target: "shardline::routing", group = %self.name, node = %node.name(), "Selected read node");
        Ok(node)
    }

    pub(crate) fn pick(&self, force_master: bool) -> Result<Arc<DbNode>> {
        if force_master {
            self.master()
        } else {
            self.node()
        }
    }
}

#[derive(Debug)]
pub struct Cluster {
    total: u64,
    groups: Vec<Arc<DbGroup>>,
    default_group: OnceLock<Option<Arc<DbGroup>>>,
}

impl Cluster {
    pub fn new(total: u64, groups: Vec<DbGroup>) -> Result<Self> {
        if groups.is_empty() {
            return Err(ShardlineError::new(
                ErrorCode::EmptyCluster,
                "Cluster has no groups",
            ));
        }
        if total == 0 {
            return Err(ShardlineError::new(
                ErrorCode::InvalidConfig,
                "Cluster total must be at least 1",
            )
            .with_context(ErrorContext::Config {
                file_path: None,
                field: Some("total_groups".to_string()),
            }));
        }
        Ok(Self {
            total,
            groups: groups.into_iter().map(Arc::new).collect(),
            default_group: OnceLock::new(),
        })
    }

    pub fn from_config(config: &ClusterConfig) -> Result<Self> {
        let groups = config.groups.iter().map(DbGroup::from_config).collect();
        Self::new(config.total_groups, groups)
    }

    /// One group holding one node.
    pub fn single(node: DbNode) -> Self {
        Self {
            total: 1,
            groups: vec![Arc::new(
                DbGroup::new("default", 0, 1, vec![node]).with_default(true),
            )],
            default_group: OnceLock::new(),
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn groups(&self) -> &[Arc<DbGroup>] {
        &self.groups
    }

    pub fn has_single_group(&self) -> bool {
        self.groups.len() == 1
    }

    /// Group whose range holds `shard_value mod total`. A cluster with one
    /// group answers every value.
    pub fn find_group(&self, shard_value: i64) -> Result<Arc<DbGroup>> {
        if let [only] = self.groups.as_slice() {
            return Ok(only.clone());
        }
        let slot = shard_value.rem_euclid(self.total as i64);
        self.groups
            .iter()
            .find(|g| g.contains(slot))
            .cloned()
            .ok_or_else(|| {
                ShardlineError::new(
                    ErrorCode::NoGroupForShard,
                    format!("No group covers shard value {} (slot {})", shard_value, slot),
                )
                .with_context(ErrorContext::Routing {
                    shard_value,
                    total_groups: self.total,
                })
            })
    }

    /// The sole group, else the group flagged default.
    pub fn default_group(&self) -> Result<Arc<DbGroup>> {
        let group = self.default_group.get_or_init(|| {
            if self.groups.len() == 1 {
                return self.groups.first().cloned();
            }
            self.groups.iter().find(|g| g.is_default()).cloned()
        });
        group.clone().ok_or_else(|| {
            ShardlineError::new(
                ErrorCode::NoDefaultGroup,
                "Cluster has several groups and none is flagged default",
            )
            .with_hint("Set is_default on exactly one group")
        })
    }

    /// Gaps, overlaps and duplicate default flags in the group ranges. Gaps
    /// are tolerated when a default group catches the uncovered values.
    pub fn range_problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.groups.len() < 2 {
            return problems;
        }

        let defaults = self.groups.iter().filter(|g| g.is_default()).count();
        if defaults > 1 {
            problems.push(format!("{} groups are flagged default", defaults));
        }

        let mut ranges: Vec<(i64, i64, &str)> = self
            .groups
            .iter()
            .map(|g| (g.range_from, g.range_to, g.name()))
            .collect();
        ranges.sort_by_key(|r| (r.0, r.1));

        let mut covered_to = 0i64;
        for (from, to, name) in &ranges {
            if to <= from {
                problems.push(format!("group '{}' has an empty range [{},{})", name, from, to));
                continue;
            }
            if *from < covered_to {
                problems.push(format!(
                    "group '{}' range [{},{}) overlaps values below {}",
                    name, from, to, covered_to
                ));
            } else if *from > covered_to && defaults == 0 {
                problems.push(format!("values [{},{}) are not covered", covered_to, from));
            }
            covered_to = covered_to.max(*to);
        }
        let total = self.total as i64;
        if covered_to < total && defaults == 0 {
            problems.push(format!("values [{},{}) are not covered", covered_to, total));
        }
        problems
    }

    /// Open every node in order; the first failure aborts.
    pub async fn open(&self, connector: &dyn Connector) -> Result<()> {
        for group in &self.groups {
            for node in group.nodes() {
                node.open(connector).await.map_err(|e| {
                    tracing::error!(group = %group.name(), node = %node.name(), error = %e, "Failed to open node");
                    e.with_context(ErrorContext::Node {
                        group: group.name().to_string(),
                        node: node.name().to_string(),
                    })
                })?;
            }
        }
        Ok(())
    }

    /// Close every open node, reporting all failures together.
    pub async fn close(&self) -> Result<()> {
        let mut failures = Vec::new();
        for group in &self.groups {
            for node in group.nodes() {
                let Some(conn) = node.conn.get() else {
                    continue;
                };
                if let Err(e) = conn.close().await {
                    tracing::error!(group = %group.name(), node = %node.name(), error = %e, "Failed to close node");
                    failures.push(GroupFailure::new(group.name(), node.name(), e.message));
                }
            }
        }
        if failures.is_empty() {
            return Ok(());
        }
        let mut err = ShardlineError::fan_out("close", failures, None);
        err.code = ErrorCode::CloseFailed;
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, role: NodeRole) -> DbNode {
        DbNode::new(name, role, "unused")
    }

    fn two_groups() -> Cluster {
        Cluster::new(
            10,
            vec![
                DbGroup::new("a", 0, 5, vec![node("a_master", NodeRole::Master)]),
                DbGroup::new("b", 5, 10, vec![node("b_master", NodeRole::Master)]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_find_group_by_modulo() {
        let cluster = two_groups();
        assert_eq!(cluster.find_group(7).unwrap().name(), "b");
        assert_eq!(cluster.find_group(12).unwrap().name(), "a");
        assert_eq!(cluster.find_group(0).unwrap().name(), "a");
        assert_eq!(cluster.find_group(-3).unwrap().name(), "b");
        for v in 0..10 {
            let hits = cluster.groups().iter().filter(|g| g.contains(v)).count();
            assert_eq!(hits, 1);
        }
        assert!(cluster.range_problems().is_empty());
    }

    #[test]
    fn test_uncovered_value_fails() {
        let cluster = Cluster::new(
            10,
            vec![
                DbGroup::new("a", 0, 3, vec![node("a", NodeRole::Master)]),
                DbGroup::new("b", 5, 10, vec![node("b", NodeRole::Master)]),
            ],
        )
        .unwrap();
        let err = cluster.find_group(4).unwrap_err();
        assert_eq!(err.code, ErrorCode::NoGroupForShard);
        assert!(err.is_routing());
        assert!(cluster.default_group().is_err());
        assert_eq!(cluster.range_problems(), vec!["values [3,5) are not covered"]);
    }

    #[test]
    fn test_single_group_answers_everything() {
        let cluster = Cluster::new(
            10,
            vec![DbGroup::new("only", 0, 1, vec![node("m", NodeRole::Master)])],
        )
        .unwrap();
        assert_eq!(cluster.find_group(999).unwrap().name(), "only");
        assert_eq!(cluster.default_group().unwrap().name(), "only");
    }

    #[test]
    fn test_default_group_flag() {
        let cluster = Cluster::new(
            10,
            vec![
                DbGroup::new("a", 0, 5, vec![node("a", NodeRole::Master)]),
                DbGroup::new("b", 3, 10, vec![node("b", NodeRole::Master)]).with_default(true),
            ],
        )
        .unwrap();
        assert_eq!(cluster.default_group().unwrap().name(), "b");
        assert_eq!(cluster.range_problems().len(), 1);
    }

    #[test]
    fn test_replicas_round_robin() {
        let group = DbGroup::new(
            "g",
            0,
            10,
            vec![
                node("master", NodeRole::Master),
                node("r1", NodeRole::Slave),
                node("r2", NodeRole::Slave),
                node("r3", NodeRole::Slave),
            ],
        );
        let picked: Vec<String> = (0..6)
            .map(|_| group.node().unwrap().name().to_string())
            .collect();
        assert_eq!(picked, vec!["r1", "r2", "r3", "r1", "r2", "r3"]);
        assert_eq!(group.master().unwrap().name(), "master");
        assert_eq!(group.pick(true).unwrap().name(), "master");
    }

    #[test]
    fn test_no_replicas_reads_master() {
        let group = DbGroup::new(
            "g",
            0,
            10,
            vec![node("m", NodeRole::Master), node("m2", NodeRole::Master)],
        );
        assert_eq!(group.node().unwrap().name(), "m");

        let headless = DbGroup::new(
            "h",
            0,
            10,
            vec![node("s1", NodeRole::Slave), node("s2", NodeRole::Slave)],
        );
        assert_eq!(headless.master().unwrap_err().code, ErrorCode::NoMasterNode);
        assert_eq!(headless.node().unwrap().name(), "s1");

        let sole = DbGroup::new("s", 0, 10, vec![node("only", NodeRole::Slave)]);
        assert_eq!(sole.master().unwrap().name(), "only");
    }

    #[test]
    fn test_empty_cluster_rejected() {
        assert_eq!(
            Cluster::new(10, vec![]).unwrap_err().code,
            ErrorCode::EmptyCluster
        );
    }

    #[test]
    fn test_unopened_node() {
        let n = node("x", NodeRole::Master);
        assert_eq!(n.connection().err().unwrap().code, ErrorCode::NotConnected);
    }
}
