//! Fan-out behaviour against in-memory fake connections.

use anyhow::Result;
use async_trait::async_trait;
use shardline_connectors::{Connection, ExecResult, TransactionHandle};
use shardline_error::ErrorContext;
use shardline_runtime::{
    args, ClauseBuilder, Cluster, DbGroup, DbNode, Engine, EngineSettings, Entity,
    EntityDescriptor, ErrorCode, NodeRole, ShardlineError, Value, UNROUTED,
};
use shardline_sql::{ResultSet, Statement};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
enum Behavior {
    Count(i64),
    Rows(ResultSet),
    Affect(u64),
    Stall,
    Fail(&'static str),
}

struct Fake(Behavior);

impl Fake {
    fn connection(behavior: Behavior) -> Arc<dyn Connection> {
        Arc::new(Fake(behavior))
    }

    async fn respond(&self) -> Result<Behavior, ShardlineError> {
        match &self.0 {
            Behavior::Stall => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(Behavior::Stall)
            }
            Behavior::Fail(msg) => Err(ShardlineError::new(ErrorCode::ExecutionFailed, *msg)),
            other => Ok(other.clone()),
        }
    }
}

#[async_trait]
impl Connection for Fake {
    fn driver(&self) -> &'static str {
        "fake"
    }

    async fn query(&self, _sql: &str, _args: &[Value]) -> Result<ResultSet, ShardlineError> {
        Ok(match self.respond().await? {
            Behavior::Count(n) => ResultSet::new(vec!["count(1)".into()], vec![args![n]]),
            Behavior::Rows(rows) => rows,
            _ => ResultSet::default(),
        })
    }

    async fn execute(&self, _sql: &str, _args: &[Value]) -> Result<ExecResult, ShardlineError> {
        Ok(match self.respond().await? {
            Behavior::Affect(n) => ExecResult::new(n, None),
            _ => ExecResult::default(),
        })
    }

    async fn execute_batch(&self, statements: &[Statement]) -> Result<ExecResult, ShardlineError> {
        self.respond().await?;
        Ok(ExecResult::new(statements.len() as u64, None))
    }

    async fn begin(&self) -> Result<Box<dyn TransactionHandle>, ShardlineError> {
        Err(ShardlineError::new(ErrorCode::TransactionFailed, "fake"))
    }

    async fn close(&self) -> Result<(), ShardlineError> {
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Item {
    id: i64,
    name: String,
}

impl Entity for Item {
    fn describe(d: EntityDescriptor<Self>) -> EntityDescriptor<Self> {
        d.table("items")
            .column("id,pk,auto", |i| &i.id, |i| &mut i.id)
            .column("name", |i| &i.name, |i| &mut i.name)
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Ticket {
    id: i64,
    region: i64,
    title: String,
}

impl Entity for Ticket {
    fn describe(d: EntityDescriptor<Self>) -> EntityDescriptor<Self> {
        d.table("tickets")
            .column("id,pk,auto", |t| &t.id, |t| &mut t.id)
            .column("region,shard", |t| &t.region, |t| &mut t.region)
            .column("title", |t| &t.title, |t| &mut t.title)
    }
}

fn items(rows: &[(i64, &str)]) -> Behavior {
    Behavior::Rows(ResultSet::new(
        vec!["id".into(), "name".into()],
        rows.iter().map(|(id, name)| args![*id, *name]).collect(),
    ))
}

/// One single-master group per behaviour, splitting [0,10) evenly.
fn engine(behaviors: Vec<Behavior>, settings: EngineSettings) -> Result<Engine> {
    let width = 10 / behaviors.len() as i64;
    let groups = behaviors
        .into_iter()
        .enumerate()
        .map(|(i, behavior)| {
            let name = ((b'a' + i as u8) as char).to_string();
            let node = DbNode::with_connection(
                format!("{}_master", name),
                NodeRole::Master,
                Fake::connection(behavior),
            );
            let from = i as i64 * width;
            DbGroup::new(name, from, from + width, vec![node]).with_default(i == 0)
        })
        .collect();
    Ok(Engine::new("sqlite", Cluster::new(10, groups)?, settings)?)
}

fn quick() -> EngineSettings {
    EngineSettings::default().with_fanout_timeout(Duration::from_millis(100))
}

#[tokio::test]
async fn test_count_sums_every_group() -> Result<()> {
    let engine = engine(vec![Behavior::Count(3), Behavior::Count(4)], quick())?;
    assert_eq!(engine.session().count::<Item>().await?, 7);

    // A resolved shard key reads one group only.
    assert_eq!(engine.session().shard_value(7).count::<Item>().await?, 4);
    Ok(())
}

#[tokio::test]
async fn test_count_timeout_returns_partial_sum() -> Result<()> {
    let engine = engine(vec![Behavior::Count(3), Behavior::Stall], quick())?;
    let started = std::time::Instant::now();
    assert_eq!(engine.session().count::<Item>().await?, 3);
    assert!(started.elapsed() < Duration::from_secs(5));
    Ok(())
}

#[tokio::test]
async fn test_count_group_failure_is_reported() -> Result<()> {
    let engine = engine(vec![Behavior::Count(3), Behavior::Fail("gone")], quick())?;
    let err = engine.session().count::<Item>().await.unwrap_err();
    assert_eq!(err.code, ErrorCode::FanOutFailed);
    assert!(err.message.contains("b/b_master"));
    Ok(())
}

#[tokio::test]
async fn test_get_timeout_is_an_error() -> Result<()> {
    let engine = engine(vec![Behavior::Stall, Behavior::Stall], quick())?;
    let mut item = Item::default();
    let err = engine
        .session()
        .where_clause("name = ?", args!["x"])
        .get(&mut item)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::QueryTimeout);
    assert!(err.is_timeout());
    assert_eq!(item, Item::default());
    Ok(())
}

#[tokio::test]
async fn test_get_takes_first_non_empty_answer() -> Result<()> {
    let engine = engine(
        vec![items(&[]), Behavior::Fail("flaky"), items(&[(4, "found")])],
        quick(),
    )?;
    let mut item = Item::default();
    assert!(engine.session().id(4).get(&mut item).await?);
    assert_eq!(item, Item { id: 4, name: "found".into() });
    Ok(())
}

#[tokio::test]
async fn test_get_without_rows_is_not_found() -> Result<()> {
    let quiet = engine(vec![items(&[]), items(&[])], quick())?;
    let mut item = Item::default();
    assert!(!quiet.session().id(4).get(&mut item).await?);

    let failing = engine(vec![items(&[]), Behavior::Fail("down")], quick())?;
    let err = failing.session().id(4).get(&mut item).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::FanOutFailed);
    Ok(())
}

#[tokio::test]
async fn test_find_merges_groups() -> Result<()> {
    let engine = engine(
        vec![items(&[(1, "a1"), (2, "a2")]), items(&[(1, "b1")])],
        quick(),
    )?;
    let mut found: Vec<Item> = engine.session().where_clause("id > ?", args![0]).find().await?;
    found.sort_by(|x, y| x.name.cmp(&y.name));
    let names: Vec<&str> = found.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["a1", "a2", "b1"]);
    Ok(())
}

#[tokio::test]
async fn test_find_timeout_is_an_error() -> Result<()> {
    let engine = engine(vec![items(&[(1, "a1")]), Behavior::Stall], quick())?;
    let err = engine
        .session()
        .limit(0, 10)
        .find::<Item>()
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::QueryTimeout);
    Ok(())
}

#[tokio::test]
async fn test_write_failures_are_combined() -> Result<()> {
    let engine = engine(
        vec![
            Behavior::Affect(2),
            Behavior::Fail("disk full"),
            Behavior::Fail("locked"),
        ],
        quick(),
    )?;
    let err = engine
        .session()
        .where_clause("name = ?", args!["x"])
        .delete::<Item>()
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::FanOutFailed);
    assert!(err.message.contains("disk full"));
    assert!(err.message.contains("locked"));
    match err.context {
        Some(ErrorContext::FanOut {
            failures,
            affected_rows,
            ..
        }) => {
            assert_eq!(affected_rows, Some(2));
            let mut groups: Vec<String> = failures.into_iter().map(|f| f.group).collect();
            groups.sort();
            assert_eq!(groups, vec!["b", "c"]);
        }
        other => panic!("unexpected context: {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_writes_sum_affected_rows() -> Result<()> {
    let engine = engine(vec![Behavior::Affect(2), Behavior::Affect(3)], quick())?;
    let updated = engine
        .session()
        .where_clause("name = ?", args!["x"])
        .update(&Item { id: 1, name: "y".into() })
        .await?;
    assert_eq!(updated, 5);
    Ok(())
}

#[tokio::test]
async fn test_insert_slice_skips_unroutable_elements() -> Result<()> {
    // Values 8 and 9 belong to no group and there is no default.
    let group = |name: &str, from, to| {
        let node = DbNode::with_connection(
            format!("{}_master", name),
            NodeRole::Master,
            Fake::connection(Behavior::Affect(0)),
        );
        DbGroup::new(name, from, to, vec![node])
    };
    let cluster = Cluster::new(10, vec![group("a", 0, 5), group("b", 5, 8)])?;
    let engine = Engine::new("sqlite", cluster, quick())?;

    let tickets: Vec<Ticket> = [1, 9, 6]
        .into_iter()
        .map(|region| Ticket {
            id: 0,
            region,
            title: format!("r{}", region),
        })
        .collect();
    let report = engine.insert_slice(&tickets).await?;

    assert_eq!(report.success, 2);
    assert_eq!(report.failed, vec![1]);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].group, UNROUTED);
    assert!(report.errors[0].message.contains("element 1"));
    assert!(!report.is_complete());
    Ok(())
}

#[tokio::test]
async fn test_replica_reads_and_force_master() -> Result<()> {
    let group = DbGroup::new(
        "only",
        0,
        10,
        vec![
            DbNode::with_connection("m", NodeRole::Master, Fake::connection(Behavior::Count(1))),
            DbNode::with_connection("r", NodeRole::Slave, Fake::connection(Behavior::Count(2))),
        ],
    );
    let engine = Engine::new("sqlite", Cluster::new(10, vec![group])?, quick())?;
    assert_eq!(engine.session().count::<Item>().await?, 2);
    assert_eq!(engine.session().force_master().count::<Item>().await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_session_resets_after_terminal_call() -> Result<()> {
    let engine = engine(vec![Behavior::Count(3), Behavior::Count(4)], quick())?;
    let mut session = engine.session();
    session.shard_value(2).where_clause("id > ?", args![1]);
    let fork = session.fork();
    assert_eq!(fork.clauses().len(), 1);
    assert!(fork.has_shard_key());
    assert_eq!(fork.group_name(), Some("a"));

    assert_eq!(session.count::<Item>().await?, 3);
    assert!(session.clauses().is_empty());
    assert!(!session.has_shard_key());
    assert_eq!(session.count::<Item>().await?, 7);

    // The failing call still resets.
    session.id(1);
    let err = session.delete::<Missing>().await.unwrap_err();
    assert_eq!(err.code, ErrorCode::MissingPrimaryKey);
    assert!(session.clauses().is_empty());
    Ok(())
}

#[derive(Debug, Default)]
struct Missing {
    name: String,
}

impl Entity for Missing {
    fn describe(d: EntityDescriptor<Self>) -> EntityDescriptor<Self> {
        d.column("name", |m| &m.name, |m| &mut m.name)
    }
}
