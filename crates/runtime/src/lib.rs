//! Shardline runtime: sharded access to a cluster of relational databases.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌──────────────────────────┐
//! │  Engine  │──▶│ Session │──▶│ Cluster                  │
//! └──────────┘   └────┬────┘   │  group a: master, r1, r2 │
//!                     │        │  group b: master         │
//!                     ▼        └──────────────────────────┘
//!               fan-out workers (one per group)
//! ```
//!
//! Sessions route a statement to the group owning its shard value, or fan
//! it out to every group when no value is known.
//!
//! # Example
//!
//! ```rust,ignore
//! let engine = Engine::from_file("config/cluster.yaml")?;
//! engine.open().await?;
//! let mut order = Order::default();
//! let found = engine.session().shard_value(42).id(7).get(&mut order).await?;
//! ```

pub mod cluster;
pub mod engine;
mod fanout;
pub mod session;
pub mod transaction;

pub use cluster::{Cluster, DbGroup, DbNode};
pub use engine::Engine;
pub use session::{InsertReport, Session, UNROUTED};
pub use transaction::Transaction;

pub use shardline_common::config::{EngineConfig, EngineSettings, NodeRole};
pub use shardline_error::{ErrorCode, Result, ShardlineError};
pub use shardline_sql::{args, ClauseBuilder, ClauseList, Entity, EntityDescriptor, Value};
