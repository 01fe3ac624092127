use crate::cluster::{Cluster, DbNode};
use crate::session::{InsertReport, Session};
use crate::transaction::Transaction;
use shardline_common::config::{EngineConfig, EngineSettings, NodeRole};
use shardline_connectors::{connector_for, Connector};
use shardline_error::Result;
use shardline_sql::{
    metadata_of, route_dialect, ClauseBuilder, ClauseList, Dialect, Entity, Value,
};
use std::sync::Arc;

struct EngineInner {
    driver: String,
    dialect: Dialect,
    cluster: Cluster,
    settings: EngineSettings,
}

/// Entry point: a cluster, the dialect its driver speaks, and the settings
/// every session inherits. Cheap to clone.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    pub fn new(driver: &str, cluster: Cluster, settings: EngineSettings) -> Result<Self> {
        let dialect = route_dialect(driver)?;
        for problem in cluster.range_problems() {
            tracing::warn!(problem = %problem, "Suspicious shard ranges");
        }
        tracing::info!(
            driver,
            dialect = dialect.name(),
            groups = cluster.groups().len(),
            total = cluster.total(),
            "Engine created"
        );
        Ok(Self {
            inner: Arc::new(EngineInner {
                driver: driver.to_string(),
                dialect,
                cluster,
                settings,
            }),
        })
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let cluster = Cluster::from_config(&config.cluster)?;
        Self::new(&config.driver, cluster, config.settings.clone())
    }

    /// Load, validate and build from a YAML/TOML/JSON file.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let config = EngineConfig::from_file(path)?;
        Ok(Self::from_config(&config)?)
    }

    /// One group with one master node.
    pub fn single(driver: &str, descriptor: &str) -> Result<Self> {
        let node = DbNode::new("master", NodeRole::Master, descriptor);
        Self::new(driver, Cluster::single(node), EngineSettings::default())
    }

    /// Open every node through the connector registered for the driver.
    pub async fn open(&self) -> Result<()> {
        let connector = connector_for(&self.inner.driver, self.inner.settings.retry)?;
        self.open_with(connector.as_ref()).await
    }

    pub async fn open_with(&self, connector: &dyn Connector) -> Result<()> {
        self.inner.cluster.open(connector).await?;
        tracing::info!(driver = %self.inner.driver, "Cluster opened");
        Ok(())
    }

    pub async fn close(&self) -> Result<()> {
        self.inner.cluster.close().await?;
        tracing::info!(driver = %self.inner.driver, "Cluster closed");
        Ok(())
    }

    pub fn driver(&self) -> &str {
        &self.inner.driver
    }

    pub fn dialect(&self) -> Dialect {
        self.inner.dialect
    }

    pub fn cluster(&self) -> &Cluster {
        &self.inner.cluster
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.inner.settings
    }

    /// Fresh session with no clauses and no routing.
    pub fn session(&self) -> Session {
        Session::new(self.clone())
    }

    /// Transaction on the master of the group owning `shard_value`, or of
    /// the default group when no group owns it.
    pub async fn begin(&self, shard_value: i64) -> Result<Transaction> {
        Transaction::begin(self.clone(), shard_value).await
    }

    pub fn table_name<E: Entity>(&self) -> Result<String> {
        Ok(metadata_of::<E>()?.name().to_string())
    }

    pub async fn get_by_pk<E: Entity>(&self, pk: impl Into<Value>, entity: &mut E) -> Result<bool> {
        self.session().id(pk).get(entity).await
    }

    pub async fn get<E: Entity>(&self, filter: &ClauseList, entity: &mut E) -> Result<bool> {
        self.session().extend_clauses(filter).get(entity).await
    }

    /// Every row, optionally restricted to `cols`.
    pub async fn get_all<E: Entity>(&self, cols: Option<&str>) -> Result<Vec<E>> {
        let mut session = self.session();
        session.where_clause("1=1", Vec::new());
        if let Some(cols) = cols {
            session.cols(cols);
        }
        session.find().await
    }

    pub async fn get_all_by_page<E: Entity>(
        &self,
        skip: u64,
        size: u64,
        order_by: Option<&str>,
        cols: Option<&str>,
    ) -> Result<Vec<E>> {
        let mut session = self.session();
        session.limit(skip, size);
        if let Some(order) = order_by {
            session.order_by(order);
        }
        if let Some(cols) = cols {
            session.cols(cols);
        }
        session.find().await
    }

    pub async fn count<E: Entity>(&self, filter: &ClauseList) -> Result<i64> {
        self.session().extend_clauses(filter).count::<E>().await
    }

    pub async fn find<E: Entity>(&self, filter: &ClauseList) -> Result<Vec<E>> {
        self.session().extend_clauses(filter).find().await
    }

    pub async fn insert<E: Entity>(&self, entity: &mut E) -> Result<u64> {
        self.session().insert(entity).await
    }

    pub async fn insert_multi<E: Entity>(&self, entities: &mut [E]) -> Result<u64> {
        self.session().insert_multi(entities).await
    }

    pub async fn insert_slice<E: Entity>(&self, entities: &[E]) -> Result<InsertReport> {
        self.session().insert_slice(entities).await
    }

    /// Update by primary key. `cols` restricts the written columns.
    pub async fn update_by_pk<E: Entity>(
        &self,
        pk: impl Into<Value>,
        entity: &E,
        cols: Option<&str>,
    ) -> Result<u64> {
        let mut session = self.session();
        session.id(pk);
        if let Some(cols) = cols {
            session.cols(cols);
        }
        session.update(entity).await
    }

    pub async fn delete_by_pk<E: Entity>(&self, pk: impl Into<Value>) -> Result<u64> {
        self.session().id(pk).delete::<E>().await
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("driver", &self.inner.driver)
            .field("dialect", &self.inner.dialect)
            .field("cluster", &self.inner.cluster)
            .finish()
    }
}
