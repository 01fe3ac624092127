use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

// Default constants
pub const DEFAULT_FANOUT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_REFUSE_TABLE_SCAN: bool = true;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 1;
pub const DEFAULT_BASE_DELAY_MS: u64 = 200;
pub const DEFAULT_MAX_DELAY_MS: u64 = 5_000;
pub const ENV_PREFIX: &str = "SHARDLINE";

// Connection strings carry credentials; never echo them back.
fn serialize_secret<S>(_secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str("[REDACTED]")
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(SecretString::from(s))
}

/// Role of a node inside its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Master,
    Slave,
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeRole::Master => write!(f, "master"),
            NodeRole::Slave => write!(f, "slave"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NodeConfig {
    #[validate(length(min = 1))]
    pub name: String,

    #[serde(
        alias = "connection",
        serialize_with = "serialize_secret",
        deserialize_with = "deserialize_secret"
    )]
    pub conn_string: SecretString,

    #[serde(alias = "role")]
    pub node_type: NodeRole,

    /// Advisory only; routing never reads it.
    #[serde(default)]
    pub weight: i8,
}

impl NodeConfig {
    pub fn new(name: impl Into<String>, conn_string: impl Into<String>, node_type: NodeRole) -> Self {
        Self {
            name: name.into(),
            conn_string: SecretString::from(conn_string.into()),
            node_type,
            weight: 0,
        }
    }

    pub fn connection_string(&self) -> &str {
        self.conn_string.expose_secret()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GroupConfig {
    #[validate(length(min = 1))]
    pub name: String,

    #[serde(default)]
    pub range_from: i64,

    #[serde(default)]
    pub range_to: i64,

    #[serde(default)]
    pub is_default: bool,

    #[validate(length(min = 1), nested)]
    pub nodes: Vec<NodeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ClusterConfig {
    /// Size of the shard space; shard values are reduced modulo this.
    #[serde(alias = "total")]
    #[validate(range(min = 1))]
    pub total_groups: u64,

    #[validate(length(min = 1), nested)]
    pub groups: Vec<GroupConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}

#[derive(Debug, Deserialize, Serialize, Clone, Validate)]
pub struct EngineSettings {
    /// Ceiling for fan-out reads.
    #[serde(default = "default_fanout_timeout_ms")]
    #[validate(range(min = 1))]
    pub fanout_timeout_ms: u64,

    /// Refuse `find` statements with neither a filter nor paging.
    #[serde(default = "default_refuse_table_scan")]
    pub refuse_table_scan: bool,

    /// Applied per node when opening connections.
    #[serde(default)]
    pub retry: RetrySettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            fanout_timeout_ms: default_fanout_timeout_ms(),
            refuse_table_scan: default_refuse_table_scan(),
            retry: RetrySettings::default(),
        }
    }
}

impl EngineSettings {
    pub fn fanout_timeout(&self) -> Duration {
        Duration::from_millis(self.fanout_timeout_ms)
    }

    pub fn with_fanout_timeout(mut self, timeout: Duration) -> Self {
        self.fanout_timeout_ms = timeout.as_millis().max(1) as u64;
        self
    }
}

fn default_fanout_timeout_ms() -> u64 {
    DEFAULT_FANOUT_TIMEOUT_MS
}

fn default_refuse_table_scan() -> bool {
    DEFAULT_REFUSE_TABLE_SCAN
}

/// Bootstrap document: driver name plus cluster description.
#[derive(Debug, Deserialize, Serialize, Clone, Validate)]
pub struct EngineConfig {
    #[serde(alias = "dialect")]
    #[validate(length(min = 1))]
    pub driver: String,

    #[validate(nested)]
    pub cluster: ClusterConfig,

    #[serde(default)]
    #[validate(nested)]
    pub settings: EngineSettings,
}

impl EngineConfig {
    /// Load from a JSON, YAML or TOML file (format picked from the extension),
    /// with `SHARDLINE__SECTION__KEY` environment overrides.
    pub fn from_file(path: &str) -> Result<Self> {
        if !std::path::Path::new(path).exists() {
            anyhow::bail!("Configuration file '{}' does not exist", path);
        }

        let cfg = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to build configuration from '{}'", path))?;

        Self::finish(cfg)
    }

    /// Parse an in-memory document.
    pub fn from_str(content: &str, format: config::FileFormat) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::from_str(content, format))
            .build()
            .context("Failed to build configuration")?;

        Self::finish(cfg)
    }

    fn finish(cfg: config::Config) -> Result<Self> {
        let engine_config: EngineConfig = cfg
            .try_deserialize()
            .context("Failed to deserialize engine configuration")?;

        engine_config
            .validate()
            .map_err(|e| anyhow::anyhow!("Configuration validation failed: {:?}", e))?;

        Ok(engine_config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON: &str = r#"{
        "driver": "sqlite",
        "cluster": {
            "total_groups": 10,
            "groups": [
                {
                    "name": "group1",
                    "range_from": 0,
                    "range_to": 5,
                    "is_default": true,
                    "nodes": [
                        { "name": "g1_master", "conn_string": "file:g1.db", "node_type": "master" },
                        { "name": "g1_node1", "conn_string": "file:g1.db", "node_type": "slave", "weight": 2 }
                    ]
                },
                {
                    "name": "group2",
                    "range_from": 5,
                    "range_to": 10,
                    "nodes": [
                        { "name": "g2_master", "conn_string": "file:g2.db", "node_type": "master" }
                    ]
                }
            ]
        }
    }"#;

    #[test]
    fn test_parse_json_document() {
        let config = EngineConfig::from_str(JSON, config::FileFormat::Json).unwrap();
        assert_eq!(config.driver, "sqlite");
        assert_eq!(config.cluster.total_groups, 10);
        assert_eq!(config.cluster.groups.len(), 2);
        assert!(config.cluster.groups[0].is_default);
        assert_eq!(config.cluster.groups[0].nodes[1].node_type, NodeRole::Slave);
        assert_eq!(config.cluster.groups[0].nodes[1].weight, 2);
        assert_eq!(config.cluster.groups[1].nodes[0].connection_string(), "file:g2.db");
        assert_eq!(config.settings.fanout_timeout_ms, DEFAULT_FANOUT_TIMEOUT_MS);
        assert!(config.settings.refuse_table_scan);
    }

    #[test]
    fn test_connection_string_is_redacted() {
        let node = NodeConfig::new("n1", "server=db;password=hunter2", NodeRole::Master);
        let json = serde_json::to_string(&node).unwrap();
        assert!(json.contains("[REDACTED]"));
        assert!(!json.contains("hunter2"));
    }

    #[test]
    fn test_group_without_nodes_fails_validation() {
        let doc = r#"{
            "driver": "sqlite",
            "cluster": { "total_groups": 1, "groups": [ { "name": "g", "nodes": [] } ] }
        }"#;
        assert!(EngineConfig::from_str(doc, config::FileFormat::Json).is_err());
    }

    #[test]
    fn test_zero_total_fails_validation() {
        let doc = r#"{
            "driver": "sqlite",
            "cluster": {
                "total_groups": 0,
                "groups": [ { "name": "g", "nodes": [ { "name": "n", "conn_string": "x", "node_type": "master" } ] } ]
            }
        }"#;
        assert!(EngineConfig::from_str(doc, config::FileFormat::Json).is_err());
    }

    #[test]
    fn test_yaml_file_with_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cluster.yaml");
        std::fs::write(
            &path,
            r#"
dialect: mssql
settings:
  fanout_timeout_ms: 250
  refuse_table_scan: false
cluster:
  total: 4
  groups:
    - name: only
      nodes:
        - name: m
          connection: "server=localhost"
          role: master
"#,
        )
        .unwrap();

        let config = EngineConfig::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.driver, "mssql");
        assert_eq!(config.cluster.total_groups, 4);
        assert_eq!(config.settings.fanout_timeout(), Duration::from_millis(250));
        assert!(!config.settings.refuse_table_scan);
        assert_eq!(config.settings.retry, RetrySettings::default());
    }

    #[test]
    fn test_missing_file() {
        assert!(EngineConfig::from_file("/definitely/not/here.json").is_err());
    }
}
