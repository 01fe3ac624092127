use anyhow::Result;
use shardline_common::config::EngineConfig;
use std::io::Write;
use std::sync::{LazyLock, Mutex};

static ENV_MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

/// Sets environment variables for the life of the guard. Holds a global lock
/// so concurrent tests never see each other's overrides.
pub struct EnvGuard {
    _lock: std::sync::MutexGuard<'static, ()>,
    keys: Vec<String>,
}

impl EnvGuard {
    pub fn new(vars: Vec<(&str, &str)>) -> Self {
        let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let keys = vars
            .iter()
            .map(|(k, v)| {
                std::env::set_var(k, v);
                k.to_string()
            })
            .collect();
        Self { _lock: lock, keys }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for key in &self.keys {
            std::env::remove_var(key);
        }
    }
}

const CLUSTER: &str = r#"{
    "driver": "sqlite",
    "settings": { "fanout_timeout_ms": 1000 },
    "cluster": {
        "total_groups": 2,
        "groups": [
            { "name": "a", "range_from": 0, "range_to": 2, "is_default": true,
              "nodes": [{ "name": "m", "conn_string": "a.db", "node_type": "master" }] }
        ]
    }
}"#;

fn config_file() -> Result<tempfile::NamedTempFile> {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile()?;
    file.write_all(CLUSTER.as_bytes())?;
    Ok(file)
}

#[test]
fn test_environment_overrides_file_settings() -> Result<()> {
    let file = config_file()?;
    let _env = EnvGuard::new(vec![
        ("SHARDLINE__SETTINGS__FANOUT_TIMEOUT_MS", "250"),
        ("SHARDLINE__SETTINGS__REFUSE_TABLE_SCAN", "false"),
    ]);

    let config = EngineConfig::from_file(file.path().to_str().unwrap())?;
    assert_eq!(config.settings.fanout_timeout_ms, 250);
    assert!(!config.settings.refuse_table_scan);
    assert_eq!(config.cluster.groups.len(), 1);
    Ok(())
}

#[test]
fn test_file_values_apply_without_overrides() -> Result<()> {
    let file = config_file()?;
    let _env = EnvGuard::new(vec![]);

    let config = EngineConfig::from_file(file.path().to_str().unwrap())?;
    assert_eq!(config.settings.fanout_timeout_ms, 1000);
    assert!(config.settings.refuse_table_scan);
    Ok(())
}
