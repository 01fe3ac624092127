//! # Error Contexts
//!
//! Structured metadata attached to errors so callers can tell which group,
//! node, shard value or column a failure belongs to.

use serde::{Deserialize, Serialize};

/// One failing group of a fan-out operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupFailure {
    pub group: String,
    pub node: String,
    pub message: String,
}

impl GroupFailure {
    pub fn new(group: impl Into<String>, node: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            node: node.into(),
            message: message.into(),
        }
    }
}

/// Structured context for errors.
///
/// Each variant provides the fields relevant to that error type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ErrorContext {
    /// Driver failure on a single node
    Node { group: String, node: String },

    /// Fan-out failure, one entry per failing group
    FanOut {
        operation: String,
        failures: Vec<GroupFailure>,
        /// Rows affected on the groups that succeeded (writes only)
        #[serde(skip_serializing_if = "Option::is_none")]
        affected_rows: Option<u64>,
    },

    /// Routing failure
    Routing { shard_value: i64, total_groups: u64 },

    /// Mapping failure on a column
    Column { table: String, column: String },

    /// Configuration failure
    Config {
        file_path: Option<String>,
        field: Option<String>,
    },

    /// Generic key-value context for extensibility
    Generic {
        #[serde(flatten)]
        data: std::collections::HashMap<String, serde_json::Value>,
    },
}
