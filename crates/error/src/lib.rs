//! # shardline-error
//!
//! Unified error types for the shardline sharded database access layer.
//!
//! Every failure carries:
//! - A numeric error code (SHARD-XXXX) whose range identifies its class
//! - Optional structured JSON context (failing group/node, shard value, column)
//! - An optional hint for the caller

mod code;
mod context;
mod convert;

pub use code::{ErrorCategory, ErrorCode};
pub use context::{ErrorContext, GroupFailure};
pub use convert::DriverError;

use serde::{Deserialize, Serialize};
use std::fmt;

/// The unified error type for all shardline operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardlineError {
    /// Numeric error code (e.g., "SHARD-4001")
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Structured context for programmatic handling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ErrorContext>,

    /// Suggestion for the caller
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ShardlineError {
    /// Create a new error with code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: None,
            hint: None,
        }
    }

    /// Add structured context
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Add a hint
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Error class from the code range
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    pub fn is_mapping(&self) -> bool {
        self.category() == ErrorCategory::Mapping
    }

    pub fn is_routing(&self) -> bool {
        self.category() == ErrorCategory::Routing
    }

    pub fn is_execution(&self) -> bool {
        self.category() == ErrorCategory::Execution
    }

    pub fn is_timeout(&self) -> bool {
        self.category() == ErrorCategory::Timeout
    }

    /// Shorthand for a driver failure on a known node.
    pub fn execution(group: &str, node: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ExecutionFailed, message).with_context(ErrorContext::Node {
            group: group.to_string(),
            node: node.to_string(),
        })
    }

    /// Combine per-group failures of a fan-out operation into one error that
    /// names every failing group.
    pub fn fan_out(
        operation: &str,
        failures: Vec<GroupFailure>,
        affected_rows: Option<u64>,
    ) -> Self {
        let names = failures
            .iter()
            .map(|f| format!("{}/{}", f.group, f.node))
            .collect::<Vec<_>>()
            .join(", ");
        let details = failures
            .iter()
            .map(|f| format!("group {} node {}: {}", f.group, f.node, f.message))
            .collect::<Vec<_>>()
            .join("; ");
        Self::new(
            ErrorCode::FanOutFailed,
            format!(
                "{} failed on {} group(s) [{}]: {}",
                operation,
                failures.len(),
                names,
                details
            ),
        )
        .with_context(ErrorContext::FanOut {
            operation: operation.to_string(),
            failures,
            affected_rows,
        })
    }

    /// Serialize to JSON for API responses
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::warn!("Failed to serialize ShardlineError: {}", e);
            format!(
                r#"{{"code":"{}","message":"Serialization failed"}}"#,
                self.code
            )
        })
    }
}

impl fmt::Display for ShardlineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, " (Hint: {})", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for ShardlineError {}

/// Result type alias for shardline operations
pub type Result<T> = std::result::Result<T, ShardlineError>;
