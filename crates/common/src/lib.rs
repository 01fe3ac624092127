//! Common utilities, types, and configurations shared across shardline crates.
//!
//! This crate contains:
//! - **Configuration**: Strongly typed cluster and engine configuration (`config`).
//! - **Resilience**: Exponential backoff for node connection attempts (`retry`).
//! - **Telemetry**: `tracing` subscriber setup (`telemetry`).
pub mod config;
pub mod retry;
pub mod telemetry;

pub use crate::config::{
    ClusterConfig, EngineConfig, EngineSettings, GroupConfig, NodeConfig, NodeRole, RetrySettings,
};
