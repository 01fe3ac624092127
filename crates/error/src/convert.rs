use crate::{ErrorCode, ShardlineError};

impl From<std::io::Error> for ShardlineError {
    fn from(err: std::io::Error) -> Self {
        ShardlineError::new(ErrorCode::InvalidConfig, err.to_string())
    }
}

impl From<serde_json::Error> for ShardlineError {
    fn from(err: serde_json::Error) -> Self {
        ShardlineError::new(ErrorCode::SerializationFailed, err.to_string())
    }
}

/// Driver-independent failures raised while talking to a node.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("connection to '{node}' is not open")]
    NotConnected { node: String },

    #[error("background task failed: {0}")]
    Join(String),

    #[error("{0}")]
    Driver(String),
}

impl From<DriverError> for ShardlineError {
    fn from(err: DriverError) -> Self {
        match &err {
            DriverError::NotConnected { .. } => {
                ShardlineError::new(ErrorCode::NotConnected, err.to_string())
                    .with_hint("Call Engine::open before running statements")
            }
            DriverError::Join(_) => ShardlineError::new(ErrorCode::Internal, err.to_string()),
            DriverError::Driver(_) => ShardlineError::new(ErrorCode::ExecutionFailed, err.to_string()),
        }
    }
}
