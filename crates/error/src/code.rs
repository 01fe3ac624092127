use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric error codes following SHARD-XXXX format.
///
/// ## Code Ranges
/// - **1000-1999**: Execution / connection errors
/// - **2000-2999**: Mapping errors
/// - **3000-3999**: Configuration errors
/// - **4000-4999**: Routing errors
/// - **5000-5999**: Timeout and internal errors
///
/// A read that matches no row is not an error: `get` returns `Ok(false)`.
///
/// Codes are stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
#[non_exhaustive]
pub enum ErrorCode {
    // === Execution Errors (1000-1999) ===
    /// SHARD-1001: Opening a node connection failed
    ConnectionFailed = 1001,
    /// SHARD-1002: Closing one or more node connections failed
    CloseFailed = 1002,
    /// SHARD-1003: The driver rejected or failed a statement
    ExecutionFailed = 1003,
    /// SHARD-1004: One or more groups failed during a fan-out operation
    FanOutFailed = 1004,
    /// SHARD-1005: Node used before its connection was opened
    NotConnected = 1005,
    /// SHARD-1006: Beginning, committing or rolling back a transaction failed
    TransactionFailed = 1006,
    /// SHARD-1007: Select without filter or paging refused
    UnboundedScan = 1007,

    // === Mapping Errors (2000-2999) ===
    /// SHARD-2001: Operation needs a primary key the entity does not declare
    MissingPrimaryKey = 2001,
    /// SHARD-2002: Column value could not be converted into the field type
    TypeMismatch = 2002,
    /// SHARD-2003: Database NULL read into a not-null column
    NullViolation = 2003,
    /// SHARD-2004: Opaque column encode/decode failed
    SerializationFailed = 2004,
    /// SHARD-2005: Entity descriptor is malformed
    InvalidDescriptor = 2005,

    // === Configuration Errors (3000-3999) ===
    /// SHARD-3001: Configuration could not be read or parsed
    InvalidConfig = 3001,
    /// SHARD-3002: Configuration failed validation
    ConfigValidation = 3002,
    /// SHARD-3003: No SQL generator or connector for the driver name
    UnsupportedDriver = 3003,

    // === Routing Errors (4000-4999) ===
    /// SHARD-4001: No group covers the shard value
    NoGroupForShard = 4001,
    /// SHARD-4002: Several groups and none flagged default
    NoDefaultGroup = 4002,
    /// SHARD-4003: Group has no master node
    NoMasterNode = 4003,
    /// SHARD-4004: Cluster has no groups
    EmptyCluster = 4004,

    // === Terminal Errors (5000-5999) ===
    /// SHARD-5002: Fan-out read exceeded its deadline
    QueryTimeout = 5002,
    /// SHARD-5003: Unexpected internal state
    Internal = 5003,

    /// SHARD-9999: Unknown/unclassified error
    Unknown = 9999,
}

/// Error class of the taxonomy; derived from the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Execution,
    Mapping,
    Config,
    Routing,
    Timeout,
    Internal,
}

impl ErrorCode {
    /// Get the numeric code value
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    /// Get the formatted code string (e.g., "SHARD-4001")
    pub fn as_str(&self) -> String {
        format!("SHARD-{:04}", self.as_u16())
    }

    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorCode::QueryTimeout => ErrorCategory::Timeout,
            _ => match self.as_u16() {
                1000..=1999 => ErrorCategory::Execution,
                2000..=2999 => ErrorCategory::Mapping,
                3000..=3999 => ErrorCategory::Config,
                4000..=4999 => ErrorCategory::Routing,
                _ => ErrorCategory::Internal,
            },
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> String {
        code.as_str()
    }
}

impl TryFrom<String> for ErrorCode {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        let num: u16 = s
            .strip_prefix("SHARD-")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| "Invalid format".to_string())?;
        Self::try_from(num).map_err(|_| "Unknown code".to_string())
    }
}

impl TryFrom<u16> for ErrorCode {
    type Error = String;

    fn try_from(n: u16) -> std::result::Result<Self, Self::Error> {
        match n {
            1001 => Ok(Self::ConnectionFailed),
            1002 => Ok(Self::CloseFailed),
            1003 => Ok(Self::ExecutionFailed),
            1004 => Ok(Self::FanOutFailed),
            1005 => Ok(Self::NotConnected),
            1006 => Ok(Self::TransactionFailed),
            1007 => Ok(Self::UnboundedScan),
            2001 => Ok(Self::MissingPrimaryKey),
            2002 => Ok(Self::TypeMismatch),
            2003 => Ok(Self::NullViolation),
            2004 => Ok(Self::SerializationFailed),
            2005 => Ok(Self::InvalidDescriptor),
            3001 => Ok(Self::InvalidConfig),
            3002 => Ok(Self::ConfigValidation),
            3003 => Ok(Self::UnsupportedDriver),
            4001 => Ok(Self::NoGroupForShard),
            4002 => Ok(Self::NoDefaultGroup),
            4003 => Ok(Self::NoMasterNode),
            4004 => Ok(Self::EmptyCluster),
            5002 => Ok(Self::QueryTimeout),
            5003 => Ok(Self::Internal),
            9999 => Ok(Self::Unknown),
            _ => Err(format!("Unknown error code: {}", n)),
        }
    }
}
