//! SQL layer for shardline.
//!
//! This crate turns typed entities and accumulated clause tokens into SQL:
//! - **Values** (`value`): driver-independent scalar representation and the `args!` macro.
//! - **Clauses** (`clause`): ordered clause tokens and the fluent `ClauseBuilder` trait.
//! - **Metadata** (`metadata`): explicit entity descriptors and the process-wide registry.
//! - **Row mapping** (`mapper`): buffered result sets into entity instances.
//! - **Generators** (`sql_generator`, `dialect_router`): generic and MSSQL statement rendering.
pub mod clause;
pub mod dialect_router;
pub mod mapper;
pub mod metadata;
pub mod sql_generator;
pub mod value;

pub use clause::{Clause, ClauseBuilder, ClauseKind, ClauseList};
pub use dialect_router::route_dialect;
pub use mapper::{ResultSet, RowMapper};
pub use metadata::{
    global_registry, metadata_of, Access, Codec, ColumnMetadata, Encoding, Entity,
    EntityDescriptor, FieldValue, Json, MetadataRegistry, SelfSharded, StorageCodec,
    TableMetadata,
};
pub use sql_generator::{Dialect, Statement};
pub use value::Value;
