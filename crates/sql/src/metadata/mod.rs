//! Entity metadata.
//!
//! Entities describe themselves once through an [`EntityDescriptor`]; the
//! process-wide [`MetadataRegistry`] builds the immutable [`TableMetadata`]
//! on first use and hands out shared references afterwards.
pub mod descriptor;
pub mod field;
pub mod registry;

pub use descriptor::{
    Access, ColumnMetadata, Entity, EntityDescriptor, FieldPath, SelfSharded, TableMetadata,
};
pub use field::{Codec, ConversionError, Encoding, FieldValue, Json, StorageCodec};
pub use registry::{global_registry, metadata_of, MetadataRegistry};
