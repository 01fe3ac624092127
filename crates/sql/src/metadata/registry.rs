use super::descriptor::{Entity, TableMetadata};
use dashmap::DashMap;
use shardline_error::{ErrorCode, Result, ShardlineError};
use std::any::{Any, TypeId};
use std::sync::{Arc, OnceLock};

type Built<E> = Result<Arc<TableMetadata<E>>>;
type Slot = Arc<OnceLock<Arc<dyn Any + Send + Sync>>>;

/// Cache of built table mappings keyed by entity type. Entries are never
/// evicted.
#[derive(Default)]
pub struct MetadataRegistry {
    tables: DashMap<TypeId, Slot>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mapping for `E`, built on first access. Concurrent first callers
    /// share one build; built entries are read without blocking.
    pub fn get<E: Entity>(&self) -> Result<Arc<TableMetadata<E>>> {
        let slot = self.slot(TypeId::of::<E>());
        let built = slot.get_or_init(|| {
            let table = TableMetadata::<E>::build().map(Arc::new);
            match &table {
                Ok(t) => tracing::debug!(
                    table = %t.name(),
                    columns = t.columns().len(),
                    "Built entity metadata"
                ),
                Err(e) => tracing::error!(entity = std::any::type_name::<E>(), "{}", e),
            }
            Arc::new(table) as Arc<dyn Any + Send + Sync>
        });

        match built.downcast_ref::<Built<E>>() {
            Some(result) => result.clone(),
            None => Err(ShardlineError::new(
                ErrorCode::Internal,
                format!(
                    "Metadata slot for {} holds another type",
                    std::any::type_name::<E>()
                ),
            )),
        }
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    fn slot(&self, id: TypeId) -> Slot {
        if let Some(slot) = self.tables.get(&id) {
            return slot.clone();
        }
        self.tables.entry(id).or_default().clone()
    }
}

static REGISTRY: OnceLock<MetadataRegistry> = OnceLock::new();

pub fn global_registry() -> &'static MetadataRegistry {
    REGISTRY.get_or_init(MetadataRegistry::new)
}

/// Shorthand for `global_registry().get::<E>()`.
pub fn metadata_of<E: Entity>() -> Result<Arc<TableMetadata<E>>> {
    global_registry().get::<E>()
}
