use super::field::{ConversionError, ConversionResult, Encoding, FieldValue};
use crate::value::Value;
use shardline_error::{ErrorCode, ErrorContext, Result, ShardlineError};
use std::collections::HashMap;
use std::fmt;

type Reader<E> = Box<dyn Fn(&E) -> ConversionResult<Value> + Send + Sync>;
type Writer<E> = Box<dyn Fn(&mut E, Value) -> ConversionResult<()> + Send + Sync>;

/// A record type mapped to a table.
///
/// ```ignore
/// impl Entity for Order {
///     fn describe(d: EntityDescriptor<Self>) -> EntityDescriptor<Self> {
///         d.table("orders")
///             .column("id,pk,auto", |o| &o.id, |o| &mut o.id)
///             .column("customer_id,shard", |o| &o.customer_id, |o| &mut o.customer_id)
///             .extends(|o| &o.audit, |o| &mut o.audit)
///     }
/// }
/// ```
pub trait Entity: Default + Send + Sync + 'static {
    fn describe(descriptor: EntityDescriptor<Self>) -> EntityDescriptor<Self>;
}

/// Entities that compute their own shard value.
pub trait SelfSharded {
    fn shard_value(&self) -> i64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl Access {
    pub fn readable(&self) -> bool {
        matches!(self, Access::ReadOnly | Access::ReadWrite)
    }

    pub fn writable(&self) -> bool {
        matches!(self, Access::WriteOnly | Access::ReadWrite)
    }
}

/// Where a column lives: directly on the entity, or inside an embedded
/// struct named by `parent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    pub parent: Option<String>,
    pub local: String,
}

pub struct ColumnMetadata<E> {
    pub name: String,
    pub path: FieldPath,
    pub access: Access,
    pub nullable: bool,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub shard_key: bool,
    pub encoding: Encoding,
    reader: Reader<E>,
    writer: Writer<E>,
}

impl<E> ColumnMetadata<E> {
    /// Map key: the lowercase column name.
    pub fn key(&self) -> String {
        self.name.to_lowercase()
    }

    pub fn read(&self, entity: &E) -> ConversionResult<Value> {
        (self.reader)(entity)
    }

    pub fn write(&self, entity: &mut E, value: Value) -> ConversionResult<()> {
        (self.writer)(entity, value)
    }
}

impl<E> fmt::Debug for ColumnMetadata<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnMetadata")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("access", &self.access)
            .field("nullable", &self.nullable)
            .field("primary_key", &self.primary_key)
            .field("auto_increment", &self.auto_increment)
            .field("shard_key", &self.shard_key)
            .field("encoding", &self.encoding)
            .finish()
    }
}

/// Parsed `name,flag,...` tag.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ColumnTag {
    name: String,
    access: Access,
    nullable: bool,
    primary_key: bool,
    auto_increment: bool,
    shard_key: bool,
}

impl ColumnTag {
    /// `Ok(None)` for the ignore tag `-`.
    fn parse(tag: &str) -> std::result::Result<Option<Self>, String> {
        let tag = tag.trim();
        if tag == "-" {
            return Ok(None);
        }
        let mut parts = tag.split(',').map(str::trim);
        let name = parts.next().unwrap_or_default();
        if name.is_empty() {
            return Err(format!("column tag '{}' has no name", tag));
        }
        let mut parsed = ColumnTag {
            name: name.to_string(),
            access: Access::ReadWrite,
            nullable: true,
            primary_key: false,
            auto_increment: false,
            shard_key: false,
        };
        for flag in parts {
            match flag {
                "pk" => parsed.primary_key = true,
                "auto" => parsed.auto_increment = true,
                "ro" => parsed.access = Access::ReadOnly,
                "wo" => parsed.access = Access::WriteOnly,
                "rw" => parsed.access = Access::ReadWrite,
                "shard" => parsed.shard_key = true,
                "notnull" => parsed.nullable = false,
                "" => {}
                other => return Err(format!("unknown flag '{}' on column '{}'", other, name)),
            }
        }
        Ok(Some(parsed))
    }
}

/// Builder an [`Entity`] fills in once; the registry turns it into a
/// [`TableMetadata`].
pub struct EntityDescriptor<E> {
    table: Option<String>,
    columns: Vec<ColumnMetadata<E>>,
    shard_fn: Option<fn(&E) -> i64>,
    problems: Vec<String>,
}

impl<E> Default for EntityDescriptor<E> {
    fn default() -> Self {
        Self {
            table: None,
            columns: Vec::new(),
            shard_fn: None,
            problems: Vec::new(),
        }
    }
}

impl<E: 'static> EntityDescriptor<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the table name (defaults to the type's name).
    pub fn table(mut self, name: &str) -> Self {
        self.table = Some(name.to_string());
        self
    }

    /// Map a field. The tag `-` skips it.
    pub fn column<T: FieldValue>(
        mut self,
        tag: &str,
        get: fn(&E) -> &T,
        get_mut: fn(&mut E) -> &mut T,
    ) -> Self {
        let tag = match ColumnTag::parse(tag) {
            Ok(Some(tag)) => tag,
            Ok(None) => return self,
            Err(problem) => {
                self.problems.push(problem);
                return self;
            }
        };

        let nullable = tag.nullable;
        let reader: Reader<E> = Box::new(move |entity: &E| get(entity).to_value());
        let writer: Writer<E> = Box::new(move |entity: &mut E, value: Value| {
            if value.is_null() {
                if !nullable && T::ENCODING == Encoding::Plain {
                    return Err(ConversionError::NullViolation);
                }
                if let Some(zero) = T::null() {
                    *get_mut(entity) = zero;
                }
                return Ok(());
            }
            *get_mut(entity) = T::from_value(value)?;
            Ok(())
        });

        self.columns.push(ColumnMetadata {
            path: FieldPath {
                parent: None,
                local: tag.name.clone(),
            },
            name: tag.name,
            access: tag.access,
            nullable,
            primary_key: tag.primary_key,
            auto_increment: tag.auto_increment,
            shard_key: tag.shard_key,
            encoding: T::ENCODING,
            reader,
            writer,
        });
        self
    }

    /// Flatten the columns of an embedded entity into this one.
    pub fn extends<C: Entity>(mut self, get: fn(&E) -> &C, get_mut: fn(&mut E) -> &mut C) -> Self {
        let child = C::describe(EntityDescriptor::new());
        let parent = short_type_name::<C>().to_string();
        self.problems.extend(child.problems);

        for column in child.columns {
            let ColumnMetadata {
                name,
                path,
                access,
                nullable,
                primary_key,
                auto_increment,
                shard_key,
                encoding,
                reader,
                writer,
            } = column;
            let parent_path = match path.parent {
                Some(inner) => format!("{}.{}", parent, inner),
                None => parent.clone(),
            };
            self.columns.push(ColumnMetadata {
                name,
                path: FieldPath {
                    parent: Some(parent_path),
                    local: path.local,
                },
                access,
                nullable,
                primary_key,
                auto_increment,
                shard_key,
                encoding,
                reader: Box::new(move |entity: &E| reader(get(entity))),
                writer: Box::new(move |entity: &mut E, value: Value| writer(get_mut(entity), value)),
            });
        }
        self
    }
}

impl<E: SelfSharded + 'static> EntityDescriptor<E> {
    /// Route by [`SelfSharded::shard_value`] instead of a shard column.
    pub fn self_sharded(mut self) -> Self {
        self.shard_fn = Some(<E as SelfSharded>::shard_value);
        self
    }
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Immutable table mapping of one entity type.
pub struct TableMetadata<E> {
    name: String,
    columns: Vec<ColumnMetadata<E>>,
    index: HashMap<String, usize>,
    primary_key: Option<usize>,
    shard_column: Option<usize>,
    shard_fn: Option<fn(&E) -> i64>,
}

impl<E: Entity> TableMetadata<E> {
    pub fn build() -> Result<Self> {
        Self::from_descriptor(E::describe(EntityDescriptor::new()))
    }
}

impl<E: 'static> TableMetadata<E> {
    pub fn from_descriptor(descriptor: EntityDescriptor<E>) -> Result<Self> {
        let EntityDescriptor {
            table,
            columns: declared,
            shard_fn,
            mut problems,
        } = descriptor;
        let name = table.unwrap_or_else(|| short_type_name::<E>().to_string());

        let mut columns = Vec::with_capacity(declared.len());
        let mut index = HashMap::with_capacity(declared.len());
        for column in declared {
            let key = column.key();
            if index.contains_key(&key) {
                tracing::debug!(table = %name, column = %column.name, "Duplicate column ignored");
                continue;
            }
            index.insert(key, columns.len());
            columns.push(column);
        }

        let keys: Vec<usize> = positions(&columns, |c| c.primary_key);
        let shards: Vec<usize> = positions(&columns, |c| c.shard_key);
        let autos: Vec<usize> = positions(&columns, |c| c.auto_increment);
        if keys.len() > 1 {
            problems.push(format!("{} columns are tagged 'pk'", keys.len()));
        }
        if shards.len() > 1 {
            problems.push(format!("{} columns are tagged 'shard'", shards.len()));
        }
        if autos.len() > 1 {
            problems.push(format!("{} columns are tagged 'auto'", autos.len()));
        }

        if !problems.is_empty() {
            return Err(ShardlineError::new(
                ErrorCode::InvalidDescriptor,
                format!("Invalid descriptor for table '{}': {}", name, problems.join("; ")),
            )
            .with_hint("Check the column tags in the entity's describe()"));
        }

        Ok(Self {
            name,
            columns,
            index,
            primary_key: keys.first().copied(),
            shard_column: shards.first().copied(),
            shard_fn,
        })
    }
}

fn positions<E>(columns: &[ColumnMetadata<E>], pred: impl Fn(&ColumnMetadata<E>) -> bool) -> Vec<usize> {
    columns
        .iter()
        .enumerate()
        .filter(|(_, c)| pred(c))
        .map(|(i, _)| i)
        .collect()
}

impl<E> TableMetadata<E> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Columns in declaration order.
    pub fn columns(&self) -> &[ColumnMetadata<E>] {
        &self.columns
    }

    /// Case-insensitive lookup.
    pub fn column(&self, name: &str) -> Option<&ColumnMetadata<E>> {
        self.index
            .get(&name.trim().to_lowercase())
            .map(|&i| &self.columns[i])
    }

    pub fn primary_key(&self) -> Option<&ColumnMetadata<E>> {
        self.primary_key.map(|i| &self.columns[i])
    }

    pub fn auto_column(&self) -> Option<&ColumnMetadata<E>> {
        self.columns.iter().find(|c| c.auto_increment)
    }

    pub fn shard_column(&self) -> Option<&ColumnMetadata<E>> {
        self.shard_column.map(|i| &self.columns[i])
    }

    pub fn is_self_sharded(&self) -> bool {
        self.shard_fn.is_some()
    }

    /// Self-reported value first, then the shard column when it holds an
    /// integer.
    pub fn shard_value(&self, entity: &E) -> Option<i64> {
        if let Some(f) = self.shard_fn {
            return Some(f(entity));
        }
        let column = self.shard_column()?;
        column.read(entity).ok().and_then(|v| v.as_i64())
    }

    pub fn primary_key_value(&self, entity: &E) -> Result<Value> {
        let pk = self.primary_key().ok_or_else(|| self.missing_primary_key())?;
        self.read(pk, entity)
    }

    pub fn missing_primary_key(&self) -> ShardlineError {
        ShardlineError::new(
            ErrorCode::MissingPrimaryKey,
            format!("Table '{}' has no primary key column", self.name),
        )
        .with_hint("Tag one column with 'pk'")
    }

    pub fn read(&self, column: &ColumnMetadata<E>, entity: &E) -> Result<Value> {
        column
            .read(entity)
            .map_err(|e| self.column_error(column, e))
    }

    pub fn write(&self, column: &ColumnMetadata<E>, entity: &mut E, value: Value) -> Result<()> {
        column
            .write(entity, value)
            .map_err(|e| self.column_error(column, e))
    }

    fn column_error(&self, column: &ColumnMetadata<E>, err: ConversionError) -> ShardlineError {
        let base: ShardlineError = err.into();
        ShardlineError::new(
            base.code,
            format!("{}.{}: {}", self.name, column.name, base.message),
        )
        .with_context(ErrorContext::Column {
            table: self.name.clone(),
            column: column.name.clone(),
        })
    }
}

impl<E> fmt::Debug for TableMetadata<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableMetadata")
            .field("name", &self.name)
            .field("columns", &self.columns)
            .field("primary_key", &self.primary_key().map(|c| &c.name))
            .field("shard_column", &self.shard_column().map(|c| &c.name))
            .field("self_sharded", &self.shard_fn.is_some())
            .finish()
    }
}
