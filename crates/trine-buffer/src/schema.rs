//! Declarative buffer layouts compiled once into byte offsets.
//!
//! A [`Schema`] is an ordered map of field name to element type and count.
//! Offsets are assigned in declaration order, each field starting at the
//! previous field's end rounded up to its element alignment. The same
//! compiled schema is shared (`Arc<Schema>`) by every thread that builds a
//! view, so layouts agree by construction rather than by replaying
//! allocation calls.

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use trine_core::{Element, ElementType};

use crate::cursor::place;
use crate::error::{SchemaError, ViewError};

/// Counter for unique [`SchemaId`] allocation.
static SCHEMA_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier of one compiled schema instance.
///
/// Two schemas with identical fields still get different ids; keys and
/// views are only interchangeable within one compiled instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemaId(u64);

impl SchemaId {
    fn next() -> Self {
        Self(SCHEMA_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Compiled placement of one field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldLayout {
    /// Byte offset of the first element.
    pub offset: usize,
    /// Element type.
    pub ty: ElementType,
    /// Number of elements.
    pub count: usize,
}

impl FieldLayout {
    /// Byte length of the field.
    pub fn byte_len(&self) -> usize {
        self.count * self.ty.size()
    }

    /// One past the last byte of the field.
    pub fn end(&self) -> usize {
        self.offset + self.byte_len()
    }
}

/// A compiled, immutable buffer layout.
#[derive(Debug)]
pub struct Schema {
    id: SchemaId,
    name: String,
    fields: IndexMap<String, FieldLayout>,
    size: usize,
}

/// Builder returned by [`Schema::builder`].
#[derive(Debug)]
pub struct SchemaBuilder {
    name: String,
    fields: Vec<(String, ElementType, usize)>,
}

impl SchemaBuilder {
    /// Declare the next field.
    pub fn field(mut self, name: impl Into<String>, ty: ElementType, count: usize) -> Self {
        self.fields.push((name.into(), ty, count));
        self
    }

    /// Validate and compile the layout.
    pub fn build(self) -> Result<Arc<Schema>, SchemaError> {
        if self.fields.is_empty() {
            return Err(SchemaError::NoFields { schema: self.name });
        }
        let mut fields = IndexMap::with_capacity(self.fields.len());
        let mut cursor = 0usize;
        for (field, ty, count) in self.fields {
            if count == 0 {
                return Err(SchemaError::ZeroCount {
                    schema: self.name,
                    field,
                });
            }
            if fields.contains_key(&field) {
                return Err(SchemaError::DuplicateField {
                    schema: self.name,
                    field,
                });
            }
            let Some((offset, end)) = place(cursor, ty, count) else {
                return Err(SchemaError::SizeOverflow {
                    schema: self.name,
                    field,
                });
            };
            fields.insert(field, FieldLayout { offset, ty, count });
            cursor = end;
        }
        Ok(Arc::new(Schema {
            id: SchemaId::next(),
            name: self.name,
            fields,
            size: cursor,
        }))
    }
}

impl Schema {
    /// Start declaring a schema called `name`.
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Unique id of this compiled instance.
    pub fn id(&self) -> SchemaId {
        self.id
    }

    /// Name given at declaration.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total bytes a region must hold to back this schema.
    pub fn size_of(&self) -> usize {
        self.size
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Always `false`: empty schemas are rejected at build time.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Layout of `name`, if declared.
    pub fn field(&self, name: &str) -> Option<&FieldLayout> {
        self.fields.get(name)
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldLayout)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns `true` if both schemas compile to the same byte layout.
    pub fn layout_eq(&self, other: &Schema) -> bool {
        self.size == other.size
            && self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(other.fields.iter())
                .all(|(a, b)| a == b)
    }

    /// Resolve `name` once into a typed key for hot loops.
    pub fn key<T: Element>(&self, name: &str) -> Result<FieldKey<T>, ViewError> {
        let layout = self.resolve::<T>(name)?;
        Ok(FieldKey {
            schema: self.id,
            offset: layout.offset,
            count: layout.count,
            _marker: PhantomData,
        })
    }

    pub(crate) fn resolve<T: Element>(&self, name: &str) -> Result<FieldLayout, ViewError> {
        let layout = self.fields.get(name).ok_or_else(|| ViewError::UnknownField {
            schema: self.name.clone(),
            field: name.to_string(),
        })?;
        if layout.ty != T::TYPE {
            return Err(ViewError::TypeMismatch {
                field: name.to_string(),
                declared: layout.ty,
                requested: T::TYPE,
            });
        }
        Ok(*layout)
    }

    pub(crate) fn check_key<T: Element>(&self, key: &FieldKey<T>) -> Result<(), ViewError> {
        if key.schema == self.id {
            Ok(())
        } else {
            Err(ViewError::SchemaMismatch {
                expected: self.name.clone(),
                actual: format!("schema {}", key.schema),
            })
        }
    }
}

/// A field resolved against one compiled schema.
///
/// Carries the offset, count and element type so span lookups skip the
/// name map. Using a key with a view of a different schema fails with
/// [`ViewError::SchemaMismatch`].
pub struct FieldKey<T: Element> {
    schema: SchemaId,
    pub(crate) offset: usize,
    pub(crate) count: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Element> Clone for FieldKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Element> Copy for FieldKey<T> {}

impl<T: Element> fmt::Debug for FieldKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldKey")
            .field("schema", &self.schema)
            .field("offset", &self.offset)
            .field("count", &self.count)
            .field("ty", &T::TYPE)
            .finish()
    }
}

impl<T: Element> FieldKey<T> {
    /// Schema this key was resolved against.
    pub fn schema(&self) -> SchemaId {
        self.schema
    }

    /// Number of elements in the field.
    pub fn count(&self) -> usize {
        self.count
    }
}
