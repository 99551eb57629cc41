//! Static entity descriptors.
//!
//! Every mapped record type exposes one [`EntityDescriptor`]: its type name,
//! an optional explicit table name, a constructor, and one
//! [`FieldDescriptor`] per persisted field carrying a getter and setter that
//! convert through [`Value`]. The descriptor is plain data built once, so
//! metadata derivation never needs runtime introspection.
//!
//! `#[derive(Entity)]` generates descriptors; they can also be written by
//! hand:
//!
//! ```
//! use rowmap_core::{Entity, EntityDescriptor, FieldDescriptor, FromValue, Value};
//!
//! #[derive(Default)]
//! struct Tag {
//!     id: i64,
//!     label: String,
//! }
//!
//! impl Entity for Tag {
//!     fn descriptor() -> &'static EntityDescriptor<Self> {
//!         static DESCRIPTOR: EntityDescriptor<Tag> = EntityDescriptor {
//!             type_name: "Tag",
//!             table: Some("tags"),
//!             new: Tag::default,
//!             fields: &[
//!                 FieldDescriptor {
//!                     name: "id",
//!                     column: None,
//!                     identity: true,
//!                     get: |t| Value::from(t.id),
//!                     set: |t, v| {
//!                         t.id = i64::from_value(v)?;
//!                         Ok(())
//!                     },
//!                 },
//!                 FieldDescriptor {
//!                     name: "label",
//!                     column: None,
//!                     identity: false,
//!                     get: |t| Value::from(&t.label),
//!                     set: |t, v| {
//!                         t.label = String::from_value(v)?;
//!                         Ok(())
//!                     },
//!                 },
//!             ],
//!         };
//!         &DESCRIPTOR
//!     }
//! }
//!
//! assert_eq!(Tag::descriptor().fields.len(), 2);
//! ```

use crate::error::Result;
use crate::value::Value;

/// Accessor pair and mapping for one persisted field.
pub struct FieldDescriptor<E> {
    /// Rust field name
    pub name: &'static str,
    /// Explicit column name; the field name is used when absent
    pub column: Option<&'static str>,
    /// Whether this field is the identity (primary key)
    pub identity: bool,
    /// Read the field as a `Value`
    pub get: fn(&E) -> Value,
    /// Assign the field from a `Value`
    pub set: fn(&mut E, &Value) -> Result<()>,
}

impl<E> FieldDescriptor<E> {
    /// The SQL column this field maps to.
    pub fn column_name(&self) -> &'static str {
        self.column.unwrap_or(self.name)
    }
}

impl<E> std::fmt::Debug for FieldDescriptor<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("column", &self.column)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

/// Static mapping description for an entity type.
pub struct EntityDescriptor<E: 'static> {
    /// Rust type name, used as the table name when `table` is absent
    pub type_name: &'static str,
    /// Explicit table name
    pub table: Option<&'static str>,
    /// Construct an empty instance for row parsing
    pub new: fn() -> E,
    /// Persisted fields in declaration order
    pub fields: &'static [FieldDescriptor<E>],
}

impl<E> EntityDescriptor<E> {
    /// The SQL table this entity maps to.
    pub fn table_name(&self) -> &'static str {
        self.table.unwrap_or(self.type_name)
    }
}

impl<E> std::fmt::Debug for EntityDescriptor<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityDescriptor")
            .field("type_name", &self.type_name)
            .field("table", &self.table)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

/// A record type that can be mapped to a table row.
pub trait Entity: Sized + Send + Sync + 'static {
    /// The static descriptor for this type.
    fn descriptor() -> &'static EntityDescriptor<Self>;
}
