//! Derived entity metadata and its per-factory cache.
//!
//! [`EntityMetadata`] is computed once from an [`EntityDescriptor`]: the
//! table name, the identity column, the ordered non-identity columns, and
//! the column-name ordering used for snapshots. [`MetadataRegistry`] memoizes
//! it per `TypeId`.

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use crate::entity::{Entity, EntityDescriptor, FieldDescriptor};
use crate::error::{ConfigErrorKind, Error, Result, RowParseError, RowParseErrorKind};
use crate::identifiers::validate_identifier;
use crate::row::Row;
use crate::value::Value;

/// How NULL field values are treated when building column lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NullPolicy {
    /// Leave NULL fields out of INSERT and UPDATE column lists.
    ///
    /// A field cannot be cleared to NULL through an UPDATE under this policy.
    #[default]
    Omit,
    /// Bind NULL fields like any other value.
    Bind,
}

/// Validated mapping for one entity type.
pub struct EntityMetadata<E: Entity> {
    descriptor: &'static EntityDescriptor<E>,
    table: &'static str,
    identity: usize,
    /// Non-identity field indices in declaration order
    columns: Vec<usize>,
    column_names: Vec<&'static str>,
    /// All field indices ordered by column name
    snapshot_order: Vec<usize>,
}

impl<E: Entity> EntityMetadata<E> {
    /// Derive metadata for `E` from its descriptor.
    ///
    /// Fails if there is not exactly one identity field, if two fields share
    /// a column, or if any name is not a plain SQL identifier.
    #[allow(clippy::result_large_err)]
    pub fn derive() -> Result<Self> {
        Self::from_descriptor(E::descriptor())
    }

    #[allow(clippy::result_large_err)]
    pub fn from_descriptor(descriptor: &'static EntityDescriptor<E>) -> Result<Self> {
        let entity = descriptor.type_name;
        let table = descriptor.table_name();
        validate_identifier(entity, "table", table)?;

        let mut identity = None;
        let mut columns = Vec::with_capacity(descriptor.fields.len());
        let mut seen = HashSet::with_capacity(descriptor.fields.len());

        for (index, field) in descriptor.fields.iter().enumerate() {
            let column = field.column_name();
            validate_identifier(entity, "column", column)?;
            if !seen.insert(column) {
                return Err(Error::config(
                    ConfigErrorKind::DuplicateColumn,
                    entity,
                    format!("column '{}' is mapped by more than one field", column),
                ));
            }
            if field.identity {
                if let Some(previous) = identity {
                    let previous: &FieldDescriptor<E> = &descriptor.fields[previous];
                    return Err(Error::config(
                        ConfigErrorKind::DuplicateIdentity,
                        entity,
                        format!(
                            "fields '{}' and '{}' are both marked as identity",
                            previous.name, field.name
                        ),
                    ));
                }
                identity = Some(index);
            } else {
                columns.push(index);
            }
        }

        let Some(identity) = identity else {
            return Err(Error::config(
                ConfigErrorKind::MissingIdentity,
                entity,
                "no field is marked as identity",
            ));
        };

        let column_names: Vec<_> = columns
            .iter()
            .map(|&i| descriptor.fields[i].column_name())
            .collect();

        let mut snapshot_order: Vec<usize> = (0..descriptor.fields.len()).collect();
        snapshot_order.sort_by_key(|&i| descriptor.fields[i].column_name());

        tracing::debug!(
            entity,
            table,
            identity = descriptor.fields[identity].column_name(),
            columns = ?column_names,
            "Derived entity metadata"
        );

        Ok(Self {
            descriptor,
            table,
            identity,
            columns,
            column_names,
            snapshot_order,
        })
    }

    pub fn type_name(&self) -> &'static str {
        self.descriptor.type_name
    }

    pub fn table_name(&self) -> &'static str {
        self.table
    }

    pub fn identity_column(&self) -> &'static str {
        self.descriptor.fields[self.identity].column_name()
    }

    /// Non-identity column names in declaration order.
    pub fn column_names(&self) -> &[&'static str] {
        &self.column_names
    }

    /// Non-null, non-identity columns of `entity` in declaration order.
    pub fn columns_of(&self, entity: &E) -> Vec<(&'static str, Value)> {
        self.columns_with_policy(entity, NullPolicy::Omit)
    }

    /// Non-identity columns of `entity` in declaration order under `policy`.
    pub fn columns_with_policy(&self, entity: &E, policy: NullPolicy) -> Vec<(&'static str, Value)> {
        self.columns
            .iter()
            .map(|&i| {
                let field = &self.descriptor.fields[i];
                (field.column_name(), (field.get)(entity))
            })
            .filter(|(_, value)| policy == NullPolicy::Bind || !value.is_null())
            .collect()
    }

    pub fn identity_value_of(&self, entity: &E) -> Value {
        (self.descriptor.fields[self.identity].get)(entity)
    }

    /// Every mapped value of `entity`, identity and NULLs included, ordered
    /// by column name.
    pub fn snapshot_values(&self, entity: &E) -> Vec<Value> {
        self.snapshot_order
            .iter()
            .map(|&i| (self.descriptor.fields[i].get)(entity))
            .collect()
    }

    /// Build a fresh instance from a result row, assigning every mapped
    /// field by column name.
    #[allow(clippy::result_large_err)]
    pub fn parse(&self, row: &Row) -> Result<E> {
        let mut entity = (self.descriptor.new)();
        for field in self.descriptor.fields {
            let column = field.column_name();
            let value = row.get_by_name(column).ok_or_else(|| {
                Error::RowParse(RowParseError {
                    kind: RowParseErrorKind::MissingColumn,
                    entity: self.descriptor.type_name,
                    column: Some(column.to_string()),
                    message: format!("column '{}' not present in row", column),
                })
            })?;
            (field.set)(&mut entity, value).map_err(|e| match e {
                Error::Type(mut te) => {
                    te.column = Some(column.to_string());
                    Error::Type(te)
                }
                e => e,
            })?;
        }
        Ok(entity)
    }
}

impl<E: Entity> std::fmt::Debug for EntityMetadata<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityMetadata")
            .field("type_name", &self.type_name())
            .field("table", &self.table)
            .field("identity", &self.identity_column())
            .field("columns", &self.column_names)
            .finish()
    }
}

/// Cache of derived metadata keyed by entity type.
///
/// Entries are computed on first request and immutable afterwards. Failed
/// derivations are not cached.
#[derive(Default)]
pub struct MetadataRegistry {
    entries: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the metadata for `E`, deriving and caching it on first use.
    #[allow(clippy::result_large_err)]
    pub fn get<E: Entity>(&self) -> Result<Arc<EntityMetadata<E>>> {
        let type_id = TypeId::of::<E>();
        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            if let Some(entry) = entries.get(&type_id) {
                return downcast::<E>(Arc::clone(entry));
            }
        }

        let derived: Arc<dyn Any + Send + Sync> = Arc::new(EntityMetadata::<E>::derive()?);
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        // A concurrent caller may have won the race; keep the first entry.
        let entry = entries.entry(type_id).or_insert(derived);
        downcast::<E>(Arc::clone(entry))
    }

    pub fn contains<E: Entity>(&self) -> bool {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&TypeId::of::<E>())
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for MetadataRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataRegistry")
            .field("entries", &self.len())
            .finish()
    }
}

#[allow(clippy::result_large_err)]
fn downcast<E: Entity>(entry: Arc<dyn Any + Send + Sync>) -> Result<Arc<EntityMetadata<E>>> {
    entry.downcast::<EntityMetadata<E>>().map_err(|_| {
        Error::Custom(format!(
            "metadata registry entry for {} has the wrong type",
            std::any::type_name::<E>()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::FromValue;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Person {
        id: i64,
        first_name: Option<String>,
        last_name: Option<String>,
        email: Option<String>,
    }

    impl Entity for Person {
        fn descriptor() -> &'static EntityDescriptor<Self> {
            static DESCRIPTOR: EntityDescriptor<Person> = EntityDescriptor {
                type_name: "Person",
                table: Some("persons"),
                new: Person::default,
                fields: &[
                    FieldDescriptor {
                        name: "id",
                        column: Some("person_id"),
                        identity: true,
                        get: |p| Value::from(p.id),
                        set: |p, v| {
                            p.id = i64::from_value(v)?;
                            Ok(())
                        },
                    },
                    FieldDescriptor {
                        name: "first_name",
                        column: None,
                        identity: false,
                        get: |p| Value::from(p.first_name.clone()),
                        set: |p, v| {
                            p.first_name = FromValue::from_value(v)?;
                            Ok(())
                        },
                    },
                    FieldDescriptor {
                        name: "last_name",
                        column: None,
                        identity: false,
                        get: |p| Value::from(p.last_name.clone()),
                        set: |p, v| {
                            p.last_name = FromValue::from_value(v)?;
                            Ok(())
                        },
                    },
                    FieldDescriptor {
                        name: "email",
                        column: None,
                        identity: false,
                        get: |p| Value::from(p.email.clone()),
                        set: |p, v| {
                            p.email = FromValue::from_value(v)?;
                            Ok(())
                        },
                    },
                ],
            };
            &DESCRIPTOR
        }
    }

    #[derive(Default)]
    struct NoIdentity {
        name: String,
    }

    impl Entity for NoIdentity {
        fn descriptor() -> &'static EntityDescriptor<Self> {
            static DESCRIPTOR: EntityDescriptor<NoIdentity> = EntityDescriptor {
                type_name: "NoIdentity",
                table: None,
                new: NoIdentity::default,
                fields: &[FieldDescriptor {
                    name: "name",
                    column: None,
                    identity: false,
                    get: |n| Value::from(&n.name),
                    set: |n, v| {
                        n.name = String::from_value(v)?;
                        Ok(())
                    },
                }],
            };
            &DESCRIPTOR
        }
    }

    #[derive(Default)]
    struct TwoIdentities {
        a: i64,
        b: i64,
    }

    impl Entity for TwoIdentities {
        fn descriptor() -> &'static EntityDescriptor<Self> {
            static DESCRIPTOR: EntityDescriptor<TwoIdentities> = EntityDescriptor {
                type_name: "TwoIdentities",
                table: None,
                new: TwoIdentities::default,
                fields: &[
                    FieldDescriptor {
                        name: "a",
                        column: None,
                        identity: true,
                        get: |t| Value::from(t.a),
                        set: |t, v| {
                            t.a = i64::from_value(v)?;
                            Ok(())
                        },
                    },
                    FieldDescriptor {
                        name: "b",
                        column: None,
                        identity: true,
                        get: |t| Value::from(t.b),
                        set: |t, v| {
                            t.b = i64::from_value(v)?;
                            Ok(())
                        },
                    },
                ],
            };
            &DESCRIPTOR
        }
    }

    #[derive(Default)]
    struct BadTable {
        id: i64,
    }

    impl Entity for BadTable {
        fn descriptor() -> &'static EntityDescriptor<Self> {
            static DESCRIPTOR: EntityDescriptor<BadTable> = EntityDescriptor {
                type_name: "BadTable",
                table: Some("bad table"),
                new: BadTable::default,
                fields: &[FieldDescriptor {
                    name: "id",
                    column: None,
                    identity: true,
                    get: |t| Value::from(t.id),
                    set: |t, v| {
                        t.id = i64::from_value(v)?;
                        Ok(())
                    },
                }],
            };
            &DESCRIPTOR
        }
    }

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn derives_table_identity_and_columns() {
        let meta = EntityMetadata::<Person>::derive().unwrap();
        assert_eq!(meta.type_name(), "Person");
        assert_eq!(meta.table_name(), "persons");
        assert_eq!(meta.identity_column(), "person_id");
        assert_eq!(meta.column_names(), ["first_name", "last_name", "email"]);
    }

    #[test]
    fn table_name_defaults_to_type_name() {
        assert_eq!(NoIdentity::descriptor().table_name(), "NoIdentity");
        assert_eq!(Person::descriptor().table_name(), "persons");
    }

    #[test]
    fn missing_identity_is_a_config_error() {
        let err = EntityMetadata::<NoIdentity>::derive().unwrap_err();
        assert!(err.is_missing_identity());
    }

    #[test]
    fn duplicate_identity_is_a_config_error() {
        match EntityMetadata::<TwoIdentities>::derive().unwrap_err() {
            Error::Config(c) => assert_eq!(c.kind, ConfigErrorKind::DuplicateIdentity),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn invalid_table_name_is_a_config_error() {
        match EntityMetadata::<BadTable>::derive().unwrap_err() {
            Error::Config(c) => assert_eq!(c.kind, ConfigErrorKind::InvalidIdentifier),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn columns_of_omits_nulls_and_identity() {
        let meta = EntityMetadata::<Person>::derive().unwrap();
        let mut person = Person {
            id: 9,
            first_name: Some("Ada".into()),
            last_name: None,
            email: Some("ada@example.com".into()),
        };

        let columns = meta.columns_of(&person);
        assert_eq!(
            columns,
            vec![
                ("first_name", text("Ada")),
                ("email", text("ada@example.com")),
            ]
        );

        person.last_name = Some("Lovelace".into());
        assert_eq!(meta.columns_of(&person).len(), 3);
    }

    #[test]
    fn bind_policy_keeps_nulls() {
        let meta = EntityMetadata::<Person>::derive().unwrap();
        let person = Person {
            id: 1,
            ..Person::default()
        };
        let columns = meta.columns_with_policy(&person, NullPolicy::Bind);
        assert_eq!(
            columns,
            vec![
                ("first_name", Value::Null),
                ("last_name", Value::Null),
                ("email", Value::Null),
            ]
        );
        assert!(meta.columns_of(&person).is_empty());
    }

    #[test]
    fn snapshot_values_are_sorted_by_column_name() {
        let meta = EntityMetadata::<Person>::derive().unwrap();
        let person = Person {
            id: 3,
            first_name: Some("Ada".into()),
            last_name: None,
            email: Some("e".into()),
        };
        // email, first_name, last_name, person_id
        assert_eq!(
            meta.snapshot_values(&person),
            vec![text("e"), text("Ada"), Value::Null, Value::BigInt(3)]
        );
        assert_eq!(meta.identity_value_of(&person), Value::BigInt(3));
    }

    #[test]
    fn parse_assigns_every_mapped_field() {
        let meta = EntityMetadata::<Person>::derive().unwrap();
        let row = Row::new(
            vec![
                "person_id".into(),
                "first_name".into(),
                "last_name".into(),
                "email".into(),
            ],
            vec![Value::Int(2), text("Ada"), text("Lovelace"), Value::Null],
        );
        let person = meta.parse(&row).unwrap();
        assert_eq!(
            person,
            Person {
                id: 2,
                first_name: Some("Ada".into()),
                last_name: Some("Lovelace".into()),
                email: None,
            }
        );
    }

    #[test]
    fn parse_fails_on_missing_column() {
        let meta = EntityMetadata::<Person>::derive().unwrap();
        let row = Row::new(
            vec!["person_id".into(), "first_name".into(), "last_name".into()],
            vec![Value::Int(2), text("Ada"), text("Lovelace")],
        );
        match meta.parse(&row).unwrap_err() {
            Error::RowParse(e) => {
                assert_eq!(e.kind, RowParseErrorKind::MissingColumn);
                assert_eq!(e.column.as_deref(), Some("email"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn parse_type_error_names_the_column() {
        let meta = EntityMetadata::<Person>::derive().unwrap();
        let row = Row::new(
            vec![
                "person_id".into(),
                "first_name".into(),
                "last_name".into(),
                "email".into(),
            ],
            vec![text("two"), Value::Null, Value::Null, Value::Null],
        );
        match meta.parse(&row).unwrap_err() {
            Error::Type(te) => assert_eq!(te.column.as_deref(), Some("person_id")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn derivation_is_idempotent() {
        let first = EntityMetadata::<Person>::derive().unwrap();
        let second = EntityMetadata::<Person>::derive().unwrap();
        assert_eq!(first.table_name(), second.table_name());
        assert_eq!(first.identity_column(), second.identity_column());
        assert_eq!(first.column_names(), second.column_names());

        let person = Person {
            id: 4,
            first_name: Some("Grace".into()),
            last_name: Some("Hopper".into()),
            email: None,
        };
        assert_eq!(first.snapshot_values(&person), second.snapshot_values(&person));
    }

    #[test]
    fn registry_memoizes_per_type() {
        let registry = MetadataRegistry::new();
        assert!(registry.is_empty());

        let first = registry.get::<Person>().unwrap();
        let second = registry.get::<Person>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.column_names(), second.column_names());
        assert!(registry.contains::<Person>());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn registry_does_not_cache_failures() {
        let registry = MetadataRegistry::new();
        assert!(registry.get::<NoIdentity>().is_err());
        assert!(registry.get::<NoIdentity>().is_err());
        assert!(!registry.contains::<NoIdentity>());
    }
}
