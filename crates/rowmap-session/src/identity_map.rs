//! Identity map: at most one live instance per (type, id) within a session.
//!
//! Entities are handed out as [`EntityRef`]s (`Arc<RwLock<E>>`), so two
//! lookups of the same key return references to the same instance and a
//! mutation through one is visible through the other.
//!
//! Entries are type-erased behind [`TrackedEntry`], which keeps each entity's
//! metadata next to it. That lets the session read current values and build
//! UPDATE statements for a heterogeneous set of cached entities.
//!
//! Iteration follows the order keys were first inserted. Overwriting a key
//! replaces the instance but keeps its original position.

use crate::action::Action;
use crate::key::EntityKey;
use rowmap_core::{Entity, EntityMetadata, NullPolicy, Value};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// A shared reference to a cached entity.
pub type EntityRef<E> = Arc<RwLock<E>>;

/// A guard for reading a cached entity.
pub type EntityReadGuard<'a, E> = std::sync::RwLockReadGuard<'a, E>;

/// A guard for writing to a cached entity.
pub type EntityWriteGuard<'a, E> = std::sync::RwLockWriteGuard<'a, E>;

/// Read an entity, recovering the value from a poisoned lock.
pub fn read_entity<E>(entity: &EntityRef<E>) -> EntityReadGuard<'_, E> {
    entity.read().unwrap_or_else(PoisonError::into_inner)
}

/// Write an entity, recovering the value from a poisoned lock.
pub fn write_entity<E>(entity: &EntityRef<E>) -> EntityWriteGuard<'_, E> {
    entity.write().unwrap_or_else(PoisonError::into_inner)
}

/// Type-erased view of a cached entity.
pub trait TrackedEntry: Send + Sync {
    fn as_any(&self) -> &(dyn Any + Send + Sync);

    /// Name of the entity type.
    fn type_name(&self) -> &'static str;

    /// Current mapped values, ordered by column name.
    fn snapshot_values(&self) -> Vec<Value>;

    /// UPDATE writing the entity's current columns, or `None` if it has no
    /// columns to set.
    fn update_action(&self, policy: NullPolicy) -> Option<Action>;
}

struct Tracked<E: Entity> {
    entity: EntityRef<E>,
    metadata: Arc<EntityMetadata<E>>,
}

impl<E: Entity> TrackedEntry for Tracked<E> {
    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }

    fn type_name(&self) -> &'static str {
        self.metadata.type_name()
    }

    fn snapshot_values(&self) -> Vec<Value> {
        self.metadata.snapshot_values(&read_entity(&self.entity))
    }

    fn update_action(&self, policy: NullPolicy) -> Option<Action> {
        Action::update(&self.metadata, &read_entity(&self.entity), policy)
    }
}

struct Slot {
    seq: u64,
    entry: Box<dyn TrackedEntry>,
}

/// Cache of loaded entities keyed by [`EntityKey`].
#[derive(Default)]
pub struct IdentityMap {
    slots: HashMap<EntityKey, Slot>,
    next_seq: u64,
}

impl IdentityMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache `entity` under `key`, replacing any instance already there.
    ///
    /// Returns the shared reference now stored in the map.
    pub fn insert<E: Entity>(
        &mut self,
        key: EntityKey,
        entity: E,
        metadata: Arc<EntityMetadata<E>>,
    ) -> EntityRef<E> {
        let entity = Arc::new(RwLock::new(entity));
        let entry: Box<dyn TrackedEntry> = Box::new(Tracked {
            entity: Arc::clone(&entity),
            metadata,
        });

        if let Some(slot) = self.slots.get_mut(&key) {
            tracing::trace!(key = %key, "Replacing cached entity");
            slot.entry = entry;
        } else {
            let seq = self.next_seq;
            self.next_seq += 1;
            self.slots.insert(key, Slot { seq, entry });
        }
        entity
    }

    /// Get the cached instance for `key`, if it holds an `E`.
    pub fn get<E: Entity>(&self, key: &EntityKey) -> Option<EntityRef<E>> {
        let slot = self.slots.get(key)?;
        let tracked = slot.entry.as_any().downcast_ref::<Tracked<E>>()?;
        Some(Arc::clone(&tracked.entity))
    }

    /// Get the type-erased entry for `key`.
    pub fn entry(&self, key: &EntityKey) -> Option<&dyn TrackedEntry> {
        self.slots.get(key).map(|slot| slot.entry.as_ref())
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.slots.contains_key(key)
    }

    /// Drop the entry for `key`. Returns whether one was present.
    pub fn remove(&mut self, key: &EntityKey) -> bool {
        self.slots.remove(key).is_some()
    }

    /// Entries in first-insertion order of their keys.
    pub fn iter(&self) -> impl Iterator<Item = (&EntityKey, &dyn TrackedEntry)> {
        let mut slots: Vec<_> = self.slots.iter().collect();
        slots.sort_by_key(|(_, slot)| slot.seq);
        slots
            .into_iter()
            .map(|(key, slot)| (key, slot.entry.as_ref()))
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl std::fmt::Debug for IdentityMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.iter().map(|(key, _)| key))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowmap_core::{EntityDescriptor, FieldDescriptor, FromValue};

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Note {
        id: i64,
        body: Option<String>,
    }

    impl Entity for Note {
        fn descriptor() -> &'static EntityDescriptor<Self> {
            static DESCRIPTOR: EntityDescriptor<Note> = EntityDescriptor {
                type_name: "Note",
                table: Some("notes"),
                new: Note::default,
                fields: &[
                    FieldDescriptor {
                        name: "id",
                        column: None,
                        identity: true,
                        get: |n| Value::from(n.id),
                        set: |n, v| {
                            n.id = i64::from_value(v)?;
                            Ok(())
                        },
                    },
                    FieldDescriptor {
                        name: "body",
                        column: None,
                        identity: false,
                        get: |n| Value::from(n.body.clone()),
                        set: |n, v| {
                            n.body = FromValue::from_value(v)?;
                            Ok(())
                        },
                    },
                ],
            };
            &DESCRIPTOR
        }
    }

    fn note(id: i64, body: &str) -> Note {
        Note {
            id,
            body: Some(body.to_string()),
        }
    }

    fn meta() -> Arc<EntityMetadata<Note>> {
        Arc::new(EntityMetadata::derive().unwrap())
    }

    #[test]
    fn get_returns_the_same_instance() {
        let mut map = IdentityMap::new();
        let key = EntityKey::of::<Note>(1_i64);
        let stored = map.insert(key.clone(), note(1, "a"), meta());

        let first = map.get::<Note>(&key).unwrap();
        let second = map.get::<Note>(&key).unwrap();
        assert!(Arc::ptr_eq(&stored, &first));
        assert!(Arc::ptr_eq(&first, &second));

        write_entity(&first).body = Some("changed".into());
        assert_eq!(read_entity(&second).body.as_deref(), Some("changed"));
    }

    #[test]
    fn insert_overwrites_and_keeps_position() {
        let mut map = IdentityMap::new();
        let meta = meta();
        let k1 = EntityKey::of::<Note>(1_i64);
        let k2 = EntityKey::of::<Note>(2_i64);

        let old = map.insert(k1.clone(), note(1, "old"), Arc::clone(&meta));
        map.insert(k2.clone(), note(2, "b"), Arc::clone(&meta));
        let new = map.insert(k1.clone(), note(1, "new"), Arc::clone(&meta));

        assert_eq!(map.len(), 2);
        assert!(!Arc::ptr_eq(&old, &new));
        let current = map.get::<Note>(&k1).unwrap();
        assert!(Arc::ptr_eq(&current, &new));

        let order: Vec<_> = map.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(order, vec![k1, k2]);
    }

    #[test]
    fn erased_entry_reads_current_values() {
        let mut map = IdentityMap::new();
        let key = EntityKey::of::<Note>(3_i64);
        let stored = map.insert(key.clone(), note(3, "x"), meta());

        let entry = map.entry(&key).unwrap();
        assert_eq!(entry.type_name(), "Note");
        // body, id
        assert_eq!(
            entry.snapshot_values(),
            vec![Value::Text("x".into()), Value::BigInt(3)]
        );

        write_entity(&stored).body = Some("y".into());
        let update = entry.update_action(NullPolicy::Omit).unwrap();
        assert_eq!(update.sql(), "UPDATE notes SET body = ? WHERE id = ?");
        assert_eq!(
            update.params(),
            [Value::Text("y".into()), Value::BigInt(3)]
        );

        write_entity(&stored).body = None;
        assert!(entry.update_action(NullPolicy::Omit).is_none());
    }

    #[test]
    fn remove_and_contains() {
        let mut map = IdentityMap::new();
        let key = EntityKey::of::<Note>(1_i64);
        map.insert(key.clone(), note(1, "a"), meta());
        assert!(map.contains(&key));
        assert!(map.remove(&key));
        assert!(!map.remove(&key));
        assert!(map.get::<Note>(&key).is_none());
        assert!(map.is_empty());
    }
}
