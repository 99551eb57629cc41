//! Snapshot-based dirty detection.
//!
//! When an entity enters the identity map its mapped values are captured,
//! ordered by column name. Dirty checking re-reads the current values in the
//! same order and compares element-wise. Snapshots are replaced, never
//! mutated.

use crate::key::{EntityKey, same_value};
use rowmap_core::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Column values of an entity at the time it was cached.
#[derive(Debug, Clone)]
pub struct Snapshot {
    values: Vec<Value>,
    taken_at: Instant,
}

impl Snapshot {
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            values,
            taken_at: Instant::now(),
        }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn taken_at(&self) -> Instant {
        self.taken_at
    }

    /// Time since the snapshot was taken.
    pub fn age(&self) -> Duration {
        self.taken_at.elapsed()
    }

    /// Does `current` differ from this snapshot?
    ///
    /// A length difference or any element that differs in variant or content
    /// counts as a change.
    pub fn differs_from(&self, current: &[Value]) -> bool {
        self.values.len() != current.len()
            || self
                .values
                .iter()
                .zip(current)
                .any(|(before, now)| !same_value(before, now))
    }
}

/// Snapshot store keyed like the identity map.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    snapshots: HashMap<EntityKey, Snapshot>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the baseline for `key`, replacing any earlier one.
    #[tracing::instrument(level = "trace", skip_all, fields(key = %key))]
    pub fn snapshot(&mut self, key: EntityKey, values: Vec<Value>) {
        tracing::trace!(columns = values.len(), "Taking entity snapshot");
        self.snapshots.insert(key, Snapshot::new(values));
    }

    /// Has the entity under `key` changed since its snapshot?
    ///
    /// A key without a snapshot is treated as changed.
    pub fn has_changes(&self, key: &EntityKey, current: &[Value]) -> bool {
        let Some(snapshot) = self.snapshots.get(key) else {
            tracing::trace!(key = %key, dirty = true, "No snapshot - treating as dirty");
            return true;
        };
        let dirty = snapshot.differs_from(current);
        tracing::trace!(
            key = %key,
            dirty,
            age_ms = snapshot.age().as_millis(),
            "Dirty check result"
        );
        dirty
    }

    /// Age of the oldest snapshot still held.
    pub fn oldest_age(&self) -> Option<Duration> {
        self.snapshots
            .values()
            .min_by_key(|snapshot| snapshot.taken_at)
            .map(Snapshot::age)
    }

    pub fn get(&self, key: &EntityKey) -> Option<&Snapshot> {
        self.snapshots.get(key)
    }

    pub fn remove(&mut self, key: &EntityKey) -> Option<Snapshot> {
        self.snapshots.remove(key)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowmap_core::{Entity, EntityDescriptor, FieldDescriptor, FromValue};

    #[derive(Default)]
    struct Item {
        id: i64,
    }

    impl Entity for Item {
        fn descriptor() -> &'static EntityDescriptor<Self> {
            static DESCRIPTOR: EntityDescriptor<Item> = EntityDescriptor {
                type_name: "Item",
                table: None,
                new: Item::default,
                fields: &[FieldDescriptor {
                    name: "id",
                    column: None,
                    identity: true,
                    get: |i| Value::from(i.id),
                    set: |i, v| {
                        i.id = i64::from_value(v)?;
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
    fn unchanged_values_are_clean() {
        let mut tracker = ChangeTracker::new();
        let key = EntityKey::of::<Item>(1_i64);
        tracker.snapshot(key.clone(), vec![text("a"), Value::Null]);
        assert!(!tracker.has_changes(&key, &[text("a"), Value::Null]));
    }

    #[test]
    fn changed_value_is_dirty() {
        let mut tracker = ChangeTracker::new();
        let key = EntityKey::of::<Item>(1_i64);
        tracker.snapshot(key.clone(), vec![text("a"), Value::Null]);
        assert!(tracker.has_changes(&key, &[text("b"), Value::Null]));
        assert!(tracker.has_changes(&key, &[text("a"), text("set")]));
    }

    #[test]
    fn variant_mismatch_is_dirty() {
        let mut tracker = ChangeTracker::new();
        let key = EntityKey::of::<Item>(1_i64);
        tracker.snapshot(key.clone(), vec![Value::Int(2)]);
        assert!(tracker.has_changes(&key, &[Value::BigInt(2)]));
    }

    #[test]
    fn length_mismatch_is_dirty() {
        let snapshot = Snapshot::new(vec![Value::Int(1)]);
        assert!(snapshot.differs_from(&[Value::Int(1), Value::Null]));
        assert!(!snapshot.differs_from(&[Value::Int(1)]));
    }

    #[test]
    fn missing_snapshot_is_dirty() {
        let tracker = ChangeTracker::new();
        assert!(tracker.has_changes(&EntityKey::of::<Item>(5_i64), &[]));
    }

    #[test]
    fn snapshot_is_replaced_not_merged() {
        let mut tracker = ChangeTracker::new();
        let key = EntityKey::of::<Item>(1_i64);
        tracker.snapshot(key.clone(), vec![text("old")]);
        tracker.snapshot(key.clone(), vec![text("new")]);
        assert_eq!(tracker.len(), 1);
        assert!(!tracker.has_changes(&key, &[text("new")]));
        assert!(tracker.remove(&key).is_some());
        assert!(tracker.is_empty());
    }

    #[test]
    fn snapshots_record_when_they_were_taken() {
        let mut tracker = ChangeTracker::new();
        assert!(tracker.oldest_age().is_none());

        let first = EntityKey::of::<Item>(1_i64);
        let second = EntityKey::of::<Item>(2_i64);
        tracker.snapshot(first.clone(), vec![text("a")]);
        tracker.snapshot(second.clone(), vec![text("b")]);

        let first_at = tracker.get(&first).unwrap().taken_at();
        let second_at = tracker.get(&second).unwrap().taken_at();
        assert!(first_at <= second_at);
        assert!(tracker.oldest_age().is_some());

        tracker.remove(&first);
        tracker.remove(&second);
        assert!(tracker.oldest_age().is_none());
    }

    #[test]
    fn nan_compares_equal_to_itself() {
        let snapshot = Snapshot::new(vec![Value::Double(f64::NAN)]);
        assert!(!snapshot.differs_from(&[Value::Double(f64::NAN)]));
    }
}
