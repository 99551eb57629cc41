//! Identity-map keys.

use rowmap_core::{Entity, Value};
use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Unique key for an entity in the identity map: its type plus its id.
///
/// Integer ids are normalized to `BigInt`, so an id looked up as `2_i32`
/// and an entity whose identity field reads back as `BigInt(2)` share a key.
/// Floating-point ids compare by bit pattern.
#[derive(Debug, Clone)]
pub struct EntityKey {
    type_id: TypeId,
    type_name: &'static str,
    id: Value,
}

impl EntityKey {
    /// Create a key for entity type `E`.
    pub fn of<E: Entity>(id: impl Into<Value>) -> Self {
        Self {
            type_id: TypeId::of::<E>(),
            type_name: E::descriptor().type_name,
            id: normalize(id.into()),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// The normalized id value.
    pub fn id(&self) -> &Value {
        &self.id
    }
}

fn normalize(id: Value) -> Value {
    match id {
        Value::Int(v) => Value::BigInt(i64::from(v)),
        other => other,
    }
}

/// Strict value equality: same variant and same content, floats by bits.
pub(crate) fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Float(x), Value::Float(y)) => x.to_bits() == y.to_bits(),
        (Value::Double(x), Value::Double(y)) => x.to_bits() == y.to_bits(),
        _ => a == b,
    }
}

fn hash_value(v: &Value, hasher: &mut impl Hasher) {
    match v {
        Value::Null => 0u8.hash(hasher),
        Value::Bool(b) => {
            1u8.hash(hasher);
            b.hash(hasher);
        }
        Value::Int(i) => {
            2u8.hash(hasher);
            i.hash(hasher);
        }
        Value::BigInt(i) => {
            3u8.hash(hasher);
            i.hash(hasher);
        }
        Value::Float(f) => {
            4u8.hash(hasher);
            f.to_bits().hash(hasher);
        }
        Value::Double(f) => {
            5u8.hash(hasher);
            f.to_bits().hash(hasher);
        }
        Value::Text(s) => {
            6u8.hash(hasher);
            s.hash(hasher);
        }
        Value::Bytes(b) => {
            7u8.hash(hasher);
            b.hash(hasher);
        }
        Value::Json(j) => {
            8u8.hash(hasher);
            j.to_string().hash(hasher);
        }
    }
}

impl PartialEq for EntityKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && same_value(&self.id, &other.id)
    }
}

impl Eq for EntityKey {}

impl Hash for EntityKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
        hash_value(&self.id, state);
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{:?}", self.type_name, self.id)
    }
}
