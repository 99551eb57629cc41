//! Pending write intents and their flush ordering.
//!
//! An [`Action`] is one parameterized statement waiting to run. The
//! [`ActionQueue`] keeps actions in creation order and hands them out grouped
//! by kind: every INSERT, then every UPDATE, then every DELETE. Order within
//! a kind is creation order.

use crate::sql;
use rowmap_core::{Entity, EntityMetadata, NullPolicy, Value};
use serde::Serialize;
use std::fmt;

/// Kind of a pending write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ActionKind {
    Insert,
    Update,
    Delete,
}

impl ActionKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Insert => "INSERT",
            ActionKind::Update => "UPDATE",
            ActionKind::Delete => "DELETE",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One queued statement with its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    kind: ActionKind,
    sql: String,
    params: Vec<Value>,
}

impl Action {
    pub fn new(kind: ActionKind, sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            kind,
            sql: sql.into(),
            params,
        }
    }

    /// INSERT for `entity` with an explicit column list.
    ///
    /// The identity column is never part of the list.
    pub fn insert<E: Entity>(meta: &EntityMetadata<E>, entity: &E, policy: NullPolicy) -> Self {
        let (columns, params): (Vec<_>, Vec<_>) =
            meta.columns_with_policy(entity, policy).into_iter().unzip();
        Self::new(
            ActionKind::Insert,
            sql::insert(meta.table_name(), &columns),
            params,
        )
    }

    /// UPDATE of every column of `entity`, keyed on its identity.
    ///
    /// Returns `None` when there are no columns to set.
    pub fn update<E: Entity>(
        meta: &EntityMetadata<E>,
        entity: &E,
        policy: NullPolicy,
    ) -> Option<Self> {
        let (columns, mut params): (Vec<_>, Vec<_>) =
            meta.columns_with_policy(entity, policy).into_iter().unzip();
        if columns.is_empty() {
            return None;
        }
        params.push(meta.identity_value_of(entity));
        Some(Self::new(
            ActionKind::Update,
            sql::update(meta.table_name(), &columns, meta.identity_column()),
            params,
        ))
    }

    /// DELETE keyed on the identity of `entity`.
    pub fn delete<E: Entity>(meta: &EntityMetadata<E>, entity: &E) -> Self {
        Self::new(
            ActionKind::Delete,
            sql::delete(meta.table_name(), meta.identity_column()),
            vec![meta.identity_value_of(entity)],
        )
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }
}

/// Pending actions in creation order.
#[derive(Debug, Default)]
pub struct ActionQueue {
    actions: Vec<Action>,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: Action) {
        tracing::trace!(kind = %action.kind, sql = %action.sql, "Queued action");
        self.actions.push(action);
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Number of queued actions of `kind`.
    pub fn count(&self, kind: ActionKind) -> usize {
        self.actions.iter().filter(|a| a.kind == kind).count()
    }

    /// Actions in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter()
    }

    /// Empty the queue, returning its actions grouped Insert, Update, Delete.
    pub fn take_ordered(&mut self) -> Vec<Action> {
        let mut actions = std::mem::take(&mut self.actions);
        // Stable: creation order survives within each kind.
        actions.sort_by_key(|a| a.kind);
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(kind: ActionKind, tag: &str) -> Action {
        Action::new(kind, tag, Vec::new())
    }

    #[test]
    fn take_ordered_groups_by_kind() {
        let mut queue = ActionQueue::new();
        queue.push(action(ActionKind::Delete, "d1"));
        queue.push(action(ActionKind::Update, "u1"));
        queue.push(action(ActionKind::Insert, "i1"));
        queue.push(action(ActionKind::Delete, "d2"));
        queue.push(action(ActionKind::Insert, "i2"));

        assert_eq!(queue.count(ActionKind::Insert), 2);
        assert_eq!(queue.count(ActionKind::Delete), 2);

        let order: Vec<_> = queue
            .take_ordered()
            .iter()
            .map(|a| a.sql().to_string())
            .collect();
        assert_eq!(order, ["i1", "i2", "u1", "d1", "d2"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn take_ordered_on_empty_queue() {
        let mut queue = ActionQueue::new();
        assert!(queue.take_ordered().is_empty());
    }

    #[test]
    fn kind_display() {
        assert_eq!(ActionKind::Update.to_string(), "UPDATE");
        assert!(ActionKind::Insert < ActionKind::Update);
        assert!(ActionKind::Update < ActionKind::Delete);
    }
}
