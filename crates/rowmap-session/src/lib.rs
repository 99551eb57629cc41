//! Session and unit of work for rowmap.
//!
//! `rowmap-session` is the **unit-of-work layer**. A [`Session`] owns one
//! connection and one open transaction for its whole life, and coordinates:
//!
//! - **Identity map**: one in-memory instance per (type, id).
//! - **Snapshots**: the values each cached entity had when it was loaded.
//! - **Action queue**: pending INSERT/UPDATE/DELETE statements, flushed in
//!   that order.
//!
//! Mutations made to entities returned by `find` are invisible to the
//! session until [`Session::close`] compares them to their snapshots and
//! queues an UPDATE for each one that changed.
//!
//! # Example
//!
//! ```ignore
//! let factory = SessionFactory::new(provider);
//! let mut session = factory.open_session()?;
//!
//! // Queue an INSERT (runs on the next flush)
//! session.persist(&Person::new("Ada", "Lovelace"))?;
//!
//! // Load through the identity map
//! if let Some(person) = session.find::<Person>(2)? {
//!     write_entity(&person).last_name = Some("Byron".into());
//! }
//!
//! // Dirty-check, flush and commit; rolls back on failure
//! session.close()?;
//! ```

pub mod action;
pub mod change_tracker;
pub mod factory;
pub mod identity_map;
pub mod key;
pub mod sql;

pub use action::{Action, ActionKind, ActionQueue};
pub use change_tracker::{ChangeTracker, Snapshot};
pub use factory::SessionFactory;
pub use identity_map::{
    EntityReadGuard, EntityRef, EntityWriteGuard, IdentityMap, TrackedEntry, read_entity,
    write_entity,
};
pub use key::EntityKey;

use rowmap_core::{
    Connection, Entity, EntityMetadata, Error, IsolationLevel, MetadataRegistry, NullPolicy,
    Result, Row, RowParseError, RowParseErrorKind, TransactionError, TransactionErrorKind, Value,
};
use serde::Serialize;
use std::sync::Arc;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for session behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Isolation level of the session's transaction.
    pub isolation: IsolationLevel,
    /// Whether NULL fields are left out of INSERT/UPDATE column lists.
    pub null_policy: NullPolicy,
    /// Whether `remove` also drops the entity from the identity map.
    pub evict_on_remove: bool,
    /// Whether `find`/`find_all` flush pending actions before reading.
    pub flush_before_find: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            isolation: IsolationLevel::default(),
            null_policy: NullPolicy::Omit,
            evict_on_remove: false,
            flush_before_find: true,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn null_policy(mut self, policy: NullPolicy) -> Self {
        self.null_policy = policy;
        self
    }

    pub fn evict_on_remove(mut self, evict: bool) -> Self {
        self.evict_on_remove = evict;
        self
    }

    pub fn flush_before_find(mut self, flush: bool) -> Self {
        self.flush_before_find = flush;
        self
    }
}

// ============================================================================
// State and results
// ============================================================================

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    /// Accepting finds and queued writes.
    Open,
    /// Executing queued actions.
    Flushing,
    /// Transaction finished and connection released.
    Closed,
}

/// Rows affected by one flush, per action kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlushResult {
    pub inserted: u64,
    pub updated: u64,
    pub deleted: u64,
}

impl FlushResult {
    pub fn total(&self) -> u64 {
        self.inserted + self.updated + self.deleted
    }
}

/// Debug information about session state.
#[derive(Debug, Clone, Serialize)]
pub struct SessionDebugInfo {
    /// Entities in the identity map.
    pub tracked: usize,
    /// Cached entities whose values differ from their snapshot.
    pub dirty: usize,
    /// Queued INSERTs.
    pub pending_inserts: usize,
    /// Queued UPDATEs.
    pub pending_updates: usize,
    /// Queued DELETEs.
    pub pending_deletes: usize,
    /// Age of the oldest snapshot, if anything is tracked.
    pub oldest_snapshot: Option<std::time::Duration>,
    pub state: SessionState,
}

// ============================================================================
// Session
// ============================================================================

/// A unit of work over one connection and one transaction.
///
/// Created by [`SessionFactory::open_session`] or [`Session::begin`], ended
/// by [`Session::close`]. Dropping an unclosed session rolls back and
/// releases the connection.
pub struct Session<C: Connection> {
    connection: Option<C>,
    registry: Arc<MetadataRegistry>,
    config: SessionConfig,
    identity_map: IdentityMap,
    tracker: ChangeTracker,
    actions: ActionQueue,
    state: SessionState,
}

impl<C: Connection> Session<C> {
    /// Begin a transaction on `connection` and wrap it in a session.
    ///
    /// If BEGIN fails the connection is released before the error returns.
    #[allow(clippy::result_large_err)]
    pub fn begin(
        mut connection: C,
        registry: Arc<MetadataRegistry>,
        config: SessionConfig,
    ) -> Result<Self> {
        if let Err(e) = connection.begin(config.isolation) {
            tracing::warn!(error = %e, "Failed to begin transaction; releasing connection");
            if let Err(close_err) = connection.close() {
                tracing::warn!(error = %close_err, "Failed to release connection");
            }
            return Err(e);
        }
        tracing::debug!(isolation = config.isolation.as_sql(), "Session opened");

        Ok(Self {
            connection: Some(connection),
            registry,
            config,
            identity_map: IdentityMap::new(),
            tracker: ChangeTracker::new(),
            actions: ActionQueue::new(),
            state: SessionState::Open,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Metadata for `E` from the shared registry.
    #[allow(clippy::result_large_err)]
    pub fn metadata<E: Entity>(&self) -> Result<Arc<EntityMetadata<E>>> {
        self.registry.get::<E>()
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Load every row of `E`'s table.
    ///
    /// Each returned entity is cached and snapshotted, replacing any instance
    /// already cached under the same id.
    #[tracing::instrument(level = "debug", skip_all, fields(entity = std::any::type_name::<E>()))]
    #[allow(clippy::result_large_err)]
    pub fn find_all<E: Entity>(&mut self) -> Result<Vec<EntityRef<E>>> {
        self.flush_before_read()?;
        let meta = self.registry.get::<E>()?;
        let rows = self.run_query(&sql::select_all(&meta), &[])?;

        let mut found = Vec::with_capacity(rows.len());
        for row in &rows {
            let entity = meta.parse(row)?;
            found.push(self.cache(&meta, entity));
        }
        tracing::debug!(rows = found.len(), "Loaded entities");
        Ok(found)
    }

    /// Load one `E` by id.
    ///
    /// A cached instance is returned without touching the database. Zero
    /// rows yields `None`; more than one row is an `Ambiguous` row-parse
    /// error.
    #[tracing::instrument(level = "debug", skip_all, fields(entity = std::any::type_name::<E>()))]
    #[allow(clippy::result_large_err)]
    pub fn find<E: Entity>(&mut self, id: impl Into<Value>) -> Result<Option<EntityRef<E>>> {
        self.flush_before_read()?;
        let id = id.into();
        let key = EntityKey::of::<E>(id.clone());
        if let Some(hit) = self.identity_map.get::<E>(&key) {
            tracing::trace!(key = %key, "Identity map hit");
            return Ok(Some(hit));
        }

        let meta = self.registry.get::<E>()?;
        let rows = self.run_query(&sql::select_by_id(&meta), std::slice::from_ref(&id))?;
        match rows.as_slice() {
            [] => Ok(None),
            [row] => {
                let entity = meta.parse(row)?;
                Ok(Some(self.cache(&meta, entity)))
            }
            rows => Err(Error::RowParse(RowParseError {
                kind: RowParseErrorKind::Ambiguous,
                entity: meta.type_name(),
                column: Some(meta.identity_column().to_string()),
                message: format!(
                    "{} rows matched {} = {:?}",
                    rows.len(),
                    meta.identity_column(),
                    id
                ),
            })),
        }
    }

    /// Is an `E` with this id cached?
    pub fn contains<E: Entity>(&self, id: impl Into<Value>) -> bool {
        self.identity_map.contains(&EntityKey::of::<E>(id))
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Queue an INSERT of `entity`'s current columns.
    ///
    /// The instance is not tracked afterwards and database-generated keys
    /// are not read back.
    #[allow(clippy::result_large_err)]
    pub fn persist<E: Entity>(&mut self, entity: &E) -> Result<()> {
        let meta = self.registry.get::<E>()?;
        self.actions
            .push(Action::insert(&meta, entity, self.config.null_policy));
        Ok(())
    }

    /// Queue a DELETE of `entity` by identity.
    ///
    /// The cached instance stays in the identity map unless
    /// `SessionConfig::evict_on_remove` is set.
    #[allow(clippy::result_large_err)]
    pub fn remove<E: Entity>(&mut self, entity: &E) -> Result<()> {
        let meta = self.registry.get::<E>()?;
        self.actions.push(Action::delete(&meta, entity));
        if self.config.evict_on_remove {
            self.evict(&EntityKey::of::<E>(meta.identity_value_of(entity)));
        }
        Ok(())
    }

    /// [`Session::remove`] for a cached reference.
    #[allow(clippy::result_large_err)]
    pub fn remove_ref<E: Entity>(&mut self, entity: &EntityRef<E>) -> Result<()> {
        let guard = read_entity(entity);
        self.remove(&*guard)
    }

    /// Cache `entity` as if it had just been loaded.
    ///
    /// Later mutations through the returned reference are dirty-checked at
    /// close like any loaded entity.
    #[allow(clippy::result_large_err)]
    pub fn attach<E: Entity>(&mut self, entity: E) -> Result<EntityRef<E>> {
        let meta = self.registry.get::<E>()?;
        Ok(self.cache(&meta, entity))
    }

    /// Drop `key` from the identity map and snapshot store.
    pub fn evict(&mut self, key: &EntityKey) -> bool {
        self.tracker.remove(key);
        let removed = self.identity_map.remove(key);
        if removed {
            tracing::trace!(key = %key, "Evicted entity");
        }
        removed
    }

    /// Does `entity` differ from its snapshot?
    ///
    /// An entity the session never cached counts as modified.
    #[allow(clippy::result_large_err)]
    pub fn is_modified<E: Entity>(&self, entity: &EntityRef<E>) -> Result<bool> {
        let meta = self.registry.get::<E>()?;
        let guard = read_entity(entity);
        let key = EntityKey::of::<E>(meta.identity_value_of(&guard));
        Ok(self
            .tracker
            .has_changes(&key, &meta.snapshot_values(&guard)))
    }

    /// Keys of cached entities that differ from their snapshot, in
    /// first-insertion order.
    pub fn dirty_keys(&self) -> Vec<EntityKey> {
        self.identity_map
            .iter()
            .filter(|(key, entry)| self.tracker.has_changes(key, &entry.snapshot_values()))
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn pending_actions(&self) -> &ActionQueue {
        &self.actions
    }

    // ========================================================================
    // Flush and close
    // ========================================================================

    /// Execute queued actions: all INSERTs, then all UPDATEs, then all
    /// DELETEs.
    ///
    /// The queue is emptied before the first statement runs, so it is clear
    /// even when a statement fails.
    #[tracing::instrument(level = "debug", skip(self))]
    #[allow(clippy::result_large_err)]
    pub fn flush(&mut self) -> Result<FlushResult> {
        if self.actions.is_empty() {
            tracing::trace!("Nothing to flush");
            return Ok(FlushResult::default());
        }

        tracing::info!(
            inserts = self.actions.count(ActionKind::Insert),
            updates = self.actions.count(ActionKind::Update),
            deletes = self.actions.count(ActionKind::Delete),
            "Flushing pending actions"
        );
        let actions = self.actions.take_ordered();

        self.state = SessionState::Flushing;
        let outcome = self.execute_actions(&actions);
        self.state = SessionState::Open;

        if let Err(e) = &outcome {
            tracing::warn!(error = %e, "Flush failed; pending actions discarded");
        }
        outcome
    }

    /// Queue an UPDATE for every dirty entity, flush, and commit.
    ///
    /// On any failure the transaction is rolled back and the first error is
    /// returned. The connection is released exactly once either way.
    #[tracing::instrument(level = "debug", skip(self))]
    #[allow(clippy::result_large_err)]
    pub fn close(mut self) -> Result<()> {
        let outcome = self.commit_work();
        if let Err(e) = &outcome {
            tracing::warn!(error = %e, "Session close failed; rolling back");
            self.rollback_quietly();
        }
        let released = self.release();
        outcome.and(released)
    }

    /// Debug snapshot of the session's bookkeeping.
    pub fn debug_state(&self) -> SessionDebugInfo {
        SessionDebugInfo {
            tracked: self.identity_map.len(),
            dirty: self.dirty_keys().len(),
            pending_inserts: self.actions.count(ActionKind::Insert),
            pending_updates: self.actions.count(ActionKind::Update),
            pending_deletes: self.actions.count(ActionKind::Delete),
            oldest_snapshot: self.tracker.oldest_age(),
            state: self.state,
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn cache<E: Entity>(&mut self, meta: &Arc<EntityMetadata<E>>, entity: E) -> EntityRef<E> {
        let key = EntityKey::of::<E>(meta.identity_value_of(&entity));
        self.tracker.snapshot(key.clone(), meta.snapshot_values(&entity));
        self.identity_map.insert(key, entity, Arc::clone(meta))
    }

    #[allow(clippy::result_large_err)]
    fn flush_before_read(&mut self) -> Result<()> {
        if self.config.flush_before_find {
            self.flush()?;
        }
        Ok(())
    }

    #[allow(clippy::result_large_err)]
    fn execute_actions(&mut self, actions: &[Action]) -> Result<FlushResult> {
        let mut result = FlushResult::default();
        for action in actions {
            let affected = self.run_execute(action.sql(), action.params())?;
            match action.kind() {
                ActionKind::Insert => result.inserted += affected,
                ActionKind::Update => result.updated += affected,
                ActionKind::Delete => result.deleted += affected,
            }
        }
        tracing::debug!(
            inserted = result.inserted,
            updated = result.updated,
            deleted = result.deleted,
            "Flush complete"
        );
        Ok(result)
    }

    fn queue_dirty_updates(&mut self) {
        let policy = self.config.null_policy;
        for (key, entry) in self.identity_map.iter() {
            if !self.tracker.has_changes(key, &entry.snapshot_values()) {
                continue;
            }
            match entry.update_action(policy) {
                Some(action) => self.actions.push(action),
                None => {
                    tracing::warn!(key = %key, "Dirty entity has no columns to update; skipping");
                }
            }
        }
    }

    #[allow(clippy::result_large_err)]
    fn commit_work(&mut self) -> Result<()> {
        self.queue_dirty_updates();
        self.flush()?;
        self.connection()?.commit()?;
        tracing::debug!("Transaction committed");
        Ok(())
    }

    fn rollback_quietly(&mut self) {
        if let Some(connection) = self.connection.as_mut() {
            match connection.rollback() {
                Ok(()) => tracing::debug!("Transaction rolled back"),
                Err(e) => tracing::warn!(error = %e, "Rollback failed"),
            }
        }
    }

    #[allow(clippy::result_large_err)]
    fn release(&mut self) -> Result<()> {
        self.state = SessionState::Closed;
        match self.connection.take() {
            Some(connection) => connection
                .close()
                .inspect_err(|e| tracing::warn!(error = %e, "Failed to release connection")),
            None => Ok(()),
        }
    }

    #[allow(clippy::result_large_err)]
    fn connection(&mut self) -> Result<&mut C> {
        self.connection.as_mut().ok_or_else(|| {
            Error::Transaction(TransactionError {
                kind: TransactionErrorKind::NotActive,
                message: "session has already released its connection".to_string(),
                source: None,
            })
        })
    }

    #[allow(clippy::result_large_err)]
    fn run_query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        tracing::debug!(sql, params = ?params, "Executing query");
        self.connection()?.query(sql, params)
    }

    #[allow(clippy::result_large_err)]
    fn run_execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        tracing::debug!(sql, params = ?params, "Executing statement");
        self.connection()?.execute(sql, params)
    }
}

impl<C: Connection> Drop for Session<C> {
    fn drop(&mut self) {
        if self.connection.is_some() {
            tracing::warn!(
                pending = self.actions.len(),
                "Session dropped without close; rolling back"
            );
            self.rollback_quietly();
            let _ = self.release();
        }
    }
}

impl<C: Connection> std::fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("identity_map", &self.identity_map)
            .field("pending_actions", &self.actions.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
