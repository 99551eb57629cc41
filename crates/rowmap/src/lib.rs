//! rowmap - a small unit-of-work ORM.
//!
//! rowmap maps plain structs to tables and batches writes inside one
//! transaction per session:
//!
//! - **Identity map**: loading the same row twice yields the same instance
//! - **Dirty checking**: changed entities are written back on `close`
//! - **Ordered flushes**: INSERTs, then UPDATEs, then DELETEs
//! - **Rollback on failure**: a failed flush or commit rolls everything back
//!
//! # Quick Start
//!
//! ```ignore
//! use rowmap::prelude::*;
//! use rowmap::sqlite::SqliteProvider;
//!
//! #[derive(Debug, Default, Entity)]
//! #[rowmap(table = "persons")]
//! struct Person {
//!     #[rowmap(id)]
//!     id: i64,
//!     first_name: Option<String>,
//!     last_name: Option<String>,
//! }
//!
//! fn rename(factory: &SessionFactory<SqliteProvider>) -> Result<()> {
//!     let mut session = factory.open_session()?;
//!
//!     if let Some(person) = session.find::<Person>(2)? {
//!         write_entity(&person).last_name = Some("Byron".into());
//!     }
//!
//!     // Writes one UPDATE and commits
//!     session.close()
//! }
//! ```

// Core types
pub use rowmap_core::{
    ColumnInfo, ConfigError, ConfigErrorKind, Connection, ConnectionError, ConnectionErrorKind,
    ConnectionProvider, Entity, EntityDescriptor, EntityMetadata, Error, FieldDescriptor,
    FromValue, IsolationLevel, MetadataRegistry, NullPolicy, QueryError, QueryErrorKind, Result,
    Row, RowParseError, RowParseErrorKind, TransactionError, TransactionErrorKind, TypeError,
    Value, is_valid_identifier,
};

// Derive macro
pub use rowmap_macros::Entity;

// Session
pub use rowmap_session::{
    Action, ActionKind, ActionQueue, EntityKey, EntityReadGuard, EntityRef, EntityWriteGuard,
    FlushResult, Session, SessionConfig, SessionDebugInfo, SessionFactory, SessionState,
    read_entity, write_entity,
};

/// SQLite connection provider.
#[cfg(feature = "sqlite")]
pub mod sqlite {
    pub use rowmap_sqlite::{
        OpenFlags, SqliteConfig, SqliteConnection, SqliteProvider, sqlite_version,
    };
}

/// Common imports for application code.
pub mod prelude {
    pub use crate::{
        Connection, ConnectionProvider, Entity, EntityRef, Error, IsolationLevel, NullPolicy,
        Result, Session, SessionConfig, SessionFactory, Value, read_entity, write_entity,
    };
}
