//! SQLite connection provider for rowmap.
//!
// FFI calls require unsafe code - this is expected for database drivers
#![allow(unsafe_code)]
//!
//! Implements rowmap-core's `Connection` and `ConnectionProvider` on top of
//! libsqlite3 (bundled via `libsqlite3-sys`).
//!
//! # Example
//!
//! ```rust,ignore
//! use rowmap_sqlite::{SqliteConfig, SqliteProvider};
//! use rowmap_session::SessionFactory;
//!
//! let factory = SessionFactory::new(SqliteProvider::new(SqliteConfig::file("app.db")));
//! let mut session = factory.open_session()?;
//! ```
//!
//! # Type Mapping
//!
//! | Value | SQLite storage |
//! |-------|----------------|
//! | `Bool` | INTEGER (0/1) |
//! | `Int`, `BigInt` | INTEGER |
//! | `Float`, `Double` | REAL |
//! | `Text` | TEXT |
//! | `Json` | TEXT |
//! | `Bytes` | BLOB |
//! | `Null` | NULL |
//!
//! Transactions map isolation levels onto locking modes: `Serializable` is
//! `BEGIN EXCLUSIVE`, `RepeatableRead` is `BEGIN IMMEDIATE`, and the default
//! `ReadCommitted` (like `ReadUncommitted`) is `BEGIN DEFERRED`, so sessions
//! that only read never hold the write lock.

pub mod connection;
pub mod types;

pub use connection::{OpenFlags, SqliteConfig, SqliteConnection, SqliteProvider};

/// The linked SQLite library version.
pub fn sqlite_version() -> String {
    types::version()
}
