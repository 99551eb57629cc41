//! Storage capability traits.
//!
//! This module defines what a session needs from a database:
//!
//! - [`Connection`] - one blocking connection carrying one transaction at a time
//! - [`ConnectionProvider`] - hands out fresh connections to a session factory
//! - [`IsolationLevel`] - SQL transaction isolation levels
//!
//! All calls are synchronous; a session is single-threaded and owns its
//! connection exclusively.

use crate::error::Result;
use crate::row::Row;
use crate::value::Value;

/// Transaction isolation level.
///
/// Drivers without native isolation levels map these onto the closest
/// locking mode they support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// Transactions can see uncommitted changes from others.
    ReadUncommitted,

    /// Transactions only see committed changes from others.
    #[default]
    ReadCommitted,

    /// Transactions see a consistent snapshot of the database.
    RepeatableRead,

    /// Transactions appear to execute sequentially.
    Serializable,
}

impl IsolationLevel {
    /// Get the SQL syntax for this isolation level.
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// A blocking database connection.
///
/// Parameters are positional and bind to `?` placeholders in order.
pub trait Connection: Send {
    /// Run a statement that returns rows.
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Run a statement and return the number of affected rows.
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Start a transaction.
    fn begin(&mut self, isolation: IsolationLevel) -> Result<()>;

    /// Commit the current transaction.
    fn commit(&mut self) -> Result<()>;

    /// Roll back the current transaction.
    fn rollback(&mut self) -> Result<()>;

    /// Release the connection.
    fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// Source of connections for a session factory.
pub trait ConnectionProvider: Send + Sync {
    type Connection: Connection;

    /// Open a new connection.
    fn connect(&self) -> Result<Self::Connection>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isolation_default_and_sql() {
        assert_eq!(IsolationLevel::default(), IsolationLevel::ReadCommitted);
        assert_eq!(IsolationLevel::Serializable.as_sql(), "SERIALIZABLE");
        assert_eq!(
            IsolationLevel::ReadUncommitted.as_sql(),
            "READ UNCOMMITTED"
        );
    }
}
