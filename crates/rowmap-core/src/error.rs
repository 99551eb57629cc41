//! Error types for rowmap operations.

use std::fmt;

/// The primary error type for all rowmap operations.
#[derive(Debug)]
pub enum Error {
    /// Connection-related errors (connect, release)
    Connection(ConnectionError),
    /// Statement execution errors
    Query(QueryError),
    /// Value conversion errors
    Type(TypeError),
    /// Transaction errors (begin, commit, rollback)
    Transaction(TransactionError),
    /// Entity mapping configuration errors
    Config(ConfigError),
    /// A result row could not be turned into an entity
    RowParse(RowParseError),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to establish connection
    Connect,
    /// Failed to release the connection
    Close,
    /// Connection is no longer usable
    Disconnected,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Table or column not found
    NotFound,
    /// Permission denied
    Permission,
    /// Database busy or locked
    Busy,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
    pub rust_type: Option<&'static str>,
}

#[derive(Debug)]
pub struct TransactionError {
    pub kind: TransactionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionErrorKind {
    /// BEGIN failed
    Begin,
    /// COMMIT failed
    Commit,
    /// ROLLBACK failed
    Rollback,
    /// The session no longer holds an open transaction
    NotActive,
}

#[derive(Debug)]
pub struct ConfigError {
    pub kind: ConfigErrorKind,
    /// The entity type whose mapping is invalid, when known
    pub entity: Option<&'static str>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    /// No field is marked as identity
    MissingIdentity,
    /// More than one field is marked as identity
    DuplicateIdentity,
    /// Two fields map to the same column
    DuplicateColumn,
    /// A table or column name is not a plain SQL identifier
    InvalidIdentifier,
    /// Other configuration problem
    Other,
}

#[derive(Debug)]
pub struct RowParseError {
    pub kind: RowParseErrorKind,
    pub entity: &'static str,
    pub column: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowParseErrorKind {
    /// A mapped column is absent from the row
    MissingColumn,
    /// A lookup by identity returned more than one row
    Ambiguous,
}

impl Error {
    /// Is this an entity mapping configuration error?
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    /// Is this the "no identity field" configuration error?
    pub fn is_missing_identity(&self) -> bool {
        matches!(self, Error::Config(c) if c.kind == ConfigErrorKind::MissingIdentity)
    }

    /// Is this a row-parse error?
    pub fn is_row_parse_error(&self) -> bool {
        matches!(self, Error::RowParse(_))
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }

    pub(crate) fn config(
        kind: ConfigErrorKind,
        entity: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Error::Config(ConfigError {
            kind,
            entity: Some(entity),
            message: message.into(),
            source: None,
        })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) => write!(f, "Query error: {}", e.message),
            Error::Type(e) => {
                if let Some(col) = &e.column {
                    write!(
                        f,
                        "Type error in column '{}': expected {}, found {}",
                        col, e.expected, e.actual
                    )
                } else {
                    write!(f, "Type error: expected {}, found {}", e.expected, e.actual)
                }
            }
            Error::Transaction(e) => write!(f, "Transaction error: {}", e.message),
            Error::Config(e) => write!(f, "Configuration error: {}", e),
            Error::RowParse(e) => write!(f, "Row parse error: {}", e),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Transaction(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.entity {
            Some(entity) => write!(f, "{}: {}", entity, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl fmt::Display for RowParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.entity, self.message)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<TransactionError> for Error {
    fn from(err: TransactionError) -> Self {
        Error::Transaction(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<RowParseError> for Error {
    fn from(err: RowParseError) -> Self {
        Error::RowParse(err)
    }
}

/// Result type alias for rowmap operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sql_helper_only_reports_query_errors() {
        let err = Error::Query(QueryError {
            kind: QueryErrorKind::Constraint,
            sql: Some("INSERT INTO persons (first_name) VALUES (?)".to_string()),
            message: "UNIQUE constraint failed".to_string(),
            source: None,
        });
        assert_eq!(
            err.sql(),
            Some("INSERT INTO persons (first_name) VALUES (?)")
        );
        assert_eq!(err.to_string(), "Query error: UNIQUE constraint failed");

        let err = Error::Custom("boom".to_string());
        assert_eq!(err.sql(), None);
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn config_error_flags() {
        let err = Error::config(
            ConfigErrorKind::MissingIdentity,
            "Person",
            "no field is marked as identity",
        );
        assert!(err.is_config_error());
        assert!(err.is_missing_identity());
        assert_eq!(
            err.to_string(),
            "Configuration error: Person: no field is marked as identity"
        );

        let err = Error::config(ConfigErrorKind::DuplicateColumn, "Person", "dup");
        assert!(err.is_config_error());
        assert!(!err.is_missing_identity());
    }

    #[test]
    fn source_chains_through_boxed_errors() {
        use std::error::Error as _;

        let io = std::io::Error::other("disk gone");
        let err = Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::Connect,
            message: "failed to open".to_string(),
            source: Some(Box::new(io)),
        });
        let source = err.source().map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("disk gone"));
    }

    #[test]
    fn row_parse_display() {
        let err = Error::RowParse(RowParseError {
            kind: RowParseErrorKind::MissingColumn,
            entity: "Person",
            column: Some("email".to_string()),
            message: "column 'email' not present in row".to_string(),
        });
        assert!(err.is_row_parse_error());
        assert_eq!(
            err.to_string(),
            "Row parse error: Person: column 'email' not present in row"
        );
    }
}
