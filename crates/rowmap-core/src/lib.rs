//! Core types and traits for rowmap.
//!
//! This crate provides the foundations the session engine is built on:
//!
//! - `Value` and `Row` for parameters and result sets
//! - `Connection` / `ConnectionProvider`, the synchronous storage capability
//! - `Entity` and its static `EntityDescriptor` of field accessors
//! - `EntityMetadata`, derived once per type and cached in a `MetadataRegistry`

pub mod connection;
pub mod entity;
pub mod error;
pub mod identifiers;
pub mod metadata;
pub mod row;
pub mod value;

pub use connection::{Connection, ConnectionProvider, IsolationLevel};
pub use entity::{Entity, EntityDescriptor, FieldDescriptor};
pub use error::{
    ConfigError, ConfigErrorKind, ConnectionError, ConnectionErrorKind, Error, QueryError,
    QueryErrorKind, Result, RowParseError, RowParseErrorKind, TransactionError,
    TransactionErrorKind, TypeError,
};
pub use identifiers::{is_valid_identifier, validate_identifier};
pub use metadata::{EntityMetadata, MetadataRegistry, NullPolicy};
pub use row::{ColumnInfo, FromValue, Row};
pub use value::Value;
