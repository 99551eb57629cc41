//! SQLite connection implementation.
//!
//! Safe wrappers around SQLite's C API implementing the [`Connection`] and
//! [`ConnectionProvider`] traits from rowmap-core.

// Casts in FFI code match C types exactly
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::result_large_err)] // Error type is defined in rowmap-core
#![allow(clippy::borrow_as_ptr)] // FFI requires raw pointers

use crate::types;
use libsqlite3_sys as ffi;
use rowmap_core::{
    ColumnInfo, Connection, ConnectionError, ConnectionErrorKind, ConnectionProvider, Error,
    IsolationLevel, QueryError, QueryErrorKind, Result, Row, TransactionError,
    TransactionErrorKind, Value,
};
use std::ffi::{CStr, CString, c_int};
use std::ptr;
use std::sync::Arc;

/// Configuration for opening SQLite connections.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Path to the database file, or ":memory:" for an in-memory database.
    pub path: String,
    pub flags: OpenFlags,
    /// Busy timeout in milliseconds. Zero disables it.
    pub busy_timeout_ms: u32,
}

/// Flags controlling how the database is opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags {
    pub read_only: bool,
    pub read_write: bool,
    /// Create the database if it doesn't exist.
    pub create: bool,
    /// Interpret the path as a `file:` URI.
    pub uri: bool,
    /// Open in serialized mode.
    pub full_mutex: bool,
}

impl OpenFlags {
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }

    /// Read-write access; the database must exist.
    pub fn read_write() -> Self {
        Self {
            read_write: true,
            ..Default::default()
        }
    }

    /// Read-write access, creating the database if needed.
    pub fn create_read_write() -> Self {
        Self {
            read_write: true,
            create: true,
            ..Default::default()
        }
    }

    fn to_sqlite_flags(self) -> c_int {
        let mut flags = 0;

        if self.read_only {
            flags |= ffi::SQLITE_OPEN_READONLY;
        }
        if self.read_write {
            flags |= ffi::SQLITE_OPEN_READWRITE;
        }
        if self.create {
            flags |= ffi::SQLITE_OPEN_CREATE;
        }
        if self.uri {
            flags |= ffi::SQLITE_OPEN_URI;
        }
        if self.full_mutex {
            flags |= ffi::SQLITE_OPEN_FULLMUTEX;
        }

        // Default to read-write if no mode specified
        if flags & (ffi::SQLITE_OPEN_READONLY | ffi::SQLITE_OPEN_READWRITE) == 0 {
            flags |= ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE;
        }

        flags
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            flags: OpenFlags::create_read_write(),
            busy_timeout_ms: 5000,
        }
    }
}

impl SqliteConfig {
    /// Config for a file-based database.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Config for a private in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }
}

/// A connection to a SQLite database.
///
/// Owned by one session at a time; every operation takes `&mut self`.
pub struct SqliteConnection {
    db: *mut ffi::sqlite3,
    path: String,
    in_transaction: bool,
}

// SAFETY: the handle is only reached through `&mut self`, so it is never used
// from two threads at once, and the bundled SQLite is built thread-safe.
unsafe impl Send for SqliteConnection {}

impl SqliteConnection {
    /// Open a new SQLite connection with the given configuration.
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        let c_path = CString::new(config.path.as_str()).map_err(|_| {
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: "Invalid path: contains null byte".to_string(),
                source: None,
            })
        })?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let flags = config.flags.to_sqlite_flags();

        // SAFETY: We pass valid pointers and check the return value
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };

        if rc != ffi::SQLITE_OK {
            let msg = if db.is_null() {
                types::error_string(rc)
            } else {
                // SAFETY: db is valid even on failure and must still be closed
                unsafe {
                    let msg = errmsg(db);
                    ffi::sqlite3_close(db);
                    msg
                }
            };

            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: format!("Failed to open database {}: {}", config.path, msg),
                source: None,
            }));
        }

        if config.busy_timeout_ms > 0 {
            // SAFETY: db is valid
            unsafe {
                ffi::sqlite3_busy_timeout(db, config.busy_timeout_ms as c_int);
            }
        }

        tracing::debug!(path = %config.path, "Opened SQLite connection");
        Ok(Self {
            db,
            path: config.path.clone(),
            in_transaction: false,
        })
    }

    /// Open a private in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::open(&SqliteConfig::memory())
    }

    pub fn open_file(path: impl Into<String>) -> Result<Self> {
        Self::open(&SqliteConfig::file(path))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Execute one or more statements without parameters (DDL, pragmas).
    pub fn execute_raw(&mut self, sql: &str) -> Result<()> {
        let c_sql = CString::new(sql).map_err(|_| null_byte_error(sql))?;
        let mut message: *mut std::ffi::c_char = ptr::null_mut();

        // SAFETY: All pointers are valid
        let rc = unsafe {
            ffi::sqlite3_exec(self.db, c_sql.as_ptr(), None, ptr::null_mut(), &mut message)
        };

        if rc != ffi::SQLITE_OK {
            let msg = if message.is_null() {
                types::error_string(rc)
            } else {
                // SAFETY: message was allocated by SQLite and is freed once
                unsafe {
                    let msg = CStr::from_ptr(message).to_string_lossy().into_owned();
                    ffi::sqlite3_free(message.cast());
                    msg
                }
            };

            return Err(Error::Query(QueryError {
                kind: error_code_to_kind(rc),
                sql: Some(sql.to_string()),
                message: msg,
                source: None,
            }));
        }

        Ok(())
    }

    /// Rowid of the most recent successful INSERT.
    pub fn last_insert_rowid(&self) -> i64 {
        // SAFETY: db is valid
        unsafe { ffi::sqlite3_last_insert_rowid(self.db) }
    }

    /// Prepare `sql` and bind `params` positionally.
    fn prepare(&mut self, sql: &str, params: &[Value]) -> Result<Statement> {
        let c_sql = CString::new(sql).map_err(|_| null_byte_error(sql))?;
        let mut raw: *mut ffi::sqlite3_stmt = ptr::null_mut();

        // SAFETY: All pointers are valid
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(
                self.db,
                c_sql.as_ptr(),
                c_sql.as_bytes().len() as c_int,
                &mut raw,
                ptr::null_mut(),
            )
        };
        if rc != ffi::SQLITE_OK {
            return Err(self.last_error(sql));
        }
        let stmt = Statement { raw };

        for (i, param) in params.iter().enumerate() {
            // SAFETY: stmt is valid, index is 1-based
            let rc = unsafe { types::bind_value(stmt.raw, (i + 1) as c_int, param) };
            if rc != ffi::SQLITE_OK {
                return Err(Error::Query(QueryError {
                    kind: QueryErrorKind::Database,
                    sql: Some(sql.to_string()),
                    // SAFETY: db is valid
                    message: format!("Failed to bind parameter {}: {}", i + 1, unsafe {
                        errmsg(self.db)
                    }),
                    source: None,
                }));
            }
        }

        Ok(stmt)
    }

    fn last_error(&self, sql: &str) -> Error {
        // SAFETY: db is valid
        let (code, msg) = unsafe { (ffi::sqlite3_errcode(self.db), errmsg(self.db)) };
        Error::Query(QueryError {
            kind: error_code_to_kind(code),
            sql: Some(sql.to_string()),
            message: msg,
            source: None,
        })
    }

    fn transaction_sql(&mut self, sql: &str, kind: TransactionErrorKind) -> Result<()> {
        self.execute_raw(sql).map_err(|e| {
            Error::Transaction(TransactionError {
                kind,
                message: format!("{sql} failed"),
                source: Some(Box::new(e)),
            })
        })
    }

    fn require_transaction(&self, kind: TransactionErrorKind) -> Result<()> {
        if self.in_transaction {
            Ok(())
        } else {
            Err(Error::Transaction(TransactionError {
                kind,
                message: "Not in a transaction".to_string(),
                source: None,
            }))
        }
    }
}

impl Connection for SqliteConnection {
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let stmt = self.prepare(sql, params)?;

        // SAFETY: stmt is valid
        let col_count = unsafe { ffi::sqlite3_column_count(stmt.raw) };
        let col_names = (0..col_count)
            // SAFETY: stmt is valid, i < col_count
            .map(|i| unsafe { types::column_name(stmt.raw, i) }.unwrap_or_else(|| format!("col{i}")))
            .collect();
        let columns = Arc::new(ColumnInfo::new(col_names));

        let mut rows = Vec::new();
        loop {
            // SAFETY: stmt is valid
            match unsafe { ffi::sqlite3_step(stmt.raw) } {
                ffi::SQLITE_ROW => {
                    let values = (0..col_count)
                        // SAFETY: stmt just returned SQLITE_ROW
                        .map(|i| unsafe { types::read_column(stmt.raw, i) })
                        .collect();
                    rows.push(Row::with_columns(Arc::clone(&columns), values));
                }
                ffi::SQLITE_DONE => break,
                _ => return Err(self.last_error(sql)),
            }
        }

        tracing::trace!(sql, rows = rows.len(), "SQLite query complete");
        Ok(rows)
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        let stmt = self.prepare(sql, params)?;

        // SAFETY: stmt is valid
        let rc = unsafe { ffi::sqlite3_step(stmt.raw) };
        drop(stmt);

        match rc {
            ffi::SQLITE_DONE | ffi::SQLITE_ROW => {
                // SAFETY: db is valid
                let changes = unsafe { ffi::sqlite3_changes(self.db) };
                tracing::trace!(sql, changes, "SQLite statement complete");
                Ok(changes as u64)
            }
            _ => Err(self.last_error(sql)),
        }
    }

    fn begin(&mut self, isolation: IsolationLevel) -> Result<()> {
        if self.in_transaction {
            return Err(Error::Transaction(TransactionError {
                kind: TransactionErrorKind::Begin,
                message: "Already in a transaction".to_string(),
                source: None,
            }));
        }

        // SQLite has no isolation levels; approximate with locking modes
        let begin_sql = match isolation {
            IsolationLevel::Serializable => "BEGIN EXCLUSIVE",
            IsolationLevel::RepeatableRead => "BEGIN IMMEDIATE",
            // Defer the write lock to the first write so readers can coexist
            IsolationLevel::ReadCommitted | IsolationLevel::ReadUncommitted => "BEGIN DEFERRED",
        };

        self.transaction_sql(begin_sql, TransactionErrorKind::Begin)?;
        self.in_transaction = true;
        tracing::debug!(sql = begin_sql, "SQLite transaction started");
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.require_transaction(TransactionErrorKind::Commit)?;
        // A failed COMMIT leaves the transaction open for a rollback.
        self.transaction_sql("COMMIT", TransactionErrorKind::Commit)?;
        self.in_transaction = false;
        tracing::debug!("SQLite transaction committed");
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.require_transaction(TransactionErrorKind::Rollback)?;
        self.in_transaction = false;
        self.transaction_sql("ROLLBACK", TransactionErrorKind::Rollback)?;
        tracing::debug!("SQLite transaction rolled back");
        Ok(())
    }

    fn close(mut self) -> Result<()> {
        let db = std::mem::replace(&mut self.db, ptr::null_mut());
        if db.is_null() {
            return Ok(());
        }
        if self.in_transaction {
            tracing::warn!(path = %self.path, "Closing SQLite connection with an open transaction");
        }

        // SAFETY: db is valid and every statement has been finalized
        let rc = unsafe { ffi::sqlite3_close(db) };
        if rc != ffi::SQLITE_OK {
            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Close,
                message: format!("Failed to close database: {}", types::error_string(rc)),
                source: None,
            }));
        }
        tracing::debug!(path = %self.path, "Closed SQLite connection");
        Ok(())
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        if !self.db.is_null() {
            // SAFETY: db is valid and not used after this
            unsafe {
                ffi::sqlite3_close(self.db);
            }
            self.db = ptr::null_mut();
        }
    }
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("path", &self.path)
            .field("in_transaction", &self.in_transaction)
            .finish_non_exhaustive()
    }
}

/// Opens a fresh [`SqliteConnection`] per session.
#[derive(Debug, Clone, Default)]
pub struct SqliteProvider {
    config: SqliteConfig,
}

impl SqliteProvider {
    pub fn new(config: SqliteConfig) -> Self {
        Self { config }
    }

    pub fn file(path: impl Into<String>) -> Self {
        Self::new(SqliteConfig::file(path))
    }

    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }
}

impl ConnectionProvider for SqliteProvider {
    type Connection = SqliteConnection;

    fn connect(&self) -> Result<SqliteConnection> {
        SqliteConnection::open(&self.config)
    }
}

/// A prepared statement, finalized on drop.
struct Statement {
    raw: *mut ffi::sqlite3_stmt,
}

impl Drop for Statement {
    fn drop(&mut self) {
        // SAFETY: raw came from sqlite3_prepare_v2 and is finalized once
        unsafe {
            ffi::sqlite3_finalize(self.raw);
        }
    }
}

/// # Safety
/// `db` must be a valid connection handle.
unsafe fn errmsg(db: *mut ffi::sqlite3) -> String {
    // SAFETY: caller guarantees db; errmsg returns a valid C string
    unsafe { CStr::from_ptr(ffi::sqlite3_errmsg(db)) }
        .to_string_lossy()
        .into_owned()
}

fn null_byte_error(sql: &str) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Syntax,
        sql: Some(sql.to_string()),
        message: "SQL contains null byte".to_string(),
        source: None,
    })
}

fn error_code_to_kind(code: c_int) -> QueryErrorKind {
    // Extended codes carry the primary code in the low byte
    match code & 0xff {
        ffi::SQLITE_CONSTRAINT => QueryErrorKind::Constraint,
        ffi::SQLITE_BUSY | ffi::SQLITE_LOCKED => QueryErrorKind::Busy,
        ffi::SQLITE_PERM | ffi::SQLITE_AUTH | ffi::SQLITE_READONLY => QueryErrorKind::Permission,
        ffi::SQLITE_NOTFOUND => QueryErrorKind::NotFound,
        _ => QueryErrorKind::Database,
    }
}
