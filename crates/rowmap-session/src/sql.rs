//! SQL text for the five statement shapes a session issues.
//!
//! Identifiers are emitted unquoted; metadata derivation has already
//! checked they are plain identifiers. Parameters use `?` placeholders.

use rowmap_core::{Entity, EntityMetadata};

/// `SELECT * FROM <table>`
pub fn select_all<E: Entity>(meta: &EntityMetadata<E>) -> String {
    format!("SELECT * FROM {}", meta.table_name())
}

/// `SELECT * FROM <table> WHERE <id> = ?`
pub fn select_by_id<E: Entity>(meta: &EntityMetadata<E>) -> String {
    format!(
        "SELECT * FROM {} WHERE {} = ?",
        meta.table_name(),
        meta.identity_column()
    )
}

/// `INSERT INTO <table> (<c1>, <c2>) VALUES (?, ?)`
///
/// With no columns to bind this is `INSERT INTO <table> DEFAULT VALUES`.
pub fn insert(table: &str, columns: &[&str]) -> String {
    if columns.is_empty() {
        return format!("INSERT INTO {} DEFAULT VALUES", table);
    }
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        placeholders
    )
}

/// `UPDATE <table> SET <c1> = ?, <c2> = ? WHERE <id> = ?`
pub fn update(table: &str, columns: &[&str], identity: &str) -> String {
    let assignments = columns
        .iter()
        .map(|c| format!("{} = ?", c))
        .collect::<Vec<_>>()
        .join(", ");
    format!("UPDATE {} SET {} WHERE {} = ?", table, assignments, identity)
}

/// `DELETE FROM <table> WHERE <id> = ?`
pub fn delete(table: &str, identity: &str) -> String {
    format!("DELETE FROM {} WHERE {} = ?", table, identity)
}
