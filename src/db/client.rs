//! Connection helpers for the relational store.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::error::Result;

/// Open the database at `path`.
pub fn open(path: &Path) -> Result<Connection> {
    info!("Opening database {}", path.display());
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(conn)
}

/// Quote an identifier so that any table or index name is safe to splice into SQL.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Check whether a table with the given name exists.
pub fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
            [table],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}
