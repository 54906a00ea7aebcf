//! Wholesale replacement of small reference tables.
//!
//! A table is never patched: it is dropped, recreated, bulk loaded and
//! indexed inside one transaction. Readers outside the transaction see
//! either the old table or the complete new one.

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use tracing::{debug, info};

use super::quote_ident;
use crate::error::{RefreshError, Result};

/// Column of a reference table.
#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: &'static str,
}

impl Column {
    pub const fn new(name: &'static str, sql_type: &'static str) -> Self {
        Self { name, sql_type }
    }
}

/// Index built after the rows are loaded.
///
/// For a unique index, NULL key parts compare equal: two rows that differ
/// only in which parts are NULL are still duplicates.
#[derive(Debug, Clone, Copy)]
pub struct IndexDef {
    pub columns: &'static [&'static str],
    pub unique: bool,
}

impl IndexDef {
    pub const fn unique(columns: &'static [&'static str]) -> Self {
        Self { columns, unique: true }
    }

    pub const fn plain(columns: &'static [&'static str]) -> Self {
        Self { columns, unique: false }
    }
}

/// Shape of a reference table.
#[derive(Debug, Clone, Copy)]
pub struct TableDef<'a> {
    pub name: &'a str,
    pub columns: &'static [Column],
    pub indexes: &'static [IndexDef],
}

impl TableDef<'_> {
    /// Same shape under another table name.
    pub fn named<'b>(&self, name: &'b str) -> TableDef<'b> {
        TableDef {
            name,
            columns: self.columns,
            indexes: self.indexes,
        }
    }
}

/// A row that can be inserted into a reference table, values in column order.
pub trait TableRow {
    fn values(&self) -> Vec<Value>;
}

/// Replace the contents of `table` with `rows` in a transaction of its own.
///
/// Returns the number of rows loaded. On error nothing is committed and
/// the previous table is left as it was.
pub fn replace_table<I>(conn: &mut Connection, table: &TableDef<'_>, rows: I) -> Result<usize>
where
    I: IntoIterator,
    I::Item: TableRow,
{
    let tx = conn.transaction()?;
    let count = replace_table_in(&tx, table, rows)?;
    tx.commit()?;

    info!("Replaced table {} with {} rows", table.name, count);
    Ok(count)
}

/// Replace the contents of `table` inside the caller's transaction.
pub fn replace_table_in<I>(conn: &Connection, table: &TableDef<'_>, rows: I) -> Result<usize>
where
    I: IntoIterator,
    I::Item: TableRow,
{
    let name = quote_ident(table.name);

    conn.execute(&format!("DROP TABLE IF EXISTS {name}"), [])?;

    let columns = table
        .columns
        .iter()
        .map(|c| format!("{} {}", quote_ident(c.name), c.sql_type))
        .collect::<Vec<_>>()
        .join(", ");
    conn.execute(&format!("CREATE TABLE {name} ({columns})"), [])?;

    let width = table.columns.len();
    let placeholders = (1..=width)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");

    let mut count = 0;
    {
        let mut insert = conn.prepare(&format!("INSERT INTO {name} VALUES ({placeholders})"))?;
        for row in rows {
            let values = row.values();
            if values.len() != width {
                return Err(RefreshError::Configuration(format!(
                    "row for table {} has {} values, expected {}",
                    table.name,
                    values.len(),
                    width
                )));
            }
            insert.execute(params_from_iter(values))?;
            count += 1;
        }
    }
    debug!("Loaded {} rows into {}", count, table.name);

    // Index only after the load so rows are validated once, in bulk.
    for index in table.indexes {
        create_index(conn, table.name, index)?;
    }

    Ok(count)
}

fn create_index(conn: &Connection, table: &str, index: &IndexDef) -> Result<()> {
    let index_name = quote_ident(&format!("{}_{}_idx", table, index.columns.join("_")));
    let keys = index
        .columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");

    if index.unique {
        check_duplicates(conn, table, &keys)?;
    }

    let sql = format!(
        "CREATE {}INDEX {} ON {} ({})",
        if index.unique { "UNIQUE " } else { "" },
        index_name,
        quote_ident(table),
        keys
    );

    conn.execute(&sql, [])
        .map_err(|e| RefreshError::from_index_build(table, e))?;
    Ok(())
}

/// Reject keys that occur more than once. GROUP BY puts NULLs in one
/// group, which the unique index alone would not.
fn check_duplicates(conn: &Connection, table: &str, keys: &str) -> Result<()> {
    let duplicates: i64 = conn.query_row(
        &format!(
            "SELECT count(*) FROM (SELECT 1 FROM {} GROUP BY {} HAVING count(*) > 1)",
            quote_ident(table),
            keys
        ),
        [],
        |row| row.get(0),
    )?;

    if duplicates > 0 {
        return Err(RefreshError::ConstraintViolation {
            table: table.to_string(),
            message: format!("{duplicates} keys on ({keys}) occur more than once"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::table_exists;

    const PAIRS: TableDef<'static> = TableDef {
        name: "pairs",
        columns: &[Column::new("key", "TEXT"), Column::new("value", "INTEGER")],
        indexes: &[IndexDef::unique(&["key"])],
    };

    struct Pair(Option<&'static str>, i64);

    impl TableRow for Pair {
        fn values(&self) -> Vec<Value> {
            vec![
                self.0.map_or(Value::Null, |k| Value::Text(k.to_string())),
                Value::Integer(self.1),
            ]
        }
    }

    fn contents(conn: &Connection) -> Vec<(Option<String>, i64)> {
        let mut stmt = conn
            .prepare("SELECT key, value FROM pairs ORDER BY value")
            .unwrap();
        stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_second_replace_leaves_no_residue() {
        let mut conn = Connection::open_in_memory().unwrap();

        let loaded = replace_table(&mut conn, &PAIRS, vec![Pair(Some("a"), 1), Pair(Some("b"), 2)])
            .unwrap();
        assert_eq!(loaded, 2);

        replace_table(&mut conn, &PAIRS, vec![Pair(Some("c"), 3)]).unwrap();
        assert_eq!(contents(&conn), vec![(Some("c".to_string()), 3)]);
    }

    #[test]
    fn test_duplicate_key_fails_and_keeps_old_table() {
        let mut conn = Connection::open_in_memory().unwrap();
        replace_table(&mut conn, &PAIRS, vec![Pair(Some("a"), 1)]).unwrap();

        let err = replace_table(&mut conn, &PAIRS, vec![Pair(Some("x"), 1), Pair(Some("x"), 2)])
            .unwrap_err();
        assert!(matches!(err, RefreshError::ConstraintViolation { .. }));

        assert_eq!(contents(&conn), vec![(Some("a".to_string()), 1)]);
    }

    #[test]
    fn test_null_keys_collide() {
        let mut conn = Connection::open_in_memory().unwrap();
        let err = replace_table(&mut conn, &PAIRS, vec![Pair(None, 1), Pair(None, 2)]).unwrap_err();
        assert!(matches!(err, RefreshError::ConstraintViolation { .. }));
        assert!(!table_exists(&conn, "pairs").unwrap());
    }

    #[test]
    fn test_index_exists_after_load() {
        let mut conn = Connection::open_in_memory().unwrap();
        replace_table(&mut conn, &PAIRS, Vec::<Pair>::new()).unwrap();

        let unique: bool = conn
            .query_row(
                "SELECT \"unique\" FROM pragma_index_list('pairs')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(unique);
    }

    #[test]
    fn test_unique_index_is_on_plain_columns() {
        let mut conn = Connection::open_in_memory().unwrap();
        replace_table(&mut conn, &PAIRS, vec![Pair(None, 1), Pair(Some("a"), 2)]).unwrap();

        let mut stmt = conn
            .prepare("SELECT name FROM pragma_index_info('pairs_key_idx')")
            .unwrap();
        let columns = stmt
            .query_map([], |row| row.get::<_, Option<String>>(0))
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap();
        assert_eq!(columns, vec![Some("key".to_string())]);
    }

    #[test]
    fn test_empty_string_and_null_keys_are_distinct() {
        let mut conn = Connection::open_in_memory().unwrap();
        let loaded =
            replace_table(&mut conn, &PAIRS, vec![Pair(None, 1), Pair(Some(""), 2)]).unwrap();
        assert_eq!(loaded, 2);
    }

    #[test]
    fn test_every_index_is_built() {
        const TAGGED: TableDef<'static> = TableDef {
            name: "tagged",
            columns: &[Column::new("key", "TEXT"), Column::new("value", "INTEGER")],
            indexes: &[IndexDef::unique(&["key"]), IndexDef::plain(&["value"])],
        };

        let mut conn = Connection::open_in_memory().unwrap();
        replace_table(&mut conn, &TAGGED, vec![Pair(Some("a"), 1), Pair(Some("b"), 1)]).unwrap();

        let mut stmt = conn
            .prepare("SELECT name, \"unique\" FROM pragma_index_list('tagged') ORDER BY name")
            .unwrap();
        let indexes = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?)))
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap();
        assert_eq!(
            indexes,
            vec![
                ("tagged_key_idx".to_string(), true),
                ("tagged_value_idx".to_string(), false),
            ]
        );
    }

    #[test]
    fn test_row_width_mismatch_is_rejected() {
        struct Short;
        impl TableRow for Short {
            fn values(&self) -> Vec<Value> {
                vec![Value::Null]
            }
        }

        let mut conn = Connection::open_in_memory().unwrap();
        let err = replace_table(&mut conn, &PAIRS, vec![Short]).unwrap_err();
        assert!(matches!(err, RefreshError::Configuration(_)));
    }

    #[test]
    fn test_renamed_table() {
        let mut conn = Connection::open_in_memory().unwrap();
        replace_table(&mut conn, &PAIRS.named("other pairs"), vec![Pair(Some("a"), 1)]).unwrap();
        assert!(table_exists(&conn, "other pairs").unwrap());
        assert!(!table_exists(&conn, "pairs").unwrap());
    }
}
