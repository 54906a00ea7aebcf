//! Place record fields touched by importance maintenance.

use rusqlite::{Connection, OptionalExtension};

use crate::db::quote_ident;
use crate::error::Result;

/// Type of OSM object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsmType {
    Node,
    Way,
    Relation,
}

impl OsmType {
    /// Parse the single-letter code stored in the place table.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "N" => Some(OsmType::Node),
            "W" => Some(OsmType::Way),
            "R" => Some(OsmType::Relation),
            _ => None,
        }
    }

    pub fn code(&self) -> char {
        match self {
            OsmType::Node => 'N',
            OsmType::Way => 'W',
            OsmType::Relation => 'R',
        }
    }
}

impl std::fmt::Display for OsmType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OsmType::Node => write!(f, "node"),
            OsmType::Way => write!(f, "way"),
            OsmType::Relation => write!(f, "relation"),
        }
    }
}

/// Importance-related columns of one place row.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportanceRecord {
    pub place_id: i64,
    /// External reference in `lang:Title` form
    pub wikipedia: Option<String>,
    pub importance: Option<f64>,
    pub linked_place_id: Option<i64>,
}

impl ImportanceRecord {
    /// Read the record for `place_id` from `table`.
    pub fn fetch(conn: &Connection, table: &str, place_id: i64) -> Result<Option<Self>> {
        let sql = format!(
            "SELECT place_id, wikipedia, importance, linked_place_id FROM {} WHERE place_id = ?1",
            quote_ident(table)
        );
        let record = conn
            .query_row(&sql, [place_id], |row| {
                Ok(Self {
                    place_id: row.get(0)?,
                    wikipedia: row.get(1)?,
                    importance: row.get(2)?,
                    linked_place_id: row.get(3)?,
                })
            })
            .optional()?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_osm_type_codes() {
        for osm_type in [OsmType::Node, OsmType::Way, OsmType::Relation] {
            let code = osm_type.code().to_string();
            assert_eq!(OsmType::from_code(&code), Some(osm_type));
        }
        assert_eq!(OsmType::from_code("X"), None);
        assert_eq!(OsmType::Relation.to_string(), "relation");
    }

    #[test]
    fn test_fetch_missing_record() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE placex (place_id INTEGER PRIMARY KEY, wikipedia TEXT,
                                  importance REAL, linked_place_id INTEGER);
             INSERT INTO placex VALUES (1, 'en:Bern', 0.5, NULL);",
        )
        .unwrap();

        let record = ImportanceRecord::fetch(&conn, "placex", 1).unwrap().unwrap();
        assert_eq!(record.wikipedia.as_deref(), Some("en:Bern"));
        assert_eq!(record.importance, Some(0.5));
        assert!(ImportanceRecord::fetch(&conn, "placex", 2).unwrap().is_none());
    }
}
