//! The `address_levels` lookup table: rank configuration flattened into rows.

use rusqlite::types::Value;
use rusqlite::Connection;
use tracing::info;

use crate::config::Settings;
use crate::db::{replace_table, Column, IndexDef, TableDef, TableRow};
use crate::error::{RefreshError, Result};
use crate::models::{AddressLevelRow, RankConfigEntry};

/// Default rank configuration shipped with the binary.
const DEFAULT_ADDRESS_LEVELS: &str = include_str!("../settings/address-levels.json");

/// Table layout, shared by every address level table regardless of name.
pub const ADDRESS_LEVELS: TableDef<'static> = TableDef {
    name: "address_levels",
    columns: &[
        Column::new("country_code", "varchar(2)"),
        Column::new("class", "TEXT"),
        Column::new("type", "TEXT"),
        Column::new("rank_search", "SMALLINT"),
        Column::new("rank_address", "SMALLINT"),
    ],
    indexes: &[IndexDef::unique(&["country_code", "class", "type"])],
};

impl TableRow for AddressLevelRow {
    fn values(&self) -> Vec<Value> {
        vec![
            self.country_code.clone().map_or(Value::Null, Value::Text),
            Value::Text(self.class.clone()),
            self.type_.clone().map_or(Value::Null, Value::Text),
            Value::Integer(self.rank_search.into()),
            Value::Integer(self.rank_address.into()),
        ]
    }
}

/// Flatten rank configuration entries into table rows.
///
/// Rows come out in entry order, then tag key, tag value and country
/// order. No deduplication happens here; duplicates are rejected when
/// the table's unique index is built.
pub fn compile_rows(entries: &[RankConfigEntry]) -> Result<Vec<AddressLevelRow>> {
    let mut rows = Vec::new();

    for entry in entries {
        let countries: Vec<Option<&str>> = match entry.countries.as_deref() {
            Some(list) if !list.is_empty() => list
                .iter()
                .map(|c| validate_country(c).map(Some))
                .collect::<Result<_>>()?,
            _ => vec![None],
        };

        for (key, values) in &entry.tags {
            for (value, ranks) in &values.0 {
                let type_ = (!value.is_empty()).then(|| value.clone());
                for country in &countries {
                    rows.push(AddressLevelRow {
                        country_code: country.map(str::to_string),
                        class: key.clone(),
                        type_: type_.clone(),
                        rank_search: ranks.search,
                        rank_address: ranks.address,
                    });
                }
            }
        }
    }

    Ok(rows)
}

fn validate_country(code: &str) -> Result<&str> {
    if code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code)
    } else {
        Err(RefreshError::Configuration(format!(
            "invalid country code '{code}' in address level configuration"
        )))
    }
}

/// Replace `table` with the rows described by `entries`.
pub fn load_address_levels(
    conn: &mut Connection,
    table: &str,
    entries: &[RankConfigEntry],
) -> Result<usize> {
    let rows = compile_rows(entries)?;
    info!("Compiled {} address level rows", rows.len());

    replace_table(conn, &ADDRESS_LEVELS.named(table), rows)
}

/// Replace the configured address level table from the configured
/// rank file, or the built-in default when none is set.
pub fn load_address_levels_from_config(conn: &mut Connection, settings: &Settings) -> Result<usize> {
    let entries = match &settings.refresh.address_level_config {
        Some(path) => {
            info!("Reading address levels from {}", path.display());
            let json = std::fs::read_to_string(path).map_err(|e| RefreshError::io(path, e))?;
            parse_entries(&json)?
        }
        None => parse_entries(DEFAULT_ADDRESS_LEVELS)?,
    };

    load_address_levels(conn, &settings.refresh.address_level_table, &entries)
}

fn parse_entries(json: &str) -> Result<Vec<RankConfigEntry>> {
    RankConfigEntry::parse_all(json)
        .map_err(|e| RefreshError::Configuration(format!("address level configuration: {e}")))
}
