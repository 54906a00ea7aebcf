//! Temporary suspension of per-row triggers during bulk maintenance.
//!
//! SQLite cannot disable a trigger, so the triggers of the table are
//! dropped and later recreated from their stored definitions. This must
//! happen inside a transaction: a rollback brings the triggers back even
//! if the restore itself never ran.

use rusqlite::Connection;
use tracing::{debug, warn};

use super::quote_ident;
use crate::error::Result;

/// Triggers of one table, suspended until [`SuspendedTriggers::restore`]
/// is called or the guard is dropped.
pub struct SuspendedTriggers<'c> {
    conn: &'c Connection,
    table: String,
    saved: Vec<(String, String)>,
    restored: bool,
}

impl<'c> SuspendedTriggers<'c> {
    /// Drop every trigger defined on `table`, remembering its definition.
    pub fn suspend(conn: &'c Connection, table: &str) -> Result<Self> {
        let saved = {
            let mut stmt = conn.prepare(
                "SELECT name, sql FROM sqlite_master
                 WHERE type = 'trigger' AND tbl_name = ?1 COLLATE NOCASE
                 ORDER BY name",
            )?;
            let rows = stmt.query_map([table], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect::<rusqlite::Result<Vec<(String, String)>>>()?
        };

        for (name, _) in &saved {
            conn.execute(&format!("DROP TRIGGER {}", quote_ident(name)), [])?;
        }
        debug!("Suspended {} triggers on {}", saved.len(), table);

        Ok(Self {
            conn,
            table: table.to_string(),
            saved,
            restored: false,
        })
    }

    pub fn len(&self) -> usize {
        self.saved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.saved.is_empty()
    }

    /// Recreate the suspended triggers.
    pub fn restore(mut self) -> Result<()> {
        self.restore_saved()
    }

    fn restore_saved(&mut self) -> Result<()> {
        if self.restored {
            return Ok(());
        }
        self.restored = true;

        for (_, sql) in &self.saved {
            self.conn.execute_batch(sql)?;
        }
        debug!("Restored {} triggers on {}", self.saved.len(), self.table);
        Ok(())
    }
}

impl Drop for SuspendedTriggers<'_> {
    fn drop(&mut self) {
        if !self.restored {
            if let Err(e) = self.restore_saved() {
                warn!(
                    "Could not restore triggers on {}, relying on rollback: {}",
                    self.table, e
                );
            }
        }
    }
}
