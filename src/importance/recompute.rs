//! Bulk recomputation of wikipedia references and importance for all places.
//!
//! Runs in two phases inside one transaction with the place table's
//! triggers suspended:
//!
//! 1. every place is rescored from its own tags;
//! 2. a place whose linked child has a wikipedia reference takes over the
//!    child's values when it has no reference or a lower importance.
//!
//! Propagation goes exactly one hop per run. This must not run while the
//! incremental update pipeline is working on the same table, as the
//! suspended triggers are what that pipeline relies on.

use std::collections::HashMap;

use indicatif::ProgressBar;
use rusqlite::{params, Connection};
use tracing::{debug, info};

use super::scorer::{ImportanceInputs, ImportanceScorer};
use crate::config::RefreshConfig;
use crate::db::{quote_ident, SuspendedTriggers};
use crate::error::{RefreshError, Result};
use crate::models::OsmType;

/// Counts reported by a recomputation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecomputeStats {
    pub rescored: usize,
    pub propagated: usize,
}

/// Recomputes importance for every row of a place table.
pub struct ImportanceRecomputer {
    table: String,
    batch_size: usize,
    progress: ProgressBar,
}

/// Place row as stored, before interpretation.
struct StoredPlace {
    place_id: i64,
    extratags: Option<String>,
    country_code: Option<String>,
    osm_type: Option<String>,
    osm_id: i64,
}

impl StoredPlace {
    fn into_inputs(self) -> Result<ImportanceInputs> {
        let invalid = |message: String| RefreshError::InvalidRecord {
            place_id: self.place_id,
            message,
        };

        let osm_type = self
            .osm_type
            .as_deref()
            .and_then(OsmType::from_code)
            .ok_or_else(|| invalid(format!("unknown osm_type {:?}", self.osm_type)))?;

        let extratags = match self.extratags.as_deref() {
            None | Some("") => HashMap::new(),
            Some(json) => serde_json::from_str(json)
                .map_err(|e| invalid(format!("extratags are not a string map: {e}")))?,
        };

        Ok(ImportanceInputs {
            place_id: self.place_id,
            extratags,
            country_code: self.country_code,
            osm_type,
            osm_id: self.osm_id,
        })
    }
}

impl ImportanceRecomputer {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            batch_size: 10_000,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn from_config(config: &RefreshConfig) -> Self {
        Self::new(config.place_table.clone()).with_batch_size(config.batch_size)
    }

    /// Number of places read per round trip while rescoring.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Rescore all places and propagate from linked places, committing
    /// both phases together. On error nothing changes, triggers included.
    pub fn run(&self, conn: &mut Connection, scorer: &dyn ImportanceScorer) -> Result<RecomputeStats> {
        info!("Recomputing importance for {}", self.table);

        let result = self.recompute(conn, scorer);
        self.progress.finish_and_clear();
        let (rescored, propagated) = result?;

        info!(
            "Importance recomputed: {} places rescored, {} updated from linked places",
            rescored, propagated
        );
        Ok(RecomputeStats {
            rescored,
            propagated,
        })
    }

    fn recompute(&self, conn: &mut Connection, scorer: &dyn ImportanceScorer) -> Result<(usize, usize)> {
        let tx = conn.transaction()?;
        let triggers = SuspendedTriggers::suspend(&tx, &self.table)?;

        let rescored = self.rescore(&tx, scorer)?;
        let propagated = self.propagate(&tx)?;

        triggers.restore()?;
        tx.commit()?;
        Ok((rescored, propagated))
    }

    fn rescore(&self, conn: &Connection, scorer: &dyn ImportanceScorer) -> Result<usize> {
        let table = quote_ident(&self.table);

        let total: i64 = conn.query_row(&format!("SELECT count(*) FROM {table}"), [], |row| {
            row.get(0)
        })?;
        self.progress.set_length(total.max(0) as u64);

        let select = format!(
            "SELECT place_id, extratags, country_code, osm_type, osm_id FROM {table}
             WHERE place_id > ?1 ORDER BY place_id LIMIT ?2"
        );
        let update = format!("UPDATE {table} SET wikipedia = ?1, importance = ?2 WHERE place_id = ?3");

        let mut rescored = 0;
        let mut last_id = i64::MIN;
        loop {
            let batch = {
                let mut stmt = conn.prepare_cached(&select)?;
                let rows = stmt.query_map(params![last_id, self.batch_size as i64], |row| {
                    Ok(StoredPlace {
                        place_id: row.get(0)?,
                        extratags: row.get(1)?,
                        country_code: row.get(2)?,
                        osm_type: row.get(3)?,
                        osm_id: row.get(4)?,
                    })
                })?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };
            let Some(last) = batch.last() else {
                break;
            };
            last_id = last.place_id;
            let batch_len = batch.len();

            let mut stmt = conn.prepare_cached(&update)?;
            for place in batch {
                let inputs = place.into_inputs()?;
                let score = scorer.score(conn, &inputs)?;
                stmt.execute(params![score.wikipedia, score.importance, inputs.place_id])?;
            }

            rescored += batch_len;
            self.progress.inc(batch_len as u64);
            debug!("Rescored {} places up to place_id {}", rescored, last_id);
        }

        Ok(rescored)
    }

    fn propagate(&self, conn: &Connection) -> Result<usize> {
        let table = quote_ident(&self.table);

        // All candidates are read before anything is written, so values
        // move one link at a time.
        let mut candidates: Vec<(i64, String, Option<f64>)> = {
            let mut stmt = conn.prepare(&format!(
                "SELECT s.place_id, d.wikipedia, d.importance
                 FROM {table} s JOIN {table} d ON s.place_id = d.linked_place_id
                 WHERE d.wikipedia IS NOT NULL
                   AND (s.wikipedia IS NULL OR s.importance < d.importance)
                 ORDER BY s.place_id, d.importance DESC, d.place_id"
            ))?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
            rows.collect::<rusqlite::Result<_>>()?
        };
        // Best child per parent.
        candidates.dedup_by_key(|(parent_id, _, _)| *parent_id);

        let mut stmt = conn.prepare(&format!(
            "UPDATE {table} SET wikipedia = ?1, importance = ?2 WHERE place_id = ?3"
        ))?;
        for (parent_id, wikipedia, importance) in &candidates {
            stmt.execute(params![wikipedia, importance, parent_id])?;
        }

        Ok(candidates.len())
    }
}
