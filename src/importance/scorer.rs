//! Scoring of a single place from its tags and the wikipedia reference tables.

use std::collections::HashMap;

use rusqlite::{Connection, OptionalExtension};
use tracing::warn;

use crate::db::table_exists;
use crate::error::Result;
use crate::models::OsmType;

/// Fields a scorer may use to derive the importance of a place.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportanceInputs {
    pub place_id: i64,
    pub extratags: HashMap<String, String>,
    pub country_code: Option<String>,
    pub osm_type: OsmType,
    pub osm_id: i64,
}

/// Result of scoring one place.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImportanceScore {
    /// Wikipedia reference in `lang:Title` form
    pub wikipedia: Option<String>,
    pub importance: Option<f64>,
}

/// Computes `(wikipedia, importance)` for a place.
///
/// Implementations must be pure with respect to the place table: they
/// may read other tables through `conn` but must not write.
pub trait ImportanceScorer {
    fn score(&self, conn: &Connection, place: &ImportanceInputs) -> Result<ImportanceScore>;
}

/// Default scorer backed by `wikipedia_article` and `wikipedia_redirect`.
#[derive(Debug, Clone)]
pub struct WikipediaArticleScorer {
    available: bool,
}

impl WikipediaArticleScorer {
    /// Create a scorer for `conn`. Without the reference tables every
    /// place scores empty.
    pub fn for_connection(conn: &Connection) -> Result<Self> {
        let available = table_exists(conn, "wikipedia_article")?
            && table_exists(conn, "wikipedia_redirect")?;
        if !available {
            warn!("Wikipedia importance tables missing. All importance values will be cleared.");
        }
        Ok(Self { available })
    }

    fn lookup_article(conn: &Connection, language: &str, title: &str) -> Result<Option<ImportanceScore>> {
        let direct: Option<Option<f64>> = conn
            .prepare_cached(
                "SELECT importance FROM wikipedia_article WHERE language = ?1 AND title = ?2",
            )?
            .query_row([language, title], |row| row.get(0))
            .optional()?;
        if let Some(importance) = direct {
            return Ok(Some(ImportanceScore {
                wikipedia: Some(format!("{language}:{title}")),
                importance,
            }));
        }

        let redirected: Option<(String, Option<f64>)> = conn
            .prepare_cached(
                "SELECT a.title, a.importance
                 FROM wikipedia_redirect r
                 JOIN wikipedia_article a ON a.language = r.language AND a.title = r.to_title
                 WHERE r.language = ?1 AND r.from_title = ?2",
            )?
            .query_row([language, title], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;

        Ok(redirected.map(|(target, importance)| ImportanceScore {
            wikipedia: Some(format!("{language}:{target}")),
            importance,
        }))
    }

    fn lookup_wikidata(conn: &Connection, wikidata_id: &str) -> Result<Option<ImportanceScore>> {
        let found: Option<(String, String, Option<f64>)> = conn
            .prepare_cached(
                "SELECT language, title, importance FROM wikipedia_article
                 WHERE wikidata_id = ?1
                 ORDER BY language = 'en' DESC, importance DESC
                 LIMIT 1",
            )?
            .query_row([wikidata_id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .optional()?;

        Ok(found.map(|(language, title, importance)| ImportanceScore {
            wikipedia: Some(format!("{language}:{title}")),
            importance,
        }))
    }
}

impl ImportanceScorer for WikipediaArticleScorer {
    fn score(&self, conn: &Connection, place: &ImportanceInputs) -> Result<ImportanceScore> {
        if !self.available {
            return Ok(ImportanceScore::default());
        }

        for (language, title) in wikipedia_candidates(&place.extratags) {
            if let Some(score) = Self::lookup_article(conn, &language, &title)? {
                return Ok(score);
            }
        }

        if let Some(qid) = place.extratags.get("wikidata") {
            if let Some(score) = Self::lookup_wikidata(conn, qid.trim())? {
                return Ok(score);
            }
        }

        Ok(ImportanceScore::default())
    }
}

/// Wikipedia `(language, title)` references found in the tags.
///
/// The plain `wikipedia` tag comes first, followed by `wikipedia:<lang>`
/// tags in language order.
fn wikipedia_candidates(extratags: &HashMap<String, String>) -> Vec<(String, String)> {
    let mut candidates = Vec::new();

    if let Some(value) = extratags.get("wikipedia") {
        if let Some(reference) = parse_reference(value) {
            candidates.push(reference);
        }
    }

    let mut localized: Vec<(&str, &str)> = extratags
        .iter()
        .filter_map(|(k, v)| Some((k.strip_prefix("wikipedia:")?, v.as_str())))
        .filter(|(lang, _)| !lang.is_empty())
        .collect();
    localized.sort_unstable();

    for (language, title) in localized {
        let title = normalize_title(title);
        if !title.is_empty() {
            candidates.push((language.to_string(), title));
        }
    }

    candidates
}

/// Parse `lang:Title`, a bare title (taken as English) or a wikipedia URL.
fn parse_reference(value: &str) -> Option<(String, String)> {
    let value = value.trim();

    let (language, title) = if let Some(rest) = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"))
    {
        let (host, path) = rest.split_once(".wikipedia.org/wiki/")?;
        (host.to_string(), path)
    } else {
        match value.split_once(':') {
            Some((lang, title)) if is_language_code(lang) => (lang.to_string(), title),
            _ => ("en".to_string(), value),
        }
    };

    let title = normalize_title(title);
    (!title.is_empty()).then_some((language, title))
}

/// Wiki language codes: `de`, `simple`, `zh-yue`, `be-tarask`.
fn is_language_code(code: &str) -> bool {
    !code.is_empty()
        && !code.starts_with('-')
        && code.bytes().all(|b| b.is_ascii_lowercase() || b == b'-')
}

fn normalize_title(title: &str) -> String {
    title.trim().replace(' ', "_")
}
