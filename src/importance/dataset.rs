//! Replacement of the wikipedia importance reference tables from a dump.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use flate2::read::GzDecoder;
use hashbrown::HashMap;
use rusqlite::types::Value;
use rusqlite::Connection;
use tracing::{debug, error, info};

use crate::db::{replace_table_in, table_exists, Column, IndexDef, TableDef, TableRow};
use crate::error::{RefreshError, Result};

/// Dump file names looked up in the data directory, in order of preference.
pub const DATASET_FILES: &[&str] = &[
    "wikimedia-importance.sql.gz",
    "wikimedia-importance.sql",
    "wikimedia-importance.csv.gz",
    "wikimedia-importance.csv",
];

pub const WIKIPEDIA_ARTICLE: TableDef<'static> = TableDef {
    name: "wikipedia_article",
    columns: &[
        Column::new("language", "TEXT NOT NULL"),
        Column::new("title", "TEXT NOT NULL"),
        Column::new("importance", "DOUBLE PRECISION"),
        Column::new("wikidata_id", "TEXT"),
    ],
    indexes: &[
        IndexDef::unique(&["language", "title"]),
        IndexDef::plain(&["wikidata_id"]),
    ],
};

pub const WIKIPEDIA_REDIRECT: TableDef<'static> = TableDef {
    name: "wikipedia_redirect",
    columns: &[
        Column::new("language", "TEXT NOT NULL"),
        Column::new("from_title", "TEXT NOT NULL"),
        Column::new("to_title", "TEXT NOT NULL"),
    ],
    indexes: &[IndexDef::unique(&["language", "from_title"])],
};

/// What to do when a present dump fails to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Return the error to the caller.
    #[default]
    Propagate,
    /// Roll back, log the error and report [`SwapOutcome::Ignored`].
    IgnoreAndLog,
}

/// Result of a dataset swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapOutcome {
    /// The new tables are committed.
    Applied,
    /// No dump found; nothing was touched.
    Skipped,
    /// The load failed and was rolled back under [`ErrorPolicy::IgnoreAndLog`].
    Ignored { error: String },
}

impl SwapOutcome {
    /// Process exit status: 0 when the import ran, 1 when the dump is absent.
    pub fn exit_code(&self) -> i32 {
        match self {
            SwapOutcome::Applied | SwapOutcome::Ignored { .. } => 0,
            SwapOutcome::Skipped => 1,
        }
    }
}

#[derive(Debug)]
enum Dataset {
    SqlScript(PathBuf),
    Csv(PathBuf),
}

impl Dataset {
    fn locate(data_path: &Path) -> Option<Self> {
        DATASET_FILES.iter().map(|name| data_path.join(name)).find(|p| p.is_file()).map(|p| {
            if is_csv(&p) {
                Dataset::Csv(p)
            } else {
                Dataset::SqlScript(p)
            }
        })
    }

    fn path(&self) -> &Path {
        match self {
            Dataset::SqlScript(p) | Dataset::Csv(p) => p,
        }
    }
}

fn is_csv(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    name.ends_with(".csv") || name.ends_with(".csv.gz")
}

/// Replace `wikipedia_article` and `wikipedia_redirect` with the dump
/// found in `data_path`, in one transaction.
pub fn import_wikipedia_articles(
    conn: &mut Connection,
    data_path: &Path,
    policy: ErrorPolicy,
) -> Result<SwapOutcome> {
    let Some(dataset) = Dataset::locate(data_path) else {
        info!(
            "No wikimedia importance dump in {}, skipping",
            data_path.display()
        );
        return Ok(SwapOutcome::Skipped);
    };

    info!("Importing wikipedia importance from {}", dataset.path().display());

    match swap(conn, &dataset) {
        Ok(()) => {
            info!("Wikipedia importance tables replaced");
            Ok(SwapOutcome::Applied)
        }
        Err(e) => match policy {
            ErrorPolicy::Propagate => Err(e),
            ErrorPolicy::IgnoreAndLog => {
                error!(
                    "Import of {} failed, previous tables kept: {}",
                    dataset.path().display(),
                    e
                );
                Ok(SwapOutcome::Ignored {
                    error: e.to_string(),
                })
            }
        },
    }
}

fn swap(conn: &mut Connection, dataset: &Dataset) -> Result<()> {
    match dataset {
        Dataset::SqlScript(path) => {
            let script = read_text(path)?;

            let tx = conn.transaction()?;
            tx.execute_batch(
                "DROP TABLE IF EXISTS wikipedia_article;
                 DROP TABLE IF EXISTS wikipedia_redirect;",
            )?;
            tx.execute_batch(&script)?;

            for table in [WIKIPEDIA_ARTICLE.name, WIKIPEDIA_REDIRECT.name] {
                if !table_exists(&tx, table)? {
                    return Err(RefreshError::Dataset(format!(
                        "{} did not create table {}",
                        path.display(),
                        table
                    )));
                }
            }
            tx.commit()?;
        }
        Dataset::Csv(path) => {
            let (articles, redirects) = read_csv(path)?;

            let tx = conn.transaction()?;
            let article_count = replace_table_in(&tx, &WIKIPEDIA_ARTICLE, articles)?;
            let redirect_count = replace_table_in(&tx, &WIKIPEDIA_REDIRECT, redirects)?;
            tx.commit()?;

            info!(
                "Loaded {} articles and {} redirects",
                article_count, redirect_count
            );
        }
    }
    Ok(())
}

fn open_reader(path: &Path) -> Result<Box<dyn Read>> {
    let file = File::open(path).map_err(|e| RefreshError::io(path, e))?;
    let reader: Box<dyn Read> = if path.extension().map_or(false, |e| e == "gz") {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(reader)
}

fn read_text(path: &Path) -> Result<String> {
    let mut text = String::new();
    open_reader(path)?
        .read_to_string(&mut text)
        .map_err(|e| RefreshError::io(path, e))?;
    Ok(text)
}

#[derive(Debug, Clone, PartialEq)]
struct ArticleRow {
    language: String,
    title: String,
    importance: f64,
    wikidata_id: Option<String>,
}

impl TableRow for ArticleRow {
    fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.language.clone()),
            Value::Text(self.title.clone()),
            Value::Real(self.importance),
            self.wikidata_id.clone().map_or(Value::Null, Value::Text),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
struct RedirectRow {
    language: String,
    from_title: String,
    to_title: String,
}

impl TableRow for RedirectRow {
    fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.language.clone()),
            Value::Text(self.from_title.clone()),
            Value::Text(self.to_title.clone()),
        ]
    }
}

/// Read the tab separated dump.
///
/// ```text
/// language        type    title   importance      wikidata_id
/// en      a       Bern    0.7205  Q70
/// en      r       Berne   0.7205  Q70
/// ```
///
/// `a` rows are articles. `r` rows are redirects, pointed at the article
/// of the same language with the same wikidata id.
fn read_csv(path: &Path) -> Result<(Vec<ArticleRow>, Vec<RedirectRow>)> {
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(true)
        .delimiter(b'\t')
        .quoting(false)
        .from_reader(open_reader(path)?);

    let headers = csv_reader.headers()?.clone();
    let column = |name: &str| {
        headers.iter().position(|h| h == name).ok_or_else(|| {
            RefreshError::Dataset(format!("column '{}' not found in {}", name, path.display()))
        })
    };
    let language_idx = column("language")?;
    let type_idx = column("type")?;
    let title_idx = column("title")?;
    let importance_idx = column("importance")?;
    let wikidata_idx = column("wikidata_id")?;

    let mut articles = Vec::new();
    let mut pending_redirects = Vec::new();
    let mut unparsable = 0usize;

    for result in csv_reader.records() {
        let record = result?;
        let language = record[language_idx].to_string();
        let title = record[title_idx].to_string();
        let wikidata_id = Some(record[wikidata_idx].trim())
            .filter(|w| !w.is_empty())
            .map(str::to_string);

        match &record[type_idx] {
            "a" => match record[importance_idx].parse::<f64>() {
                Ok(importance) => articles.push(ArticleRow {
                    language,
                    title,
                    importance,
                    wikidata_id,
                }),
                Err(_) => unparsable += 1,
            },
            "r" => {
                if let Some(qid) = wikidata_id {
                    pending_redirects.push((language, title, qid));
                }
            }
            other => debug!("Ignoring row of unknown type '{}'", other),
        }
    }

    let mut unresolved = 0usize;
    let mut redirects = Vec::with_capacity(pending_redirects.len());
    {
        let targets: HashMap<(&str, &str), &str> = articles
            .iter()
            .filter_map(|a| {
                let qid = a.wikidata_id.as_deref()?;
                Some(((a.language.as_str(), qid), a.title.as_str()))
            })
            .collect();

        for (language, from_title, qid) in pending_redirects {
            match targets.get(&(language.as_str(), qid.as_str())) {
                Some(to_title) => redirects.push(RedirectRow {
                    to_title: to_title.to_string(),
                    language,
                    from_title,
                }),
                None => unresolved += 1,
            }
        }
    }

    if unparsable > 0 || unresolved > 0 {
        info!(
            "Skipped {} articles without importance and {} unresolved redirects",
            unparsable, unresolved
        );
    }

    Ok((articles, redirects))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn write_gz(path: &Path, content: &str) {
        let mut encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
        encoder.write_all(content.as_bytes()).unwrap();
        encoder.finish().unwrap();
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT count(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    fn seeded() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE wikipedia_article (language TEXT, title TEXT, importance REAL, wikidata_id TEXT);
             CREATE TABLE wikipedia_redirect (language TEXT, from_title TEXT, to_title TEXT);
             INSERT INTO wikipedia_article VALUES ('en', 'Old', 0.1, 'Q1');",
        )
        .unwrap();
        conn
    }

    const SCRIPT: &str = "
        CREATE TABLE wikipedia_article (language TEXT NOT NULL, title TEXT NOT NULL,
                                        importance DOUBLE PRECISION, wikidata_id TEXT);
        CREATE TABLE wikipedia_redirect (language TEXT NOT NULL, from_title TEXT NOT NULL,
                                         to_title TEXT NOT NULL);
        INSERT INTO wikipedia_article VALUES ('en', 'Bern', 0.72, 'Q70'), ('de', 'Bern', 0.61, 'Q70');
        INSERT INTO wikipedia_redirect VALUES ('en', 'Berne', 'Bern');
    ";

    #[test]
    fn test_missing_dump_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut conn = seeded();

        let outcome =
            import_wikipedia_articles(&mut conn, dir.path(), ErrorPolicy::Propagate).unwrap();

        assert_eq!(outcome, SwapOutcome::Skipped);
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(count(&conn, "wikipedia_article"), 1);
    }

    #[test]
    fn test_sql_dump_replaces_tables() {
        let dir = tempfile::tempdir().unwrap();
        write_gz(&dir.path().join("wikimedia-importance.sql.gz"), SCRIPT);
        let mut conn = seeded();

        let outcome =
            import_wikipedia_articles(&mut conn, dir.path(), ErrorPolicy::Propagate).unwrap();

        assert_eq!(outcome, SwapOutcome::Applied);
        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(count(&conn, "wikipedia_article"), 2);
        assert_eq!(count(&conn, "wikipedia_redirect"), 1);
    }

    #[test]
    fn test_broken_dump_propagates_and_keeps_tables() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("wikimedia-importance.sql"),
            "CREATE TABLE wikipedia_article (language TEXT); INSERT INTO nowhere VALUES (1);",
        )
        .unwrap();
        let mut conn = seeded();

        let err = import_wikipedia_articles(&mut conn, dir.path(), ErrorPolicy::Propagate)
            .unwrap_err();
        assert!(matches!(err, RefreshError::Execution(_)));

        assert_eq!(count(&conn, "wikipedia_article"), 1);
        assert!(table_exists(&conn, "wikipedia_redirect").unwrap());
    }

    #[test]
    fn test_broken_dump_can_be_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("wikimedia-importance.sql.gz"), "not gzip at all").unwrap();
        let mut conn = seeded();

        let outcome =
            import_wikipedia_articles(&mut conn, dir.path(), ErrorPolicy::IgnoreAndLog).unwrap();

        assert!(matches!(outcome, SwapOutcome::Ignored { .. }));
        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(count(&conn, "wikipedia_article"), 1);
    }

    #[test]
    fn test_script_must_create_both_tables() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("wikimedia-importance.sql"),
            "CREATE TABLE wikipedia_article (language TEXT, title TEXT, importance REAL, wikidata_id TEXT);",
        )
        .unwrap();
        let mut conn = seeded();

        let err = import_wikipedia_articles(&mut conn, dir.path(), ErrorPolicy::Propagate)
            .unwrap_err();
        assert!(matches!(err, RefreshError::Dataset(_)));
        assert!(table_exists(&conn, "wikipedia_redirect").unwrap());
    }

    #[test]
    fn test_csv_dump_with_redirects() {
        let dir = tempfile::tempdir().unwrap();
        write_gz(
            &dir.path().join("wikimedia-importance.csv.gz"),
            "language\ttype\ttitle\timportance\twikidata_id\n\
             en\ta\tBern\t0.72\tQ70\n\
             de\ta\tBern\t0.61\tQ70\n\
             en\tr\tBerne\t0.72\tQ70\n\
             en\tr\tNowhere\t0.1\tQ999\n\
             en\ta\t\"Quoted\"_Title\tnan?\tQ5\n",
        );
        let mut conn = seeded();

        let outcome =
            import_wikipedia_articles(&mut conn, dir.path(), ErrorPolicy::Propagate).unwrap();
        assert_eq!(outcome, SwapOutcome::Applied);

        assert_eq!(count(&conn, "wikipedia_article"), 2);
        let to_title: String = conn
            .query_row(
                "SELECT to_title FROM wikipedia_redirect WHERE language = 'en' AND from_title = 'Berne'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(to_title, "Bern");
        assert_eq!(count(&conn, "wikipedia_redirect"), 1);
    }

    #[test]
    fn test_csv_dump_indexes_wikidata_lookup() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("wikimedia-importance.csv"),
            "language\ttype\ttitle\timportance\twikidata_id\nen\ta\tBern\t0.72\tQ70\n",
        )
        .unwrap();
        let mut conn = seeded();

        import_wikipedia_articles(&mut conn, dir.path(), ErrorPolicy::Propagate).unwrap();

        let indexed: String = conn
            .query_row(
                "SELECT il.name FROM pragma_index_list('wikipedia_article') il
                 JOIN pragma_index_info(il.name) ii
                 WHERE ii.name = 'wikidata_id'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(indexed, "wikipedia_article_wikidata_id_idx");

        let plan: String = conn
            .query_row(
                "EXPLAIN QUERY PLAN SELECT title FROM wikipedia_article WHERE wikidata_id = 'Q70'",
                [],
                |row| row.get(3),
            )
            .unwrap();
        assert!(plan.contains("wikipedia_article_wikidata_id_idx"), "{plan}");
    }

    #[test]
    fn test_csv_without_required_column() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("wikimedia-importance.csv"),
            "language\ttitle\timportance\nen\tBern\t0.7\n",
        )
        .unwrap();
        let mut conn = seeded();

        let err = import_wikipedia_articles(&mut conn, dir.path(), ErrorPolicy::Propagate)
            .unwrap_err();
        assert!(matches!(err, RefreshError::Dataset(_)));
    }

    #[test]
    fn test_sql_dump_is_preferred_over_csv() {
        let dir = tempfile::tempdir().unwrap();
        write_gz(&dir.path().join("wikimedia-importance.sql.gz"), SCRIPT);
        std::fs::write(dir.path().join("wikimedia-importance.csv"), "garbage").unwrap();

        let dataset = Dataset::locate(dir.path()).unwrap();
        assert!(matches!(dataset, Dataset::SqlScript(_)));
    }
}
