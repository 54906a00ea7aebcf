use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{RefreshError, Result};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub refresh: RefreshConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("cypress.sqlite"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RefreshConfig {
    /// JSON rank configuration; the built-in default is used when unset
    pub address_level_config: Option<PathBuf>,
    pub address_level_table: String,
    /// Directory holding the wikimedia importance dump
    pub data_path: PathBuf,
    pub place_table: String,
    pub batch_size: usize,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            address_level_config: None,
            address_level_table: "address_levels".to_string(),
            data_path: PathBuf::from("."),
            place_table: "placex".to_string(),
            batch_size: 10_000,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file. Relative paths are taken relative
    /// to the directory of the file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| RefreshError::io(path, e))?;
        let mut settings: Settings = toml::from_str(&content).map_err(|e| {
            RefreshError::Configuration(format!("failed to parse {}: {}", path.display(), e))
        })?;

        if settings.refresh.batch_size == 0 {
            return Err(RefreshError::Configuration(
                "refresh.batch_size must be positive".to_string(),
            ));
        }

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        settings.resolve_paths(base);
        Ok(settings)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &Path| {
            if p.is_relative() {
                base.join(p)
            } else {
                p.to_path_buf()
            }
        };

        self.database.path = resolve(&self.database.path);
        self.refresh.data_path = resolve(&self.refresh.data_path);
        if let Some(levels) = &self.refresh.address_level_config {
            self.refresh.address_level_config = Some(resolve(levels));
        }
    }
}
