//! Cypress Refresh - maintenance of derived geocoding tables
//!
//! Rebuilds the `address_levels` rank lookup table from configuration,
//! swaps in new wikipedia importance reference data, and recomputes
//! per-place importance including propagation from linked places.

pub mod address_levels;
pub mod config;
pub mod db;
pub mod error;
pub mod importance;
pub mod models;

pub use address_levels::{compile_rows, load_address_levels, load_address_levels_from_config};
pub use config::Settings;
pub use error::{RefreshError, Result};
pub use importance::{import_wikipedia_articles, ErrorPolicy, ImportanceRecomputer, SwapOutcome};
pub use models::{AddressLevelRow, ImportanceRecord, OsmType, RankConfigEntry, RankSpec};
