//! Data models for derived-table maintenance.

pub mod place;
pub mod rank;

pub use place::{ImportanceRecord, OsmType};
pub use rank::{AddressLevelRow, RankConfigEntry, RankSpec, TagRanks};
