//! Address rank configuration and the flattened rows derived from it.

use std::fmt;
use std::marker::PhantomData;

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;

/// Search and address rank assigned to one class/type combination.
///
/// In the configuration a rank is either a single integer, used for
/// both ranks, or a `[search, address]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawRankSpec")]
pub struct RankSpec {
    pub search: i16,
    pub address: i16,
}

impl RankSpec {
    pub fn new(search: i16, address: i16) -> Self {
        Self { search, address }
    }

    pub fn uniform(rank: i16) -> Self {
        Self::new(rank, rank)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRankSpec {
    Single(i16),
    Sequence(Vec<i16>),
}

impl TryFrom<RawRankSpec> for RankSpec {
    type Error = String;

    fn try_from(raw: RawRankSpec) -> Result<Self, Self::Error> {
        match raw {
            RawRankSpec::Single(rank) => Ok(Self::uniform(rank)),
            RawRankSpec::Sequence(ranks) => match ranks.as_slice() {
                [search, address] => Ok(Self::new(*search, *address)),
                other => Err(format!(
                    "rank pair must have exactly two elements, got {}",
                    other.len()
                )),
            },
        }
    }
}

/// Ranks for the values of a single tag key, in configuration order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TagRanks(pub Vec<(String, RankSpec)>);

impl<'de> Deserialize<'de> for TagRanks {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        ordered_map(deserializer).map(TagRanks)
    }
}

/// One entry of the address level configuration.
///
/// `countries` absent or empty means the entry applies to every country
/// without a more specific entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RankConfigEntry {
    #[serde(deserialize_with = "ordered_map")]
    pub tags: Vec<(String, TagRanks)>,
    #[serde(default)]
    pub countries: Option<Vec<String>>,
}

impl RankConfigEntry {
    /// Parse a configuration document: a JSON array of entries.
    pub fn parse_all(json: &str) -> serde_json::Result<Vec<Self>> {
        serde_json::from_str(json)
    }
}

/// Flattened row of the `address_levels` table.
///
/// A `None` country is the default for all countries; a `None` type
/// matches any type of the class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressLevelRow {
    pub country_code: Option<String>,
    pub class: String,
    pub type_: Option<String>,
    pub rank_search: i16,
    pub rank_address: i16,
}

/// Deserialize a map into a vector, keeping document order.
fn ordered_map<'de, D, V>(deserializer: D) -> Result<Vec<(String, V)>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    struct OrderedMapVisitor<V>(PhantomData<V>);

    impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedMapVisitor<V> {
        type Value = Vec<(String, V)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
            while let Some((key, value)) = access.next_entry::<String, V>()? {
                entries.push((key, value));
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(OrderedMapVisitor(PhantomData))
}
