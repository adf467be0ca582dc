use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Records per result page. The search API is always asked for exactly this many.
pub const PAGE_SIZE: u32 = 300;

static DATE_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(\d{4}(?:-\d{2}){0,2})\s*(?:,|/|\bto\b|\s-\s|–)\s*(\d{4}(?:-\d{2}){0,2})\s*$",
    )
    .expect("static regex")
});
static YEAR_RANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{4})$").expect("static regex"));

/// Semantic keys the translator is allowed to produce. Declaration order is the
/// order parameters appear in a search URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QueryKey {
    ScientificName,
    Locality,
    Continent,
    Country,
    StateProvince,
    RecordedBy,
    EventDate,
    RecordNumber,
    MediaType,
    Institution,
    Collection,
}

impl QueryKey {
    pub const ALL: [QueryKey; 11] = [
        QueryKey::ScientificName,
        QueryKey::Locality,
        QueryKey::Continent,
        QueryKey::Country,
        QueryKey::StateProvince,
        QueryKey::RecordedBy,
        QueryKey::EventDate,
        QueryKey::RecordNumber,
        QueryKey::MediaType,
        QueryKey::Institution,
        QueryKey::Collection,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKey::ScientificName => "scientificName",
            QueryKey::Locality => "locality",
            QueryKey::Continent => "continent",
            QueryKey::Country => "country",
            QueryKey::StateProvince => "stateProvince",
            QueryKey::RecordedBy => "recordedBy",
            QueryKey::EventDate => "eventDate",
            QueryKey::RecordNumber => "recordNumber",
            QueryKey::MediaType => "mediaType",
            QueryKey::Institution => "institution",
            QueryKey::Collection => "collection",
        }
    }

    /// Free-text name keys. They feed identifier resolution and are never
    /// sent to the search API as-is.
    pub fn is_entity_name(&self) -> bool {
        matches!(self, QueryKey::Institution | QueryKey::Collection)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryKey {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "scientificName" | "scientific_name" => Ok(QueryKey::ScientificName),
            "locality" | "location" => Ok(QueryKey::Locality),
            "continent" => Ok(QueryKey::Continent),
            "country" => Ok(QueryKey::Country),
            "stateProvince" => Ok(QueryKey::StateProvince),
            "recordedBy" => Ok(QueryKey::RecordedBy),
            "eventDate" => Ok(QueryKey::EventDate),
            "recordNumber" => Ok(QueryKey::RecordNumber),
            "mediaType" => Ok(QueryKey::MediaType),
            "institution" => Ok(QueryKey::Institution),
            "collection" => Ok(QueryKey::Collection),
            other => Err(other.to_string()),
        }
    }
}

impl Serialize for QueryKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for QueryKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value
            .parse()
            .map_err(|key| serde::de::Error::custom(format!("unrecognized query key: {key}")))
    }
}

/// Structured search fields with only recognized keys and normalized values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct QueryFields(BTreeMap<QueryKey, String>);

/// Stored fields go through the same normalization as fresh ones.
impl<'de> Deserialize<'de> for QueryFields {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<QueryKey, String>::deserialize(deserializer)?;
        let mut fields = QueryFields::new();
        for (key, value) in raw {
            fields.insert(key, &value);
        }
        Ok(fields)
    }
}

impl QueryFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a normalized value. Blank or unusable values are not stored and
    /// `false` is returned.
    pub fn insert(&mut self, key: QueryKey, value: &str) -> bool {
        match normalize_value(key, value) {
            Some(normalized) => {
                self.0.insert(key, normalized);
                true
            }
            None => {
                self.0.remove(&key);
                false
            }
        }
    }

    pub fn with(mut self, key: QueryKey, value: &str) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: QueryKey) -> Option<&str> {
        self.0.get(&key).map(String::as_str)
    }

    pub fn remove(&mut self, key: QueryKey) -> Option<String> {
        self.0.remove(&key)
    }

    pub fn contains(&self, key: QueryKey) -> bool {
        self.0.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (QueryKey, &str)> {
        self.0.iter().map(|(key, value)| (*key, value.as_str()))
    }

    /// Copy without the institution/collection name keys.
    pub fn without_entity_names(&self) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(key, _)| !key.is_entity_name())
                .map(|(key, value)| (*key, value.clone()))
                .collect(),
        )
    }
}

fn normalize_value(key: QueryKey, value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    match key {
        QueryKey::Country => normalize_country(trimmed),
        QueryKey::EventDate => Some(normalize_date_range(trimmed)),
        QueryKey::Continent => Some(normalize_continent(trimmed)),
        _ => Some(trimmed.to_string()),
    }
}

/// Two-letter ISO 3166 code, uppercase. Anything else is unusable.
pub fn normalize_country(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.len() == 2 && trimmed.chars().all(|ch| ch.is_ascii_alphabetic()) {
        Some(trimmed.to_ascii_uppercase())
    } else {
        None
    }
}

/// Ranges become `start,end`; single dates are returned trimmed.
pub fn normalize_date_range(value: &str) -> String {
    let trimmed = value.trim();
    if let Some(caps) = YEAR_RANGE.captures(trimmed) {
        return format!("{},{}", &caps[1], &caps[2]);
    }
    if let Some(caps) = DATE_RANGE.captures(trimmed) {
        return format!("{},{}", &caps[1], &caps[2]);
    }
    trimmed.to_string()
}

pub fn normalize_continent(value: &str) -> String {
    value
        .trim()
        .split(|ch: char| ch.is_whitespace() || ch == '-' || ch == '_')
        .filter(|part| !part.is_empty())
        .map(|part| part.to_ascii_uppercase())
        .collect::<Vec<_>>()
        .join("_")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Institution,
    Collection,
}

impl EntityKind {
    pub fn path_segment(&self) -> &'static str {
        match self {
            EntityKind::Institution => "institution",
            EntityKind::Collection => "collection",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

/// GUID of an institution or collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKey(String);

impl EntityKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
