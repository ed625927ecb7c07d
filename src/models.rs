// Domain models: sources, snapshots, and the stats response shape

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Two-level measurement mapping: subSource -> field -> value.
/// Sparse: fields may come and go between snapshots.
pub type Payload = BTreeMap<String, BTreeMap<String, f64>>;

/// The fixed set of tracked sources. Adapters register under one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Twitter,
    Trello,
    Gmail,
    Fitbit,
    Stocks,
    Strava,
    Weather,
    Tscraper,
    Time,
}

impl Source {
    pub const ALL: [Source; 9] = [
        Source::Twitter,
        Source::Trello,
        Source::Gmail,
        Source::Fitbit,
        Source::Stocks,
        Source::Strava,
        Source::Weather,
        Source::Tscraper,
        Source::Time,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Twitter => "twitter",
            Source::Trello => "trello",
            Source::Gmail => "gmail",
            Source::Fitbit => "fitbit",
            Source::Stocks => "stocks",
            Source::Strava => "strava",
            Source::Weather => "weather",
            Source::Tscraper => "tscraper",
            Source::Time => "time",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = UnknownSource;

    /// Case-insensitive: the dashboard requests sources in upper case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Source::ALL
            .iter()
            .copied()
            .find(|src| src.as_str() == lower)
            .ok_or_else(|| UnknownSource(s.to_string()))
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown source: {0}")]
pub struct UnknownSource(pub String);

/// One timestamped measurement for one source. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub source: Source,
    /// Epoch milliseconds, assigned by the scheduler at write time.
    pub timestamp_ms: i64,
    pub payload: Payload,
}

/// One output point of the series reconstructor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatPoint {
    /// Epoch ms for time-based modes; ordinal position for relative-time mode.
    pub timestamp: i64,
    pub stats: Payload,
}

/// Read-side response: points plus the subSource -> field-name catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsResponse {
    pub stats: Vec<StatPoint>,
    pub series: BTreeMap<String, Vec<String>>,
}

impl StatsResponse {
    pub fn empty() -> Self {
        Self {
            stats: Vec::new(),
            series: BTreeMap::new(),
        }
    }
}
