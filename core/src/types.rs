//! Shared primitive types used across the entire simulation.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

/// A simulation tick. One tick = one week.
pub type Tick = u64;

/// Index of an entity in the population. Also its node id in the peer network.
pub type EntityId = usize;

/// The canonical run identifier.
pub type RunId = String;

// ── Categories ──────────────────────────────────────────────────────

/// Firm size class. Declaration order is the category score (0, 1, 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SizeCategory {
    Micro,
    Small,
    Medium,
}

impl SizeCategory {
    pub const ALL: [SizeCategory; 3] = [Self::Micro, Self::Small, Self::Medium];

    pub fn score(self) -> f64 {
        self as usize as f64
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Micro  => "Micro",
            Self::Small  => "Small",
            Self::Medium => "Medium",
        }
    }
}

/// Firm age class. Declaration order is the category score (0, 1, 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgeCategory {
    Young,
    Mature,
    Old,
}

impl AgeCategory {
    pub const ALL: [AgeCategory; 3] = [Self::Young, Self::Mature, Self::Old];

    pub fn score(self) -> f64 {
        self as usize as f64
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Young  => "Young",
            Self::Mature => "Mature",
            Self::Old    => "Old",
        }
    }
}

impl FromStr for SizeCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown size category '{s}'"))
    }
}

impl FromStr for AgeCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown age category '{s}'"))
    }
}

/// Index into the configured sector list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SectorId(pub usize);

// ── Group key ───────────────────────────────────────────────────────

/// (size, age) segment. Keys the mu-table, audit rates and group statistics.
///
/// Serialized as `"Size-Age"` (e.g. `"Micro-Young"`) so it can be used as a
/// JSON map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    pub size: SizeCategory,
    pub age:  AgeCategory,
}

impl GroupKey {
    pub fn new(size: SizeCategory, age: AgeCategory) -> Self {
        Self { size, age }
    }

    /// Every (size, age) combination in declaration order.
    pub fn all() -> impl Iterator<Item = GroupKey> {
        SizeCategory::ALL
            .into_iter()
            .flat_map(|size| AgeCategory::ALL.into_iter().map(move |age| GroupKey { size, age }))
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.size.as_str(), self.age.as_str())
    }
}

impl FromStr for GroupKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (size, age) = s
            .split_once('-')
            .ok_or_else(|| format!("group key '{s}' must look like 'Size-Age'"))?;
        Ok(Self {
            size: size.parse()?,
            age:  age.parse()?,
        })
    }
}

impl Serialize for GroupKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for GroupKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
