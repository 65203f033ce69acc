// src/models/mileage.rs

//! Mileage files: the nodes along one ELR with their distances.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

const YARDS_PER_CHAIN: u32 = 22;
const CHAINS_PER_MILE: u32 = 80;
const YARDS_PER_KM: f64 = 1093.6133;

/// A distance in the `miles.chains` notation used by the source.
///
/// Serializes as its printed form, e.g. `"8.69"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MileChain {
    pub miles: u32,
    pub chains: u32,
}

impl MileChain {
    pub fn new(miles: u32, chains: u32) -> Self {
        Self { miles, chains }
    }

    /// Nearest `miles.chains` to a distance in kilometres.
    pub fn from_km(km: f64) -> Option<Self> {
        if !km.is_finite() || km < 0.0 {
            return None;
        }
        let yards = (km * YARDS_PER_KM).round() as u32;
        Some(Self::from_yards(yards))
    }

    pub fn from_yards(yards: u32) -> Self {
        let miles = yards / (YARDS_PER_CHAIN * CHAINS_PER_MILE);
        let rest = yards % (YARDS_PER_CHAIN * CHAINS_PER_MILE);
        let chains = (f64::from(rest) / f64::from(YARDS_PER_CHAIN)).round() as u32;
        if chains >= CHAINS_PER_MILE {
            Self::new(miles + 1, chains - CHAINS_PER_MILE)
        } else {
            Self::new(miles, chains)
        }
    }

    pub fn yards(self) -> u32 {
        (self.miles * CHAINS_PER_MILE + self.chains) * YARDS_PER_CHAIN
    }

    /// The `miles.yards` form, e.g. `8.69` gives `8.1518`.
    pub fn mileage(self) -> String {
        format!("{}.{:04}", self.miles, self.chains * YARDS_PER_CHAIN)
    }
}

impl FromStr for MileChain {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || AppError::validation(format!("'{s}' is not a miles.chains distance"));
        let (miles, chains) = s.trim().split_once('.').ok_or_else(invalid)?;
        if chains.is_empty() || chains.len() > 2 {
            return Err(invalid());
        }
        let miles: u32 = miles.parse().map_err(|_| invalid())?;
        let chains: u32 = chains.parse().map_err(|_| invalid())?;
        if chains >= CHAINS_PER_MILE {
            return Err(invalid());
        }
        Ok(Self::new(miles, chains))
    }
}

impl TryFrom<String> for MileChain {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<MileChain> for String {
    fn from(value: MileChain) -> Self {
        value.to_string()
    }
}

impl fmt::Display for MileChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.miles, self.chains)
    }
}

/// Another line reached from a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConnection {
    /// Connection text as printed
    pub text: String,
    pub elr: Option<String>,
    /// Distance of the junction on the connecting ELR
    pub mile_chain: Option<MileChain>,
}

/// One line of a mileage file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MileageEntry {
    /// `None` when the distance is blank or unreadable
    pub mile_chain: Option<MileChain>,
    #[serde(default)]
    pub mileage_note: Option<String>,
    pub node: String,
    #[serde(default)]
    pub connections: Vec<NodeConnection>,
}

impl MileageEntry {
    /// Whether the node or one of its connections refers to `elr`.
    pub fn mentions(&self, elr: &str) -> bool {
        self.connections
            .iter()
            .any(|c| c.elr.as_deref().is_some_and(|e| e.eq_ignore_ascii_case(elr)))
            || self
                .node
                .split(|c: char| !c.is_ascii_alphanumeric())
                .any(|word| word.eq_ignore_ascii_case(elr))
    }
}

/// A run of entries under one measure, e.g. "Current measure".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measure {
    /// `None` when the file has a single unnamed measure
    pub name: Option<String>,
    pub entries: Vec<MileageEntry>,
}

/// The parsed mileage file of one ELR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MileageFile {
    pub elr: String,
    pub line: String,
    #[serde(default)]
    pub sub_line: Option<String>,
    pub measures: Vec<Measure>,
    #[serde(default)]
    pub notes: Option<String>,
    pub source: String,
    #[serde(default)]
    pub last_updated: Option<NaiveDate>,
}

impl MileageFile {
    /// The measure in current use: a "current", "one", "later", or "usual"
    /// measure when named, else the first.
    pub fn preferred_measure(&self) -> Option<&Measure> {
        const PREFERRED: [&str; 5] = ["Current ", "One ", "Later ", "Usual ", "Measure used by "];
        self.measures
            .iter()
            .find(|m| {
                m.name
                    .as_deref()
                    .is_some_and(|n| PREFERRED.iter().any(|p| n.starts_with(p)))
            })
            .or_else(|| self.measures.first())
    }

    /// Every entry of every measure, in order.
    pub fn entries(&self) -> impl Iterator<Item = &MileageEntry> {
        self.measures.iter().flat_map(|m| m.entries.iter())
    }

    /// ELRs connected to this one, in order of first mention.
    pub fn connected_elrs(&self) -> Vec<String> {
        let mut elrs: Vec<String> = Vec::new();
        for connection in self.entries().flat_map(|e| e.connections.iter()) {
            if let Some(elr) = &connection.elr {
                if !elrs.contains(elr) && !elr.eq_ignore_ascii_case(&self.elr) {
                    elrs.push(elr.clone());
                }
            }
        }
        elrs
    }
}

/// A connection through an intermediate ELR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViaConnection {
    pub elr: String,
    /// Where the intermediate ELR is joined from the start ELR
    pub entry: MileChain,
    /// Where the intermediate ELR leaves for the end ELR
    pub exit: MileChain,
}

/// Where one ELR meets another, directly or through one intermediate ELR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionMileages {
    pub start_elr: String,
    pub end_elr: String,
    /// Distance on the start ELR where it is left
    pub start_exit: MileChain,
    #[serde(default)]
    pub via: Option<ViaConnection>,
    /// Distance on the end ELR where it is joined
    pub end_entry: MileChain,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mile_chain_parses_and_prints() {
        let m: MileChain = "8.69".parse().unwrap();
        assert_eq!(m, MileChain::new(8, 69));
        assert_eq!(m.to_string(), "8.69");
        assert_eq!(m.mileage(), "8.1518");
        assert_eq!("0.05".parse::<MileChain>().unwrap().mileage(), "0.0110");
        assert!("8.80".parse::<MileChain>().is_err());
        assert!("8".parse::<MileChain>().is_err());
        assert!("8.123".parse::<MileChain>().is_err());
    }

    #[test]
    fn km_converts_to_nearest_chain() {
        // 14.629 km is 15998 yards: 9 miles 158 yards
        assert_eq!(MileChain::from_km(14.629), Some(MileChain::new(9, 7)));
        assert_eq!(MileChain::from_km(-1.0), None);
        assert_eq!(MileChain::from_yards(1759), MileChain::new(1, 0));
    }

    #[test]
    fn serializes_as_printed_form() {
        let json = serde_json::to_string(&MileChain::new(215, 18)).unwrap();
        assert_eq!(json, "\"215.18\"");
        let back: MileChain = serde_json::from_str("\"0.36\"").unwrap();
        assert_eq!(back.yards(), 36 * 22);
    }

    #[test]
    fn preferred_measure_is_current_when_named() {
        let measure = |name: &str| Measure {
            name: Some(name.to_string()),
            entries: Vec::new(),
        };
        let mut file = MileageFile {
            elr: "MOR".into(),
            line: "Morlais".into(),
            sub_line: None,
            measures: vec![measure("Original measure"), measure("Current measure")],
            notes: None,
            source: String::new(),
            last_updated: None,
        };
        assert_eq!(
            file.preferred_measure().and_then(|m| m.name.as_deref()),
            Some("Current measure")
        );
        file.measures.remove(1);
        assert_eq!(
            file.preferred_measure().and_then(|m| m.name.as_deref()),
            Some("Original measure")
        );
    }
}
