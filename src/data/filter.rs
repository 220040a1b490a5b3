use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::model::SampleMatrix;
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Channel whitelist
// ---------------------------------------------------------------------------

/// Fixed set of channels kept for analysis.
///
/// Membership is case-insensitive; kept columns are renamed to the spelling
/// given here so that recordings with inconsistent label casing still line up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct ChannelWhitelist {
    /// folded name → canonical name
    canonical: BTreeMap<String, String>,
}

impl ChannelWhitelist {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let canonical = names
            .into_iter()
            .map(|n| {
                let n = n.into();
                (fold(&n), n)
            })
            .collect();
        Self { canonical }
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.canonical.contains_key(&fold(channel))
    }

    pub fn len(&self) -> usize {
        self.canonical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.canonical.is_empty()
    }

    /// Canonical channel names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.canonical.values().cloned().collect();
        names.sort();
        names
    }

    /// Drop non-whitelisted columns and sort the rest by name.
    ///
    /// If a recording carries the same channel twice under different casing,
    /// the first occurrence wins.
    pub fn restrict(&self, matrix: SampleMatrix) -> Result<SampleMatrix> {
        let (columns, data) = matrix.into_parts();

        let mut kept: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for (name, col) in columns.into_iter().zip(data) {
            if let Some(canonical) = self.canonical.get(&fold(&name)) {
                kept.entry(canonical.clone()).or_insert(col);
            }
        }
        if kept.is_empty() {
            return Err(Error::NoChannels {
                what: "recording after applying the channel whitelist".to_string(),
            });
        }

        let (columns, data): (Vec<String>, Vec<Vec<f64>>) = kept.into_iter().unzip();
        Ok(SampleMatrix::from_validated(columns, data))
    }
}

impl From<Vec<String>> for ChannelWhitelist {
    fn from(names: Vec<String>) -> Self {
        Self::new(names)
    }
}

impl From<ChannelWhitelist> for Vec<String> {
    fn from(list: ChannelWhitelist) -> Self {
        list.names()
    }
}

fn fold(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(columns: &[&str]) -> SampleMatrix {
        let data = columns.iter().enumerate().map(|(i, _)| vec![i as f64; 3]).collect();
        SampleMatrix::new(columns.iter().map(|c| c.to_string()).collect(), data).unwrap()
    }

    #[test]
    fn drops_unlisted_and_sorts() {
        let list = ChannelWhitelist::new(["time", "FP1-F7", "C3-P3"]);
        let m = list
            .restrict(matrix(&["time", "ECG", "FP1-F7", "C3-P3", "VNS"]))
            .unwrap();
        assert_eq!(m.columns(), ["C3-P3", "FP1-F7", "time"]);
        // data travels with its column
        assert_eq!(m.column("FP1-F7").unwrap(), &[2.0, 2.0, 2.0]);
        assert_eq!(m.column("time").unwrap(), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn membership_ignores_case() {
        let list = ChannelWhitelist::new(["FP1-F7", "time"]);
        assert!(list.contains("fp1-f7"));
        let m = list.restrict(matrix(&["Fp1-F7", "TIME"])).unwrap();
        assert_eq!(m.columns(), ["FP1-F7", "time"]);
    }

    #[test]
    fn nothing_left_is_an_error() {
        let list = ChannelWhitelist::new(["FP1-F7"]);
        let err = list.restrict(matrix(&["ECG"])).unwrap_err();
        assert!(matches!(err, Error::NoChannels { .. }));
    }
}
