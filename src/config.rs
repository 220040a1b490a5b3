use std::ops::Range;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::data::filter::ChannelWhitelist;
use crate::data::layout::DatasetLayout;
use crate::data::model::TIME_CHANNEL;

/// Bipolar scalp montage shared by every recording of the CHB-MIT collection,
/// plus the `time` pseudo-channel. `T8-P8` appears twice in the source files.
pub const DEFAULT_CHANNELS: [&str; 24] = [
    TIME_CHANNEL,
    "FP1-F7",
    "F7-T7",
    "T7-P7",
    "P7-O1",
    "FP1-F3",
    "F3-C3",
    "C3-P3",
    "P3-O1",
    "FP2-F4",
    "F4-C4",
    "C4-P4",
    "P4-O2",
    "FP2-F8",
    "F8-T8",
    "T8-P8-0",
    "P8-O2",
    "FZ-CZ",
    "CZ-PZ",
    "P7-T7",
    "T7-FT9",
    "FT9-FT10",
    "FT10-T8",
    "T8-P8-1",
];

/// Analysis settings. Every field can come from a TOML file:
///
/// ```toml
/// dataset_root = "/data/chb-mit"
/// group_start = 1
/// group_end = 11
/// group_prefix = "chb"
/// extension = "edf"
/// channels = ["time", "FP1-F7", "F7-T7"]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub dataset_root: PathBuf,
    /// First group id (inclusive).
    pub group_start: u32,
    /// Last group id (exclusive).
    pub group_end: u32,
    pub group_prefix: String,
    pub extension: String,
    pub channels: ChannelWhitelist,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dataset_root: PathBuf::from("."),
            group_start: 1,
            group_end: 11,
            group_prefix: "chb".to_string(),
            extension: "edf".to_string(),
            channels: ChannelWhitelist::new(DEFAULT_CHANNELS),
        }
    }
}

impl Config {
    /// Read a TOML config; missing fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = toml::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    pub fn groups(&self) -> Range<u32> {
        self.group_start..self.group_end
    }

    pub fn layout(&self) -> DatasetLayout {
        DatasetLayout::new(&self.dataset_root, &self.group_prefix, &self.extension)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.group_start <= self.group_end,
            "group range {}..{} is reversed",
            self.group_start,
            self.group_end
        );
        ensure!(!self.channels.is_empty(), "channel whitelist is empty");
        ensure!(
            !self.extension.trim_start_matches('.').is_empty(),
            "file extension is empty"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_the_montage() {
        let config = Config::default();
        assert_eq!(config.groups(), 1..11);
        assert_eq!(config.channels.len(), 24);
        assert!(config.channels.contains("time"));
        assert!(config.channels.contains("T8-P8-1"));
        config.validate().unwrap();
    }

    #[test]
    fn toml_overrides_some_fields() {
        let config: Config = toml::from_str(
            r#"
            dataset_root = "/data/eeg"
            group_end = 3
            channels = ["time", "Cz"]
            "#,
        )
        .unwrap();
        assert_eq!(config.dataset_root, PathBuf::from("/data/eeg"));
        assert_eq!(config.groups(), 1..3);
        assert_eq!(config.extension, "edf");
        assert_eq!(config.channels, ChannelWhitelist::new(["time", "Cz"]));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<Config>("grup_end = 3").is_err());
    }

    #[test]
    fn reversed_range_is_invalid() {
        let config = Config {
            group_start: 5,
            group_end: 2,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
