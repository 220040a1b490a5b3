use serde::Serialize;

use crate::error::{Error, Result};

/// Name of the timestamp pseudo-channel produced by decoders.
///
/// It survives filtering and summarization but never takes part in ranking.
pub const TIME_CHANNEL: &str = "time";

// ---------------------------------------------------------------------------
// SampleMatrix – one decoded recording
// ---------------------------------------------------------------------------

/// Samples of one recording, stored column-major (one vector per channel).
///
/// Consumed by the summarizer and dropped straight after, so a collection is
/// never held in memory at once.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleMatrix {
    columns: Vec<String>,
    data: Vec<Vec<f64>>,
}

impl SampleMatrix {
    /// Build a matrix from named columns. All columns must have equal length.
    pub fn new(columns: Vec<String>, data: Vec<Vec<f64>>) -> anyhow::Result<Self> {
        if columns.len() != data.len() {
            anyhow::bail!(
                "{} column names for {} data columns",
                columns.len(),
                data.len()
            );
        }
        if let Some(first) = data.first() {
            if let Some((i, col)) = data.iter().enumerate().find(|(_, c)| c.len() != first.len()) {
                anyhow::bail!(
                    "column '{}' has {} rows, expected {}",
                    columns[i],
                    col.len(),
                    first.len()
                );
            }
        }
        Ok(Self { columns, data })
    }

    /// Rebuild a matrix from the parts of one that was already validated.
    pub(crate) fn from_validated(columns: Vec<String>, data: Vec<Vec<f64>>) -> Self {
        debug_assert_eq!(columns.len(), data.len());
        Self { columns, data }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of time samples (rows).
    pub fn n_rows(&self) -> usize {
        self.data.first().map_or(0, Vec::len)
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|i| self.data[i].as_slice())
    }

    /// Iterate `(name, samples)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.columns
            .iter()
            .zip(&self.data)
            .map(|(name, col)| (name.as_str(), col.as_slice()))
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<Vec<f64>>) {
        (self.columns, self.data)
    }
}

// ---------------------------------------------------------------------------
// ChannelSummary / ChannelSummaries – (count, mean, variance)
// ---------------------------------------------------------------------------

/// Moments of one channel over one unit of data (file, group or collection).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChannelSummary {
    pub count: u64,
    pub mean: f64,
    /// Sample variance (denominator `count - 1`).
    pub variance: f64,
}

/// Per-channel summaries of one unit, indexed by channel name.
///
/// All channels of a unit share a sample count, so it is stored once and the
/// means/variances are kept as parallel vectors for whole-vector merging.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSummaries {
    channels: Vec<String>,
    count: u64,
    means: Vec<f64>,
    variances: Vec<f64>,
}

impl ChannelSummaries {
    /// Assemble summaries from parallel vectors.
    ///
    /// A `count` of zero carries no data and is rejected, as are vectors of
    /// unequal length. With `count == 1` the variances are not meaningful and
    /// are ignored by merging.
    pub fn from_parts(
        channels: Vec<String>,
        count: u64,
        means: Vec<f64>,
        variances: Vec<f64>,
    ) -> Result<Self> {
        if count == 0 {
            return Err(Error::Domain { count });
        }
        if means.len() != channels.len() || variances.len() != channels.len() {
            return Err(Error::SummaryShape {
                channels: channels.len(),
                means: means.len(),
                variances: variances.len(),
            });
        }
        Ok(Self {
            channels,
            count,
            means,
            variances,
        })
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn means(&self) -> &[f64] {
        &self.means
    }

    pub fn variances(&self) -> &[f64] {
        &self.variances
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Scalar view of a single channel.
    pub fn get(&self, channel: &str) -> Option<ChannelSummary> {
        let i = self.channels.iter().position(|c| c == channel)?;
        Some(ChannelSummary {
            count: self.count,
            mean: self.means[i],
            variance: self.variances[i],
        })
    }

    /// Keep only the variances, in channel order.
    pub fn to_variance_table(&self) -> VarianceTable {
        VarianceTable {
            channels: self.channels.clone(),
            variances: self.variances.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Result tables
// ---------------------------------------------------------------------------

/// Accumulated variance of every channel over the whole collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VarianceTable {
    pub channels: Vec<String>,
    pub variances: Vec<f64>,
}

impl VarianceTable {
    pub fn get(&self, channel: &str) -> Option<f64> {
        self.channels
            .iter()
            .position(|c| c == channel)
            .map(|i| self.variances[i])
    }
}

/// One ranked unit: a file or a group, and its peak-variance channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankRow {
    pub id: String,
    pub channel: String,
}

/// Peak-variance channel per file or per group, in enumeration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RankTable {
    pub rows: Vec<RankRow>,
}

impl RankTable {
    pub fn push(&mut self, id: impl Into<String>, channel: impl Into<String>) {
        self.rows.push(RankRow {
            id: id.into(),
            channel: channel.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
