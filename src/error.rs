use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the variance pipeline.
///
/// Every failure is fail-fast: nothing is retried, and a flow that errors
/// leaves no cache entry behind.
#[derive(Debug, Error)]
pub enum Error {
    /// A recording could not be parsed.
    #[error("failed to decode {}: {source:#}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// Sample variance is undefined for fewer than two samples.
    #[error("variance is undefined for {count} sample(s)")]
    Domain { count: u64 },

    /// A NaN variance reached the max-variance selection.
    #[error("channel {channel} has an undefined (NaN) variance")]
    UndefinedVariance { channel: String },

    /// Two summaries over different channel sets were merged.
    #[error("channel sets differ: [{}] vs [{}]", left.join(", "), right.join(", "))]
    ChannelMismatch { left: Vec<String>, right: Vec<String> },

    /// Summary vectors of different lengths were assembled.
    #[error("{channels} channel(s) but {means} mean(s) and {variances} variance(s)")]
    SummaryShape {
        channels: usize,
        means: usize,
        variances: usize,
    },

    #[error("no channels left in {what}")]
    NoChannels { what: String },

    #[error("no recordings found in the configured group range")]
    EmptyCollection,

    /// A persisted table is missing expected columns or is malformed.
    /// Delete the entry and rerun.
    #[error("corrupt cache entry {}: {reason}", path.display())]
    CacheRead { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),

    #[error(transparent)]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error(transparent)]
    Glob(#[from] glob::PatternError),
}

pub type Result<T> = std::result::Result<T, Error>;
