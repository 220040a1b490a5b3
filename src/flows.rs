//! The three cache-backed analyses over a collection.
//!
//! ```text
//!  groups ──► files ──► FileSummarizer ──┬─► RunningAggregate (whole collection) ──► VarianceTable
//!                                        ├─► peak channel per file ───────────────► RankTable
//!                                        └─► RunningAggregate (reset per group) ──► RankTable
//! ```
//!
//! Processing is sequential: one file is decoded, summarized and folded
//! before the next is opened.

use std::path::PathBuf;

use arrow::record_batch::RecordBatch;

use crate::cache::{CacheGate, CacheStore, CacheTable, FlowKey, ParquetStore};
use crate::config::Config;
use crate::data::loader::Decoder;
use crate::data::model::{ChannelSummaries, RankTable, TIME_CHANNEL, VarianceTable};
use crate::error::{Error, Result};
use crate::progress::Progress;
use crate::stats::{FileSummarizer, merge};

// ---------------------------------------------------------------------------
// RunningAggregate
// ---------------------------------------------------------------------------

/// Summary of everything folded in so far.
///
/// The first summary seeds the aggregate verbatim; later ones are merged
/// pairwise.
#[derive(Debug, Default, Clone)]
pub struct RunningAggregate {
    current: Option<ChannelSummaries>,
    folded: usize,
}

impl RunningAggregate {
    pub fn fold(&mut self, next: ChannelSummaries) -> Result<()> {
        let combined = match &self.current {
            None => next,
            Some(acc) => merge(acc, &next)?,
        };
        self.current = Some(combined);
        self.folded += 1;
        Ok(())
    }

    /// Number of summaries folded in.
    pub fn folded(&self) -> usize {
        self.folded
    }

    pub fn get(&self) -> Option<&ChannelSummaries> {
        self.current.as_ref()
    }

    pub fn finish(self) -> Option<ChannelSummaries> {
        self.current
    }
}

// ---------------------------------------------------------------------------
// Peak-variance selection
// ---------------------------------------------------------------------------

/// Channel with the largest variance, ignoring `time`.
///
/// Ties resolve to the name that sorts last: the series is ordered by name,
/// then stably by value, and the last entry wins.
pub fn select_peak_channel(summary: &ChannelSummaries) -> Result<String> {
    let mut ranked: Vec<(&str, f64)> = summary
        .channels()
        .iter()
        .zip(summary.variances())
        .filter(|(name, _)| !name.eq_ignore_ascii_case(TIME_CHANNEL))
        .map(|(name, &var)| (name.as_str(), var))
        .collect();

    if let Some((name, _)) = ranked.iter().find(|(_, var)| var.is_nan()) {
        return Err(Error::UndefinedVariance {
            channel: name.to_string(),
        });
    }

    ranked.sort_by(|a, b| a.0.cmp(b.0));
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1));

    ranked
        .last()
        .map(|(name, _)| name.to_string())
        .ok_or_else(|| Error::NoChannels {
            what: "summary once `time` is excluded".to_string(),
        })
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// Result of one flow.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowOutput {
    Variance(VarianceTable),
    Rank(RankTable),
}

impl FlowOutput {
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        match self {
            FlowOutput::Variance(t) => t.to_record_batch(),
            FlowOutput::Rank(t) => t.to_record_batch(),
        }
    }
}

struct Group {
    id: u32,
    name: String,
    files: Vec<PathBuf>,
}

/// Runs the cache-backed flows over one configured collection.
pub struct Analysis<'a, S = ParquetStore> {
    config: &'a Config,
    decoder: &'a dyn Decoder,
    progress: &'a dyn Progress,
    cache: CacheGate<S>,
}

impl<'a> Analysis<'a, ParquetStore> {
    /// Cache entries live under the dataset root.
    pub fn new(config: &'a Config, decoder: &'a dyn Decoder, progress: &'a dyn Progress) -> Self {
        let cache = CacheGate::at(&config.dataset_root);
        Self::with_cache(config, decoder, progress, cache)
    }
}

impl<'a, S: CacheStore> Analysis<'a, S> {
    pub fn with_cache(
        config: &'a Config,
        decoder: &'a dyn Decoder,
        progress: &'a dyn Progress,
        cache: CacheGate<S>,
    ) -> Self {
        Self {
            config,
            decoder,
            progress,
            cache,
        }
    }

    pub fn cache(&self) -> &CacheGate<S> {
        &self.cache
    }

    pub fn run(&self, flow: FlowKey) -> Result<FlowOutput> {
        Ok(match flow {
            FlowKey::Accumulated => FlowOutput::Variance(self.accumulated()?),
            FlowKey::ByFile => FlowOutput::Rank(self.rank_by_file()?),
            FlowKey::ByGroup => FlowOutput::Rank(self.rank_by_group()?),
        })
    }

    /// Accumulated variance of every channel over the whole collection.
    pub fn accumulated(&self) -> Result<VarianceTable> {
        self.cache
            .run_or_load(FlowKey::Accumulated, || self.compute_accumulated())
    }

    /// Peak-variance channel of every file.
    pub fn rank_by_file(&self) -> Result<RankTable> {
        self.cache
            .run_or_load(FlowKey::ByFile, || self.compute_rank_by_file())
    }

    /// Peak-variance channel of every group.
    pub fn rank_by_group(&self) -> Result<RankTable> {
        self.cache
            .run_or_load(FlowKey::ByGroup, || self.compute_rank_by_group())
    }

    /// Uncached accumulated flow.
    pub fn compute_accumulated(&self) -> Result<VarianceTable> {
        let summarizer = self.summarizer();
        let mut aggregate = RunningAggregate::default();

        self.visit_groups(FlowKey::Accumulated, |group| {
            for (i, path) in group.files.iter().enumerate() {
                aggregate.fold(summarizer.summarize(path)?)?;
                self.progress.file_done(&group.name, i, group.files.len());
            }
            Ok(())
        })?;

        let files = aggregate.folded();
        let total = aggregate.finish().ok_or(Error::EmptyCollection)?;
        log::info!(
            "accumulated {} samples over {files} file(s), {} channel(s)",
            total.count(),
            total.len()
        );
        Ok(total.to_variance_table())
    }

    /// Uncached per-file ranking. Each file's variance comes straight from
    /// its own samples.
    pub fn compute_rank_by_file(&self) -> Result<RankTable> {
        let summarizer = self.summarizer();
        let layout = self.config.layout();
        let mut table = RankTable::default();

        self.visit_groups(FlowKey::ByFile, |group| {
            for (i, path) in group.files.iter().enumerate() {
                let summary = summarizer.summarize(path)?;
                table.push(layout.file_id(group.id, path), select_peak_channel(&summary)?);
                self.progress.file_done(&group.name, i, group.files.len());
            }
            Ok(())
        })?;

        Ok(table)
    }

    /// Uncached per-group ranking. The aggregate starts afresh for every
    /// group; groups without files produce no row.
    pub fn compute_rank_by_group(&self) -> Result<RankTable> {
        let summarizer = self.summarizer();
        let mut table = RankTable::default();

        self.visit_groups(FlowKey::ByGroup, |group| {
            let mut aggregate = RunningAggregate::default();
            for (i, path) in group.files.iter().enumerate() {
                aggregate.fold(summarizer.summarize(path)?)?;
                self.progress.file_done(&group.name, i, group.files.len());
            }
            match aggregate.get() {
                Some(summary) => table.push(group.name.clone(), select_peak_channel(summary)?),
                None => log::warn!("{}: no recordings, skipping group", group.name),
            }
            Ok(())
        })?;

        Ok(table)
    }

    fn summarizer(&self) -> FileSummarizer<'_> {
        FileSummarizer::new(self.decoder, &self.config.channels)
    }

    /// Enumerate the configured groups in id order.
    ///
    /// Progress is closed with `finished` whether or not a group fails.
    fn visit_groups<F>(&self, flow: FlowKey, mut visit: F) -> Result<()>
    where
        F: FnMut(&Group) -> Result<()>,
    {
        let layout = self.config.layout();
        let ids = self.config.groups();
        self.progress.flow_started(flow.as_str(), ids.len());

        let result = ids.into_iter().try_for_each(|id| -> Result<()> {
            let group = Group {
                id,
                name: layout.group_name(id),
                files: layout.group_files(id)?,
            };
            log::debug!("{flow}: {} has {} file(s)", group.name, group.files.len());
            self.progress.group_started(&group.name, group.files.len());
            visit(&group)?;
            self.progress.group_finished(&group.name);
            Ok(())
        });

        self.progress.finished();
        result
    }
}
