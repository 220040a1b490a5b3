//! Per-file summaries and the pairwise merge that folds them together.

pub mod merge;
pub mod summary;

pub use merge::{merge, merge_one};
pub use summary::{FileSummarizer, summarize};
