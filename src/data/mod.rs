/// Data layer: recordings, decoding, channel filtering and dataset layout.
///
/// Architecture:
/// ```text
///  <root>/chb01/*.edf   (.csv / .parquet)
///        │
///        ▼
///   ┌──────────┐
///   │  layout   │  group id → sorted file paths
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → SampleMatrix   (edf: EDF codec)
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  whitelist + sort columns → SampleMatrix
///   └──────────┘
/// ```

pub mod edf;
pub mod filter;
pub mod layout;
pub mod loader;
pub mod model;
