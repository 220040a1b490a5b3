//! Durable memoization of flow results as Parquet tables.
//!
//! Layout: `<dataset root>/<flow key>/<flow key>.parquet`.

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use crate::data::model::{RankTable, VarianceTable};
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Cached flows, one entry each per dataset root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowKey {
    Accumulated,
    ByFile,
    ByGroup,
}

impl FlowKey {
    pub const ALL: [FlowKey; 3] = [FlowKey::Accumulated, FlowKey::ByFile, FlowKey::ByGroup];

    pub fn as_str(self) -> &'static str {
        match self {
            FlowKey::Accumulated => "variance_accumulated",
            FlowKey::ByFile => "variance_file",
            FlowKey::ByGroup => "variance_person",
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Where cached tables live.
pub trait CacheStore {
    fn exists(&self, key: FlowKey) -> bool;
    fn save(&self, key: FlowKey, batch: &RecordBatch) -> Result<()>;
    fn load(&self, key: FlowKey) -> Result<RecordBatch>;
    /// Delete an entry; a missing entry is not an error.
    fn remove(&self, key: FlowKey) -> Result<()>;
    /// Location of an entry, for error messages.
    fn location(&self, key: FlowKey) -> PathBuf;
}

/// Parquet files under the dataset root.
#[derive(Debug, Clone)]
pub struct ParquetStore {
    root: PathBuf,
}

impl ParquetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self, key: FlowKey) -> PathBuf {
        self.root.join(key.as_str()).join(format!("{key}.parquet"))
    }

    /// Sibling file a table is written to before it is moved into place.
    fn staging_path(&self, key: FlowKey) -> PathBuf {
        self.root.join(key.as_str()).join(format!("{key}.parquet.tmp"))
    }
}

impl CacheStore for ParquetStore {
    fn exists(&self, key: FlowKey) -> bool {
        self.path(key).is_file()
    }

    /// Write to a staging file and rename it over the entry, so an
    /// interrupted write never shows up as an entry.
    fn save(&self, key: FlowKey, batch: &RecordBatch) -> Result<()> {
        let path = self.path(key);
        let staging = self.staging_path(key);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let written = write_parquet(&staging, batch);
        if written.is_err() {
            let _ = std::fs::remove_file(&staging);
        }
        written?;
        std::fs::rename(&staging, &path)?;
        Ok(())
    }

    fn load(&self, key: FlowKey) -> Result<RecordBatch> {
        let path = self.path(key);
        let corrupt = |reason: String| Error::CacheRead {
            path: path.clone(),
            reason,
        };

        let file = File::open(&path)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| corrupt(format!("reading parquet metadata: {e}")))?;
        let schema = builder.schema().clone();
        let reader = builder
            .build()
            .map_err(|e| corrupt(format!("building parquet reader: {e}")))?;

        let batches = reader
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| corrupt(format!("reading record batch: {e}")))?;
        arrow::compute::concat_batches(&schema, &batches)
            .map_err(|e| corrupt(format!("joining record batches: {e}")))
    }

    fn remove(&self, key: FlowKey) -> Result<()> {
        match std::fs::remove_file(self.path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn location(&self, key: FlowKey) -> PathBuf {
        self.path(key)
    }
}

fn write_parquet(path: &Path, batch: &RecordBatch) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
    writer.write(batch)?;
    writer.close()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Table <-> RecordBatch
// ---------------------------------------------------------------------------

/// A flow result that can be stored as a columnar table.
pub trait CacheTable: Sized {
    fn to_record_batch(&self) -> Result<RecordBatch>;

    /// Rebuild from a stored batch; `Err(reason)` marks the entry as corrupt.
    fn from_record_batch(batch: &RecordBatch) -> std::result::Result<Self, String>;
}

/// One Float64 column per channel, a single row of variances.
impl CacheTable for VarianceTable {
    fn to_record_batch(&self) -> Result<RecordBatch> {
        let fields: Vec<Field> = self
            .channels
            .iter()
            .map(|c| Field::new(c.as_str(), DataType::Float64, false))
            .collect();
        let columns: Vec<ArrayRef> = self
            .variances
            .iter()
            .map(|&v| Arc::new(Float64Array::from(vec![v])) as ArrayRef)
            .collect();
        Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
    }

    fn from_record_batch(batch: &RecordBatch) -> std::result::Result<Self, String> {
        if batch.num_rows() != 1 {
            return Err(format!("expected 1 row of variances, found {}", batch.num_rows()));
        }
        if batch.num_columns() == 0 {
            return Err("no channel columns".to_string());
        }
        let schema = batch.schema();
        let mut channels = Vec::with_capacity(batch.num_columns());
        let mut variances = Vec::with_capacity(batch.num_columns());
        for (field, col) in schema.fields().iter().zip(batch.columns()) {
            let arr = col.as_any().downcast_ref::<Float64Array>().ok_or_else(|| {
                format!(
                    "column '{}' is {:?}, expected Float64",
                    field.name(),
                    col.data_type()
                )
            })?;
            if arr.is_null(0) {
                return Err(format!("column '{}' is null", field.name()));
            }
            channels.push(field.name().clone());
            variances.push(arr.value(0));
        }
        Ok(VarianceTable {
            channels,
            variances,
        })
    }
}

const ID_COLUMN: &str = "id";
const CHANNEL_COLUMN: &str = "channel";

/// Two Utf8 columns: row identifier and selected channel.
impl CacheTable for RankTable {
    fn to_record_batch(&self) -> Result<RecordBatch> {
        let schema = Schema::new(vec![
            Field::new(ID_COLUMN, DataType::Utf8, false),
            Field::new(CHANNEL_COLUMN, DataType::Utf8, false),
        ]);
        let ids = StringArray::from(self.rows.iter().map(|r| r.id.as_str()).collect::<Vec<_>>());
        let channels =
            StringArray::from(self.rows.iter().map(|r| r.channel.as_str()).collect::<Vec<_>>());
        Ok(RecordBatch::try_new(
            Arc::new(schema),
            vec![Arc::new(ids), Arc::new(channels)],
        )?)
    }

    fn from_record_batch(batch: &RecordBatch) -> std::result::Result<Self, String> {
        let ids = string_column(batch, ID_COLUMN)?;
        let channels = string_column(batch, CHANNEL_COLUMN)?;
        let mut table = RankTable::default();
        for row in 0..batch.num_rows() {
            if ids.is_null(row) || channels.is_null(row) {
                return Err(format!("row {row} has a null cell"));
            }
            table.push(ids.value(row), channels.value(row));
        }
        Ok(table)
    }
}

fn string_column<'a>(
    batch: &'a RecordBatch,
    name: &str,
) -> std::result::Result<&'a StringArray, String> {
    let col = batch
        .column_by_name(name)
        .ok_or_else(|| format!("missing '{name}' column"))?;
    col.as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| format!("column '{name}' is {:?}, expected Utf8", col.data_type()))
}

// ---------------------------------------------------------------------------
// CacheGate
// ---------------------------------------------------------------------------

/// Run-or-load memoization for flow results.
///
/// An existing entry is returned as-is: no staleness or version check is
/// made, so callers must [`invalidate`](Self::invalidate) entries whose
/// inputs changed. There is no locking either. Two processes computing the
/// same key concurrently will both write the file and the last writer wins;
/// this tool is meant for one operator running one batch at a time.
pub struct CacheGate<S> {
    store: S,
}

impl<S: CacheStore> CacheGate<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Load the entry for `key`, or compute, persist and return it.
    ///
    /// A failing `compute` writes nothing.
    pub fn run_or_load<T, F>(&self, key: FlowKey, compute: F) -> Result<T>
    where
        T: CacheTable,
        F: FnOnce() -> Result<T>,
    {
        if self.store.exists(key) {
            log::info!("{key}: reading the variance already calculated");
            let batch = self.store.load(key)?;
            return T::from_record_batch(&batch).map_err(|reason| Error::CacheRead {
                path: self.store.location(key),
                reason,
            });
        }

        log::info!("{key}: loading the files to calculate variance");
        let table = compute()?;
        self.store.save(key, &table.to_record_batch()?)?;
        log::info!("{key}: saved to {}", self.store.location(key).display());
        Ok(table)
    }

    pub fn invalidate(&self, key: FlowKey) -> Result<()> {
        log::info!("{key}: invalidating cache entry");
        self.store.remove(key)
    }
}

/// Convenience for the Parquet layout under a dataset root.
impl CacheGate<ParquetStore> {
    pub fn at(root: &Path) -> Self {
        Self::new(ParquetStore::new(root))
    }
}
