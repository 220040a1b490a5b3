use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{Array, Float32Array, Float64Array, Int32Array, Int64Array};
use arrow::datatypes::DataType;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use super::edf;
use super::model::SampleMatrix;
use crate::error::Error;

// ---------------------------------------------------------------------------
// Decoder collaborator
// ---------------------------------------------------------------------------

/// Turns one recording on disk into a [`SampleMatrix`].
///
/// Each call is single-shot and read-only. Failures surface as
/// [`Error::Decode`] and are never retried.
pub trait Decoder {
    fn decode(&self, path: &Path) -> crate::Result<SampleMatrix>;
}

/// Decoder that dispatches on the file extension.
///
/// Supported formats:
/// * `.edf`     – European Data Format, one column per ordinary signal plus `time`
/// * `.csv`     – header row of channel names, one numeric column per channel
/// * `.parquet` – one numeric column per channel
#[derive(Debug, Clone, Copy, Default)]
pub struct FileDecoder;

impl Decoder for FileDecoder {
    fn decode(&self, path: &Path) -> crate::Result<SampleMatrix> {
        load_file(path).map_err(|source| Error::Decode {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Load a recording from a file.  Dispatch by extension.
pub fn load_file(path: &Path) -> Result<SampleMatrix> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "edf" => edf::read_edf(path),
        "csv" => load_csv(path),
        "parquet" | "pq" => load_parquet(path),
        other => bail!("Unsupported file extension: .{other}"),
    }
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout: header row with channel names, then one row per time sample.
///
/// ```text
/// time,FP1-F7,F7-T7
/// 0.0,12.5,-3.1
/// 3.9,11.0,-2.7
/// ```
fn load_csv(path: &Path) -> Result<SampleMatrix> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut data: Vec<Vec<f64>> = vec![Vec::new(); headers.len()];

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        if record.len() != headers.len() {
            bail!(
                "CSV row {row_no}: {} fields but {} columns",
                record.len(),
                headers.len()
            );
        }
        for (col_idx, value) in record.iter().enumerate() {
            let v = value.trim().parse::<f64>().with_context(|| {
                format!(
                    "Row {row_no}, column '{}': '{value}' is not a number",
                    headers[col_idx]
                )
            })?;
            data[col_idx].push(v);
        }
    }

    SampleMatrix::new(headers, data)
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file with one numeric column per channel.
///
/// Nulls become NaN. Non-numeric columns are rejected rather than skipped so
/// that a mislabelled file does not silently lose channels.
fn load_parquet(path: &Path) -> Result<SampleMatrix> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;
    let columns: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build().context("building parquet reader")?;

    let mut data: Vec<Vec<f64>> = vec![Vec::new(); columns.len()];

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        for (col_idx, name) in columns.iter().enumerate() {
            extend_f64(&mut data[col_idx], batch.column(col_idx))
                .with_context(|| format!("column '{name}'"))?;
        }
    }

    SampleMatrix::new(columns, data)
}

// -- Arrow helpers --

/// Append every value of a numeric Arrow column as `f64`.
fn extend_f64(out: &mut Vec<f64>, col: &Arc<dyn Array>) -> Result<()> {
    match col.data_type() {
        DataType::Float64 => {
            let arr = col
                .as_any()
                .downcast_ref::<Float64Array>()
                .context("expected Float64Array")?;
            out.extend(arr.iter().map(|v| v.unwrap_or(f64::NAN)));
        }
        DataType::Float32 => {
            let arr = col
                .as_any()
                .downcast_ref::<Float32Array>()
                .context("expected Float32Array")?;
            out.extend(arr.iter().map(|v| v.map_or(f64::NAN, f64::from)));
        }
        DataType::Int32 => {
            let arr = col
                .as_any()
                .downcast_ref::<Int32Array>()
                .context("expected Int32Array")?;
            out.extend(arr.iter().map(|v| v.map_or(f64::NAN, f64::from)));
        }
        DataType::Int64 => {
            let arr = col
                .as_any()
                .downcast_ref::<Int64Array>()
                .context("expected Int64Array")?;
            out.extend(arr.iter().map(|v| v.map_or(f64::NAN, |i| i as f64)));
        }
        other => bail!("expected a numeric column, got {other:?}"),
    }
    Ok(())
}
