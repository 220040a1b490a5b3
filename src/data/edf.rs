//! European Data Format (EDF) reading and writing.
//!
//! Layout:
//! ```text
//!  fixed header      256 bytes        version, ids, dates, n_records, ns
//!  signal headers    ns * 256 bytes   field-major: all labels, then all
//!                                     transducers, ... (see SIGNAL_FIELDS)
//!  data records      n_records * Σ samples_per_record[i] * 2 bytes
//!                                     little-endian i16, signal-major per record
//! ```

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result, bail, ensure};
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use super::model::{SampleMatrix, TIME_CHANNEL};

const FIXED_HEADER_LEN: usize = 256;
const SIGNAL_HEADER_LEN: usize = 256;
const ANNOTATIONS_LABEL: &str = "EDF Annotations";

/// Widths of the per-signal header fields, in file order.
const SIGNAL_FIELDS: [usize; 10] = [16, 80, 8, 8, 8, 8, 8, 80, 8, 32];

const DIGITAL_MIN: i16 = i16::MIN;
const DIGITAL_MAX: i16 = i16::MAX;

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct SignalHeader {
    label: String,
    physical_min: f64,
    physical_max: f64,
    digital_min: f64,
    digital_max: f64,
    samples_per_record: usize,
}

impl SignalHeader {
    fn is_annotation(&self) -> bool {
        self.label == ANNOTATIONS_LABEL
    }

    fn gain(&self) -> f64 {
        (self.physical_max - self.physical_min) / (self.digital_max - self.digital_min)
    }
}

/// Read an EDF file into a sample matrix with a leading `time` column (ms).
pub fn read_edf(path: &Path) -> Result<SampleMatrix> {
    let bytes = std::fs::read(path).context("reading EDF file")?;
    parse_edf(&bytes)
}

/// Parse an in-memory EDF file.
///
/// Annotation signals are skipped. Every remaining signal must share one
/// samples-per-record value. Repeated labels get `-0`, `-1`, ... suffixes.
pub fn parse_edf(bytes: &[u8]) -> Result<SampleMatrix> {
    ensure!(
        bytes.len() >= FIXED_HEADER_LEN,
        "file is {} bytes, shorter than the EDF header",
        bytes.len()
    );

    let header_len: usize = parse_field(bytes, 184, 8, "header length")?;
    let n_records_raw: i64 = parse_field(bytes, 236, 8, "number of data records")?;
    let record_duration: f64 = parse_field(bytes, 244, 8, "data record duration")?;
    let ns: usize = parse_field(bytes, 252, 4, "number of signals")?;

    ensure!(ns > 0, "EDF file declares no signals");
    ensure!(
        header_len == FIXED_HEADER_LEN + ns * SIGNAL_HEADER_LEN,
        "header length {header_len} does not match {ns} signals"
    );
    ensure!(bytes.len() >= header_len, "truncated signal headers");

    let signals = parse_signal_headers(bytes, ns)?;

    let record_len: usize = signals.iter().map(|s| s.samples_per_record * 2).sum();
    ensure!(record_len > 0, "data records are empty");
    let available = (bytes.len() - header_len) / record_len;
    let n_records = if n_records_raw < 0 {
        available
    } else {
        let declared = n_records_raw as usize;
        ensure!(
            declared <= available,
            "header declares {declared} data records, file holds {available}"
        );
        declared
    };

    let picked: Vec<usize> = (0..ns).filter(|&i| !signals[i].is_annotation()).collect();
    ensure!(!picked.is_empty(), "EDF file has only annotation signals");

    let spr = signals[picked[0]].samples_per_record;
    if let Some(&odd) = picked.iter().find(|&&i| signals[i].samples_per_record != spr) {
        bail!(
            "signal '{}' has {} samples per record, expected {spr}",
            signals[odd].label,
            signals[odd].samples_per_record
        );
    }
    for &i in &picked {
        ensure!(
            signals[i].digital_max > signals[i].digital_min,
            "signal '{}' has an empty digital range",
            signals[i].label
        );
    }

    // Byte offset of each signal inside one record.
    let mut offsets = Vec::with_capacity(ns);
    let mut acc = 0;
    for s in &signals {
        offsets.push(acc);
        acc += s.samples_per_record * 2;
    }

    let n_samples = n_records * spr;
    let mut data: Vec<Vec<f64>> = picked.iter().map(|_| Vec::with_capacity(n_samples)).collect();

    for record in 0..n_records {
        let base = header_len + record * record_len;
        for (col, &sig) in picked.iter().enumerate() {
            let header = &signals[sig];
            let gain = header.gain();
            let start = base + offsets[sig];
            let chunk = &bytes[start..start + spr * 2];
            data[col].extend(chunk.chunks_exact(2).map(|pair| {
                let digital = LittleEndian::read_i16(pair) as f64;
                (digital - header.digital_min) * gain + header.physical_min
            }));
        }
    }

    let labels = disambiguate(picked.iter().map(|&i| signals[i].label.clone()).collect());

    let step_ms = record_duration * 1000.0 / spr as f64;
    let time: Vec<f64> = (0..n_samples).map(|i| i as f64 * step_ms).collect();

    let mut columns = Vec::with_capacity(labels.len() + 1);
    columns.push(TIME_CHANNEL.to_string());
    columns.extend(labels);
    let mut all = Vec::with_capacity(data.len() + 1);
    all.push(time);
    all.extend(data);

    SampleMatrix::new(columns, all)
}

fn parse_signal_headers(bytes: &[u8], ns: usize) -> Result<Vec<SignalHeader>> {
    // Start offset of each field block.
    let mut starts = [0usize; SIGNAL_FIELDS.len()];
    let mut at = FIXED_HEADER_LEN;
    for (slot, width) in starts.iter_mut().zip(SIGNAL_FIELDS) {
        *slot = at;
        at += width * ns;
    }

    (0..ns)
        .map(|i| -> Result<SignalHeader> {
            let pos = |field: usize| starts[field] + i * SIGNAL_FIELDS[field];
            let label = field_str(bytes, pos(0), SIGNAL_FIELDS[0])?.to_string();
            let ctx = |what: &str| format!("signal {i} ('{label}') {what}");
            Ok(SignalHeader {
                physical_min: parse_field(bytes, pos(3), 8, &ctx("physical minimum"))?,
                physical_max: parse_field(bytes, pos(4), 8, &ctx("physical maximum"))?,
                digital_min: parse_field(bytes, pos(5), 8, &ctx("digital minimum"))?,
                digital_max: parse_field(bytes, pos(6), 8, &ctx("digital maximum"))?,
                samples_per_record: parse_field(bytes, pos(8), 8, &ctx("samples per record"))?,
                label,
            })
        })
        .collect()
}

fn field_str(bytes: &[u8], offset: usize, len: usize) -> Result<&str> {
    let raw = bytes
        .get(offset..offset + len)
        .with_context(|| format!("header field at byte {offset} is out of range"))?;
    let text = std::str::from_utf8(raw)
        .with_context(|| format!("header field at byte {offset} is not ASCII"))?;
    Ok(text.trim())
}

fn parse_field<T>(bytes: &[u8], offset: usize, len: usize, what: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text = field_str(bytes, offset, len)?;
    text.parse::<T>()
        .with_context(|| format!("{what}: '{text}' is not a number"))
}

/// Suffix every occurrence of a repeated label with its occurrence index.
fn disambiguate(labels: Vec<String>) -> Vec<String> {
    let mut totals: BTreeMap<String, usize> = BTreeMap::new();
    for label in &labels {
        *totals.entry(label.clone()).or_default() += 1;
    }
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    labels
        .into_iter()
        .map(|label| {
            if totals[&label] < 2 {
                return label;
            }
            let k = seen.entry(label.clone()).or_default();
            let renamed = format!("{label}-{k}");
            *k += 1;
            renamed
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// One signal to write: its label and physical samples.
#[derive(Debug, Clone)]
pub struct EdfSignal {
    pub label: String,
    pub samples: Vec<f64>,
}

/// Write signals as an EDF file with one-second data records.
///
/// All signals must have the same length, a multiple of `sample_rate`.
/// Physical ranges are taken from the data, so values round-trip up to the
/// 16-bit quantization step.
pub fn write_edf(path: &Path, signals: &[EdfSignal], sample_rate: usize) -> Result<()> {
    ensure!(!signals.is_empty(), "nothing to write");
    ensure!(sample_rate > 0, "sample rate must be positive");
    let n = signals[0].samples.len();
    for s in signals {
        ensure!(
            s.samples.len() == n,
            "signal '{}' has {} samples, expected {n}",
            s.label,
            s.samples.len()
        );
    }
    ensure!(
        n % sample_rate == 0,
        "{n} samples is not a whole number of {sample_rate}-sample records"
    );
    let n_records = n / sample_rate;
    let ns = signals.len();

    let mut ranges = Vec::with_capacity(ns);
    for s in signals {
        let lo = s.samples.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = s.samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        ensure!(lo.is_finite() && hi.is_finite(), "signal '{}' is not finite", s.label);
        let (lo, hi) = if lo == hi { (lo - 1.0, hi + 1.0) } else { (lo, hi) };
        let lo_text = fit_number(lo, Rounding::Down)?;
        let hi_text = fit_number(hi, Rounding::Up)?;
        ranges.push((lo_text, hi_text));
    }

    let mut header = String::with_capacity(FIXED_HEADER_LEN + ns * SIGNAL_HEADER_LEN);
    push_field(&mut header, "0", 8)?;
    push_field(&mut header, "X X X X", 80)?;
    push_field(&mut header, "Startdate X X X X", 80)?;
    push_field(&mut header, "01.01.00", 8)?;
    push_field(&mut header, "00.00.00", 8)?;
    push_field(&mut header, &(FIXED_HEADER_LEN + ns * SIGNAL_HEADER_LEN).to_string(), 8)?;
    push_field(&mut header, "", 44)?;
    push_field(&mut header, &n_records.to_string(), 8)?;
    push_field(&mut header, "1", 8)?;
    push_field(&mut header, &ns.to_string(), 4)?;

    for s in signals {
        push_field(&mut header, &s.label, 16)?;
    }
    for _ in signals {
        push_field(&mut header, "", 80)?;
    }
    for _ in signals {
        push_field(&mut header, "uV", 8)?;
    }
    for (lo, _) in &ranges {
        push_field(&mut header, lo, 8)?;
    }
    for (_, hi) in &ranges {
        push_field(&mut header, hi, 8)?;
    }
    for _ in signals {
        push_field(&mut header, &DIGITAL_MIN.to_string(), 8)?;
    }
    for _ in signals {
        push_field(&mut header, &DIGITAL_MAX.to_string(), 8)?;
    }
    for _ in signals {
        push_field(&mut header, "", 80)?;
    }
    for _ in signals {
        push_field(&mut header, &sample_rate.to_string(), 8)?;
    }
    for _ in signals {
        push_field(&mut header, "", 32)?;
    }

    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut out = BufWriter::new(file);
    out.write_all(header.as_bytes())?;

    let scales: Vec<(f64, f64)> = ranges
        .iter()
        .map(|(lo, hi)| -> Result<(f64, f64)> {
            let lo: f64 = lo.parse()?;
            let hi: f64 = hi.parse()?;
            let gain = (hi - lo) / (DIGITAL_MAX as f64 - DIGITAL_MIN as f64);
            Ok((lo, gain))
        })
        .collect::<Result<_>>()?;

    for record in 0..n_records {
        let window = record * sample_rate..(record + 1) * sample_rate;
        for (s, &(lo, gain)) in signals.iter().zip(&scales) {
            for &v in &s.samples[window.clone()] {
                let digital = ((v - lo) / gain + DIGITAL_MIN as f64).round();
                let digital = digital.clamp(DIGITAL_MIN as f64, DIGITAL_MAX as f64) as i16;
                out.write_i16::<LittleEndian>(digital)?;
            }
        }
    }
    out.flush()?;
    Ok(())
}

#[derive(Clone, Copy)]
enum Rounding {
    Down,
    Up,
}

/// Render `v` in at most 8 characters, rounding outward so the written
/// range still covers the data.
fn fit_number(v: f64, rounding: Rounding) -> Result<String> {
    for decimals in (0..=6).rev() {
        let scale = 10f64.powi(decimals);
        let r = match rounding {
            Rounding::Down => (v * scale).floor() / scale,
            Rounding::Up => (v * scale).ceil() / scale,
        };
        let text = format!("{r:.prec$}", prec = decimals as usize);
        if text.len() <= 8 {
            return Ok(text);
        }
    }
    bail!("physical value {v} does not fit an 8-character EDF field")
}

fn push_field(header: &mut String, value: &str, width: usize) -> Result<()> {
    ensure!(value.is_ascii(), "header value '{value}' is not ASCII");
    ensure!(
        value.len() <= width,
        "header value '{value}' exceeds {width} characters"
    );
    header.push_str(value);
    header.extend(std::iter::repeat(' ').take(width - value.len()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(label: &str, samples: Vec<f64>) -> EdfSignal {
        EdfSignal {
            label: label.to_string(),
            samples,
        }
    }

    #[test]
    fn write_then_read_keeps_labels_and_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rec.edf");
        let a: Vec<f64> = (0..8).map(|i| i as f64 * 10.0 - 35.0).collect();
        let b: Vec<f64> = (0..8).map(|i| (i as f64).sin()).collect();
        write_edf(&path, &[signal("FP1-F7", a.clone()), signal("F7-T7", b.clone())], 4).unwrap();

        let m = read_edf(&path).unwrap();
        assert_eq!(m.columns(), ["time", "FP1-F7", "F7-T7"]);
        assert_eq!(m.n_rows(), 8);

        let time = m.column("time").unwrap();
        assert_eq!(time[1], 250.0);
        assert_eq!(time[7], 1750.0);

        for (got, want) in m.column("FP1-F7").unwrap().iter().zip(&a) {
            assert!((got - want).abs() < 1e-2, "{got} vs {want}");
        }
        for (got, want) in m.column("F7-T7").unwrap().iter().zip(&b) {
            assert!((got - want).abs() < 1e-3, "{got} vs {want}");
        }
    }

    #[test]
    fn duplicate_labels_get_occurrence_suffixes() {
        let labels = vec!["T8-P8".to_string(), "FZ-CZ".into(), "T8-P8".into()];
        assert_eq!(disambiguate(labels), ["T8-P8-0", "FZ-CZ", "T8-P8-1"]);
    }

    #[test]
    fn unknown_record_count_is_derived_from_file_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rec.edf");
        write_edf(&path, &[signal("A", vec![1.0, 2.0, 3.0, 4.0])], 2).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        bytes[236..244].copy_from_slice(b"-1      ");
        let m = parse_edf(&bytes).unwrap();
        assert_eq!(m.n_rows(), 4);
    }

    #[test]
    fn truncated_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rec.edf");
        write_edf(&path, &[signal("A", vec![1.0, 2.0, 3.0, 4.0])], 2).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let err = parse_edf(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(err.to_string().contains("declares 2 data records"));
        assert!(parse_edf(&bytes[..100]).is_err());
    }

    #[test]
    fn fit_number_rounds_outward() {
        assert_eq!(fit_number(-1234.56789, Rounding::Down).unwrap(), "-1234.57");
        assert_eq!(fit_number(1234.56789, Rounding::Up).unwrap(), "1234.568");
        assert_eq!(fit_number(0.5, Rounding::Up).unwrap(), "0.500000");
    }
}
