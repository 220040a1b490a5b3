#![allow(dead_code)]

use std::cell::Cell;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use channel_variance::Result;
use channel_variance::config::Config;
use channel_variance::data::filter::ChannelWhitelist;
use channel_variance::data::loader::{Decoder, FileDecoder};
use channel_variance::data::model::SampleMatrix;

/// `n` samples with exactly the requested mean and sample variance.
pub fn series(n: usize, mean: f64, var: f64, seed: usize) -> Vec<f64> {
    let raw: Vec<f64> = (0..n).map(|i| (((i + seed) * 7919) % 97) as f64).collect();
    let m = raw.iter().sum::<f64>() / n as f64;
    let v = raw.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (n as f64 - 1.0);
    let scale = (var / v).sqrt();
    raw.iter().map(|x| mean + (x - m) * scale).collect()
}

pub fn sample_variance(xs: &[f64]) -> f64 {
    let n = xs.len() as f64;
    let mean = xs.iter().sum::<f64>() / n;
    xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0)
}

pub fn close(a: f64, b: f64, rel: f64) -> bool {
    (a - b).abs() <= rel * a.abs().max(b.abs())
}

/// Write a CSV recording: a `time` column in ms followed by the channels.
pub fn write_csv(path: &Path, channels: &[(&str, Vec<f64>)]) {
    let n = channels[0].1.len();
    let mut text = String::from("time");
    for (name, _) in channels {
        write!(text, ",{name}").unwrap();
    }
    text.push('\n');
    for row in 0..n {
        write!(text, "{}", row as f64 * 4.0).unwrap();
        for (_, col) in channels {
            write!(text, ",{}", col[row]).unwrap();
        }
        text.push('\n');
    }
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, text).unwrap();
}

pub fn recording(root: &Path, group: u32, file: u32) -> PathBuf {
    root.join(format!("chb{group:02}"))
        .join(format!("chb{group:02}_{file:02}.csv"))
}

pub fn csv_config(root: &Path, groups: std::ops::Range<u32>, channels: &[&str]) -> Config {
    Config {
        dataset_root: root.to_path_buf(),
        group_start: groups.start,
        group_end: groups.end,
        extension: "csv".to_string(),
        channels: ChannelWhitelist::new(channels.iter().copied()),
        ..Config::default()
    }
}

/// File decoder that counts how often it is called.
#[derive(Default)]
pub struct CountingDecoder {
    pub calls: Cell<usize>,
}

impl Decoder for CountingDecoder {
    fn decode(&self, path: &Path) -> Result<SampleMatrix> {
        self.calls.set(self.calls.get() + 1);
        FileDecoder.decode(path)
    }
}
