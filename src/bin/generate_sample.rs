use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use channel_variance::config::DEFAULT_CHANNELS;
use channel_variance::data::edf::{EdfSignal, write_edf};

/// Write a synthetic EDF collection laid out as `<out>/chbNN/chbNN_MM.edf`.
#[derive(Parser)]
#[command(about = "Generate a synthetic multi-channel EEG dataset")]
struct Cli {
    /// Output directory
    #[arg(long, default_value = "sample_data")]
    out: PathBuf,

    /// Number of groups (subjects)
    #[arg(long, default_value_t = 3)]
    groups: u32,

    /// Recordings per group
    #[arg(long, default_value_t = 4)]
    files: u32,

    /// Seconds per recording
    #[arg(long, default_value_t = 30)]
    seconds: usize,

    /// Samples per second
    #[arg(long, default_value_t = 256)]
    rate: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

/// Seeded splitmix64 stream; enough for reproducible synthetic traces.
struct Noise(u64);

impl Noise {
    fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }

    /// Uniform in `[0, 1)`.
    fn uniform(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Normal deviate (Box-Muller).
    fn normal(&mut self, mean: f64, std_dev: f64) -> f64 {
        let radius = (-2.0 * (1.0 - self.uniform()).ln()).sqrt();
        mean + std_dev * radius * (std::f64::consts::TAU * self.uniform()).cos()
    }
}

/// Labels as they appear in the recordings: the montage without `time`,
/// `T8-P8` written twice, and an ECG lead outside the whitelist.
fn recorded_labels() -> Vec<String> {
    DEFAULT_CHANNELS
        .iter()
        .filter(|c| **c != "time")
        .map(|c| c.trim_end_matches("-0").trim_end_matches("-1").to_string())
        .chain(std::iter::once("ECG".to_string()))
        .collect()
}

/// Alpha-band oscillation plus white noise.
fn eeg_trace(rng: &mut Noise, n: usize, rate: usize, amplitude: f64, offset: f64) -> Vec<f64> {
    let freq = 8.0 + rng.uniform() * 5.0;
    let phase = rng.uniform() * std::f64::consts::TAU;
    (0..n)
        .map(|i| {
            let t = i as f64 / rate as f64;
            offset
                + amplitude * (std::f64::consts::TAU * freq * t + phase).sin()
                + rng.normal(0.0, amplitude * 0.3)
        })
        .collect()
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut rng = Noise(cli.seed);
    let labels = recorded_labels();
    let n = cli.seconds * cli.rate;

    for group in 1..=cli.groups {
        let dir = cli.out.join(format!("chb{group:02}"));
        std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;

        // Each subject has one noisier lead.
        let loud = (rng.next_u64() % (labels.len() as u64 - 1)) as usize;

        for file in 1..=cli.files {
            let signals: Vec<EdfSignal> = labels
                .iter()
                .enumerate()
                .map(|(i, label)| {
                    let amplitude = if i == loud { 120.0 } else { 20.0 + 10.0 * rng.uniform() };
                    let offset = rng.normal(0.0, 5.0);
                    EdfSignal {
                        label: label.clone(),
                        samples: eeg_trace(&mut rng, n, cli.rate, amplitude, offset),
                    }
                })
                .collect();

            let path = dir.join(format!("chb{group:02}_{file:02}.edf"));
            write_edf(&path, &signals, cli.rate)
                .with_context(|| format!("writing {}", path.display()))?;
        }
        println!("chb{group:02}: {} recordings, loud lead {}", cli.files, labels[loud]);
    }

    println!(
        "Wrote {} groups x {} recordings ({} channels, {n} samples each) to {}",
        cli.groups,
        cli.files,
        labels.len(),
        cli.out.display()
    );
    Ok(())
}
