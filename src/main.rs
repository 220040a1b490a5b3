use std::path::PathBuf;

use anyhow::{Context, Result};
use arrow::util::pretty::pretty_format_batches;
use clap::{Parser, ValueEnum};

use channel_variance::cache::FlowKey;
use channel_variance::config::Config;
use channel_variance::data::loader::FileDecoder;
use channel_variance::flows::{Analysis, FlowOutput};
use channel_variance::progress::{BarProgress, LogProgress, Progress};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(about = "Per-channel variance over a collection of EEG recordings")]
struct Cli {
    /// Dataset root holding one directory per group
    root: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// First group id (inclusive)
    #[arg(long)]
    start: Option<u32>,

    /// Last group id (exclusive)
    #[arg(long)]
    end: Option<u32>,

    /// Recording file extension
    #[arg(long)]
    extension: Option<String>,

    /// Which analysis to run
    #[arg(long, value_enum, default_value_t = Flow::All)]
    flow: Flow,

    /// Discard cached results before running
    #[arg(long)]
    refresh: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Log progress instead of drawing progress bars
    #[arg(long)]
    no_progress: bool,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Flow {
    Accumulated,
    ByFile,
    ByGroup,
    All,
}

impl Flow {
    fn keys(self) -> Vec<FlowKey> {
        match self {
            Flow::Accumulated => vec![FlowKey::Accumulated],
            Flow::ByFile => vec![FlowKey::ByFile],
            Flow::ByGroup => vec![FlowKey::ByGroup],
            Flow::All => FlowKey::ALL.to_vec(),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let config = build_config(&cli)?;
    config.validate()?;
    log::info!(
        "dataset {} groups {}..{}",
        config.dataset_root.display(),
        config.group_start,
        config.group_end
    );

    let progress: Box<dyn Progress> = if cli.no_progress {
        Box::new(LogProgress)
    } else {
        Box::new(BarProgress::new())
    };
    let decoder = FileDecoder;
    let analysis = Analysis::new(&config, &decoder, progress.as_ref());

    for key in cli.flow.keys() {
        if cli.refresh {
            analysis.cache().invalidate(key)?;
        }
        let output = analysis.run(key).with_context(|| format!("running {key}"))?;
        print_output(key, &output, cli.json)?;
    }
    Ok(())
}

fn build_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(root) = &cli.root {
        config.dataset_root = root.clone();
    }
    if let Some(start) = cli.start {
        config.group_start = start;
    }
    if let Some(end) = cli.end {
        config.group_end = end;
    }
    if let Some(ext) = &cli.extension {
        config.extension = ext.clone();
    }
    Ok(config)
}

fn print_output(key: FlowKey, output: &FlowOutput, json: bool) -> Result<()> {
    if json {
        let value = match output {
            FlowOutput::Variance(t) => serde_json::to_value(t)?,
            FlowOutput::Rank(t) => serde_json::to_value(t)?,
        };
        let doc = serde_json::json!({ "flow": key.as_str(), "result": value });
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else {
        let batch = output.to_record_batch()?;
        println!("{key}");
        println!("{}", pretty_format_batches(&[batch])?);
    }
    Ok(())
}
