//! blfit CLI

use anyhow::{Context, Result, anyhow, bail};
use bl_core::ChannelRecord;
use bl_fit::{CalibrationConfig, ChannelCalibrator, ChannelInput, ChannelMapping, select_histograms};
use bl_io::{HistogramFile, ModuleMapper, OutputFormat, OutputRow, ThresholdTable, open_sink};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

mod run;

use run::{Overrides, RunConfig, RunPlan};

#[derive(Parser)]
#[command(name = "blfit")]
#[command(about = "blfit - per-channel baseline calibration for strip detectors")]
#[command(version = bl_core::VERSION)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Calibrate every selected module and write one row per channel
    Calibrate {
        /// Run configuration (YAML or JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Histogram input file (JSON). Overrides the config file.
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// DAQ thresholds file. Overrides the config file.
        #[arg(short, long)]
        thresholds: Option<PathBuf>,

        /// Output table. Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format (csv, json)
        #[arg(long)]
        format: Option<OutputFormat>,

        /// Only calibrate histograms of this layer, e.g. L1
        #[arg(long)]
        layer: Option<String>,

        /// Threads (0 = auto). Use 1 for deterministic parity.
        #[arg(long)]
        threads: Option<usize>,

        /// Amplitude rebin factor
        #[arg(long)]
        rebin: Option<usize>,

        /// Minimum entries for a channel to be fitted
        #[arg(long)]
        min_stats: Option<f64>,

        /// Channels with a smaller RMS are flagged dead
        #[arg(long)]
        dead_rms: Option<f64>,
    },

    /// Calibrate a single channel and print its record (pretty JSON)
    FitChannel {
        /// Histogram input file (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Module histogram name
        #[arg(long)]
        histogram: String,

        /// Channel index within the module
        #[arg(long)]
        channel: usize,

        /// DAQ threshold for the channel
        #[arg(long)]
        threshold: f64,

        /// Amplitude rebin factor
        #[arg(long, default_value = "1")]
        rebin: usize,

        /// Minimum entries for the channel to be fitted
        #[arg(long, default_value = "8000")]
        min_stats: f64,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the detector layout: half-module, hardware and software names (pretty JSON)
    Modules {
        /// Output file (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries the output tables
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Calibrate {
            config,
            input,
            thresholds,
            output,
            format,
            layer,
            threads,
            rebin,
            min_stats,
            dead_rms,
        } => {
            let file_config = match &config {
                Some(path) => run::read_run_config(path)?,
                None => RunConfig::default(),
            };
            let plan = file_config.resolve(Overrides {
                input,
                thresholds,
                output,
                format,
                layer,
                threads,
                rebin,
                min_stats,
                dead_rms,
            })?;
            cmd_calibrate(&plan)
        }
        Commands::FitChannel { input, histogram, channel, threshold, rebin, min_stats, output } => {
            let config = CalibrationConfig { rebin, min_stats, ..Default::default() };
            cmd_fit_channel(&input, &histogram, channel, threshold, config, output.as_ref())
        }
        Commands::Modules { output } => cmd_modules(output.as_ref()),
    }
}

fn cmd_calibrate(plan: &RunPlan) -> Result<()> {
    let file = HistogramFile::from_path(&plan.input)
        .with_context(|| format!("loading histograms from {}", plan.input.display()))?;
    tracing::info!(path = %plan.input.display(), histograms = file.histograms.len(), "histograms loaded");

    let table = ThresholdTable::from_path(&plan.thresholds)
        .with_context(|| format!("loading thresholds from {}", plan.thresholds.display()))?;
    tracing::info!(path = %plan.thresholds.display(), apvs = table.len(), "thresholds loaded");

    let mapper = ModuleMapper::layout_2019();
    let calibrator = ChannelCalibrator::new(plan.calibration.clone())?.with_threads(plan.threads)?;

    let names = select_histograms(file.names(), plan.layer.as_deref());
    if names.is_empty() {
        tracing::warn!(layer = ?plan.layer, "no histograms selected");
    }

    let mut sink = open_sink(plan.format, plan.output.as_deref())?;
    let mut n_records = 0usize;
    let mut n_flagged = 0usize;
    for name in names {
        let Some(hist) = file.get(name) else {
            continue;
        };
        tracing::info!(module = name, "calibrating module");
        let records = match calibrator.calibrate_module(hist, &mapper, &table) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(module = name, error = %e, "skipping module");
                continue;
            }
        };
        for record in &records {
            sink.fill(record)?;
            n_flagged += usize::from(!record.flags.is_clean());
        }
        n_records += records.len();
    }
    sink.finish()?;
    tracing::info!(records = n_records, flagged = n_flagged, "records written");

    if let Some(path) = &plan.output {
        eprintln!("Wrote {} ({} channels, {} flagged)", path.display(), n_records, n_flagged);
    }
    Ok(())
}

fn cmd_fit_channel(
    input: &Path,
    histogram: &str,
    channel: usize,
    threshold: f64,
    config: CalibrationConfig,
    output: Option<&PathBuf>,
) -> Result<()> {
    let file = HistogramFile::from_path(input)
        .with_context(|| format!("loading histograms from {}", input.display()))?;
    let hist = file.get(histogram).ok_or_else(|| anyhow!("histogram '{histogram}' not found"))?;

    let mapper = ModuleMapper::layout_2019();
    let hw = mapper
        .hybrid_for(histogram)
        .ok_or_else(|| anyhow!("'{histogram}' does not name a known half-module"))?;
    let Some(svt_id) = mapper.svt_id(hw, channel as u32) else {
        bail!("channel {channel} is not read out on {hw}");
    };

    let calibrator = ChannelCalibrator::new(config)?;
    let rebinned = hist.rebin_y(calibrator.config().rebin)?;
    let projected = calibrator.prepare_channel(&rebinned, channel)?;
    let record = calibrator.calibrate_channel(&ChannelInput {
        halfmodule: histogram.to_string(),
        channel: channel as u32,
        svt_id,
        threshold,
        histogram: projected,
    })?;

    write_json(output, channel_json(&record, hw))
}

fn channel_json(record: &ChannelRecord, hw: bl_core::HybridId) -> serde_json::Value {
    serde_json::json!({
        "hardware": hw.to_string(),
        "flags": record.flags.names(),
        "fit": record.fit,
        "window": record.window,
        "row": OutputRow::from(record),
    })
}

fn cmd_modules(output: Option<&PathBuf>) -> Result<()> {
    let mapper = ModuleMapper::layout_2019();
    write_json(output, serde_json::to_value(mapper.entries())?)
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
