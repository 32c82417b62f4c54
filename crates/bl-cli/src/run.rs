//! `blfit calibrate` run configuration.
//!
//! A YAML (or JSON) file names the inputs and carries the calibration settings;
//! command-line flags override individual fields. Relative paths in the file are
//! resolved against the file's directory.

use anyhow::{Context, Result, anyhow};
use bl_fit::CalibrationConfig;
use bl_io::OutputFormat;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Histogram input file (JSON).
    #[serde(default)]
    pub input: Option<PathBuf>,
    /// DAQ thresholds file.
    #[serde(default)]
    pub thresholds: Option<PathBuf>,
    /// Output table. Defaults to stdout.
    #[serde(default)]
    pub output: Option<PathBuf>,
    #[serde(default)]
    pub format: Option<OutputFormat>,
    /// Only calibrate histograms of this layer, e.g. `L1`.
    #[serde(default)]
    pub layer: Option<String>,
    /// Threads (0 = auto). Use 1 for deterministic parity.
    #[serde(default)]
    pub threads: Option<usize>,
    #[serde(default)]
    pub calibration: CalibrationConfig,
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub input: Option<PathBuf>,
    pub thresholds: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub format: Option<OutputFormat>,
    pub layer: Option<String>,
    pub threads: Option<usize>,
    pub rebin: Option<usize>,
    pub min_stats: Option<f64>,
    pub dead_rms: Option<f64>,
}

/// Fully resolved run.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub input: PathBuf,
    pub thresholds: PathBuf,
    pub output: Option<PathBuf>,
    pub format: OutputFormat,
    pub layer: Option<String>,
    pub threads: usize,
    pub calibration: CalibrationConfig,
}

pub fn read_run_config(path: &Path) -> Result<RunConfig> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("").to_ascii_lowercase();
    let mut cfg: RunConfig = if ext == "json" {
        serde_json::from_slice(&bytes)?
    } else {
        serde_yaml_ng::from_slice(&bytes)?
    };

    let base = path.parent().unwrap_or(Path::new("."));
    for p in [&mut cfg.input, &mut cfg.thresholds, &mut cfg.output].into_iter().flatten() {
        if p.is_relative() {
            *p = base.join(&*p);
        }
    }
    Ok(cfg)
}

impl RunConfig {
    pub fn resolve(self, o: Overrides) -> Result<RunPlan> {
        let mut calibration = self.calibration;
        if let Some(rebin) = o.rebin {
            calibration.rebin = rebin;
        }
        if let Some(min_stats) = o.min_stats {
            calibration.min_stats = min_stats;
        }
        if let Some(dead_rms) = o.dead_rms {
            calibration.dead_rms = dead_rms;
        }
        calibration.validate()?;

        Ok(RunPlan {
            input: o.input.or(self.input).ok_or_else(|| anyhow!("no histogram input given"))?,
            thresholds: o
                .thresholds
                .or(self.thresholds)
                .ok_or_else(|| anyhow!("no thresholds file given"))?,
            output: o.output.or(self.output),
            format: o.format.or(self.format).unwrap_or_default(),
            layer: o.layer.or(self.layer),
            threads: o.threads.or(self.threads).unwrap_or(1),
            calibration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_file() {
        let cfg: RunConfig = serde_yaml_ng::from_str(
            "input: a.json\nthresholds: t.dat\nformat: json\nthreads: 4\ncalibration:\n  rebin: 2\n  min_stats: 500\n",
        )
        .unwrap();
        let plan = cfg
            .resolve(Overrides {
                input: Some("b.json".into()),
                min_stats: Some(100.0),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(plan.input, PathBuf::from("b.json"));
        assert_eq!(plan.thresholds, PathBuf::from("t.dat"));
        assert_eq!(plan.format, OutputFormat::Json);
        assert_eq!(plan.threads, 4);
        assert_eq!(plan.calibration.rebin, 2);
        assert_eq!(plan.calibration.min_stats, 100.0);
        assert_eq!(plan.calibration.dead_rms, 5.0);
    }

    #[test]
    fn test_missing_input_and_bad_settings() {
        let err = RunConfig::default().resolve(Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("input"));

        let cfg = RunConfig { input: Some("a".into()), thresholds: Some("t".into()), ..Default::default() };
        assert!(cfg.resolve(Overrides { rebin: Some(0), ..Default::default() }).is_err());
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(serde_yaml_ng::from_str::<RunConfig>("inptu: a.json\n").is_err());
        assert!(serde_yaml_ng::from_str::<RunConfig>("calibration:\n  rebinn: 2\n").is_err());
    }
}
