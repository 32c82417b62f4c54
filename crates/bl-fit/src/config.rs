//! Calibration settings shared (read-only) by every channel.

use bl_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::classify::ClassifierConfig;

/// Settings for one calibration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CalibrationConfig {
    /// Adjacent amplitude bins merged before projecting channels.
    pub rebin: usize,
    /// Channels with fewer entries are not fitted.
    pub min_stats: f64,
    /// Channels with a smaller RMS are flagged dead.
    pub dead_rms: f64,
    /// Trimmed-fit half-width in units of sigma.
    pub sigma_range: f64,
    /// Fraction of the maximum bin content that seeds the lower fit bound.
    pub peak_fraction: f64,
    /// Rounds of 353QH smoothing applied to each channel histogram.
    pub smooth_passes: usize,
    /// Channels per hybrid histogram.
    pub channels_per_module: usize,
    /// Upper fit bound sits this many bin widths below the DAQ threshold.
    pub threshold_margin_bins: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            rebin: 1,
            min_stats: 8000.0,
            dead_rms: 5.0,
            sigma_range: 1.0,
            peak_fraction: 0.25,
            smooth_passes: 1,
            channels_per_module: 640,
            threshold_margin_bins: 1.0,
        }
    }
}

impl CalibrationConfig {
    /// Reject settings the calibration cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.rebin == 0 {
            return Err(Error::Validation("rebin must be positive".into()));
        }
        if !(self.sigma_range > 0.0) {
            return Err(Error::Validation(format!(
                "sigma_range must be positive, got {}",
                self.sigma_range
            )));
        }
        // No bin is strictly above the maximum, so 1 would never seed a window.
        if !(self.peak_fraction > 0.0 && self.peak_fraction < 1.0) {
            return Err(Error::Validation(format!(
                "peak_fraction must be in (0, 1), got {}",
                self.peak_fraction
            )));
        }
        if self.channels_per_module == 0 {
            return Err(Error::Validation("channels_per_module must be positive".into()));
        }
        if !self.min_stats.is_finite() || !self.dead_rms.is_finite() {
            return Err(Error::Validation("min_stats and dead_rms must be finite".into()));
        }
        Ok(())
    }

    /// Thresholds used by the classifier.
    pub fn classifier(&self) -> ClassifierConfig {
        ClassifierConfig { dead_rms: self.dead_rms, min_stats: self.min_stats }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        CalibrationConfig::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_bad_values() {
        let bad = [
            CalibrationConfig { rebin: 0, ..Default::default() },
            CalibrationConfig { sigma_range: 0.0, ..Default::default() },
            CalibrationConfig { peak_fraction: 1.5, ..Default::default() },
            CalibrationConfig { peak_fraction: 0.0, ..Default::default() },
            CalibrationConfig { peak_fraction: 1.0, ..Default::default() },
            CalibrationConfig { channels_per_module: 0, ..Default::default() },
            CalibrationConfig { min_stats: f64::NAN, ..Default::default() },
        ];
        for cfg in bad {
            assert!(cfg.validate().is_err(), "{cfg:?} should be rejected");
        }
    }
}
