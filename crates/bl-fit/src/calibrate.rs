//! Per-channel and per-module calibration drivers.
//!
//! `calibrate_channel` runs screen → seed → trimmed fit → classify on one already
//! projected channel histogram. `calibrate_module` does the projection for every
//! channel of a hybrid, resolving IDs and thresholds through the [`ChannelMapping`]
//! and [`ThresholdSource`] seams.

use bl_core::{ChannelRecord, Error, FitWindow, HybridId, Result};
use bl_hist::{Histogram, Histogram2D};
use rayon::prelude::*;

use crate::classify::{ChannelStats, FitOutcome, ShapeSummary, classify, screen};
use crate::config::CalibrationConfig;
use crate::seed::seed_window;
use crate::trimmed::{TrimConfig, iterative_gauss_fit};

/// Resolves hardware addresses and global detector IDs.
pub trait ChannelMapping: Send + Sync {
    /// Hybrid a module histogram belongs to, from its name.
    fn hybrid_for(&self, histogram_name: &str) -> Option<HybridId>;

    /// Global ID of `channel` on `hybrid`. `None` past the hybrid's last channel.
    fn svt_id(&self, hybrid: HybridId, channel: u32) -> Option<u32>;
}

/// Per-channel DAQ thresholds.
pub trait ThresholdSource: Send + Sync {
    /// Threshold for `channel` on `hybrid`, in amplitude units.
    fn threshold(&self, hybrid: HybridId, channel: u32) -> Option<f64>;
}

/// One channel ready for calibration.
#[derive(Debug, Clone)]
pub struct ChannelInput {
    /// Module histogram name.
    pub halfmodule: String,
    /// Channel index within the hybrid.
    pub channel: u32,
    /// Global detector ID.
    pub svt_id: u32,
    /// DAQ threshold for the channel.
    pub threshold: f64,
    /// Projected (and smoothed) amplitude histogram.
    pub histogram: Histogram,
}

/// Calibration driver holding the run configuration.
pub struct ChannelCalibrator {
    config: CalibrationConfig,
    pool: Option<rayon::ThreadPool>,
}

impl ChannelCalibrator {
    /// Sequential calibrator.
    pub fn new(config: CalibrationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, pool: None })
    }

    /// Run channels of a module on `threads` workers (0 = one per core, 1 = sequential).
    ///
    /// Records come back in channel order regardless.
    pub fn with_threads(mut self, threads: usize) -> Result<Self> {
        self.pool = if threads == 1 {
            None
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| Error::Validation(format!("failed to build thread pool: {e}")))?;
            Some(pool)
        };
        Ok(self)
    }

    /// Configuration in effect.
    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    /// Project one channel out of an (already rebinned) module histogram and smooth it.
    pub fn prepare_channel(&self, module: &Histogram2D, channel: usize) -> Result<Histogram> {
        let mut hist = module.projection_y(channel)?;
        hist.smooth(self.config.smooth_passes)?;
        Ok(hist)
    }

    /// Calibrate one channel.
    ///
    /// # Errors
    /// Only unexpected failures propagate; degenerate fits become `badfit` records and
    /// low statistics become `lowStats` records.
    pub fn calibrate_channel(&self, input: &ChannelInput) -> Result<ChannelRecord> {
        let hist = &input.histogram;
        let entries = hist.entries;
        let rms = hist.rms();
        let peak_seed = hist.first_bin_above(self.config.peak_fraction * hist.maximum());
        let upper =
            input.threshold - self.config.threshold_margin_bins * hist.bin_width(peak_seed.unwrap_or(0));

        let stats = ChannelStats { entries, rms, peak_seed_found: peak_seed.is_some() };
        let classifier = self.config.classifier();
        let (_, low_stats) = screen(&stats, &classifier);

        let outcome = match peak_seed {
            Some(seed) if !low_stats => self.fit_channel(hist, seed, upper, input.threshold)?,
            _ => FitOutcome::NotAttempted,
        };
        let flags = classify(&stats, &classifier, &outcome);
        if !flags.is_clean() {
            log::debug!("{} ch{}: {:?}", input.halfmodule, input.channel, flags.names());
        }

        let (fit, window) = match outcome {
            FitOutcome::Fitted { fit, window, .. } => (Some(fit), Some(window)),
            FitOutcome::Degenerate { window } => (None, Some(window)),
            FitOutcome::NotAttempted => (None, None),
        };

        Ok(ChannelRecord {
            halfmodule: input.halfmodule.clone(),
            channel: input.channel,
            svt_id: input.svt_id,
            min_stats: self.config.min_stats,
            rebin: self.config.rebin as f64,
            entries,
            rms,
            threshold: upper,
            flags,
            fit,
            window,
        })
    }

    fn fit_channel(&self, hist: &Histogram, seed: usize, upper: f64, threshold: f64) -> Result<FitOutcome> {
        let lower = hist.bin_low_edge(seed);
        let initial = seed_window(hist, Some(lower), Some(upper), lower, threshold)?;
        let trim = TrimConfig::new(self.config.sigma_range, lower, threshold);
        match iterative_gauss_fit(hist, initial, &trim) {
            Ok(trimmed) => Ok(FitOutcome::Fitted {
                fit: trimmed.fit,
                window: trimmed.window,
                shape: ShapeSummary::probe(hist, trimmed.window),
            }),
            Err(Error::FitDegeneracy { reason, min, max }) => {
                log::warn!("{}: degenerate fit in [{min}, {max}]: {reason}", hist.name);
                Ok(FitOutcome::Degenerate { window: FitWindow::new(min, max) })
            }
            Err(e) => Err(e),
        }
    }

    /// Calibrate every channel of one hybrid histogram.
    ///
    /// Channels without a global ID or a threshold are skipped, and a failing channel
    /// is logged and skipped; neither stops the module.
    pub fn calibrate_module(
        &self,
        module: &Histogram2D,
        mapping: &dyn ChannelMapping,
        thresholds: &dyn ThresholdSource,
    ) -> Result<Vec<ChannelRecord>> {
        module.validate()?;
        let hybrid =
            mapping.hybrid_for(&module.name).ok_or_else(|| Error::UnknownModule(module.name.clone()))?;
        let rebinned = module.rebin_y(self.config.rebin)?;

        let n_channels = self.config.channels_per_module.min(rebinned.n_x());
        if n_channels < self.config.channels_per_module {
            log::debug!(
                "{}: histogram has {} channels, expected {}",
                module.name,
                rebinned.n_x(),
                self.config.channels_per_module
            );
        }
        log::info!("{} ({hybrid}): calibrating {n_channels} channels", module.name);

        let run = |ch: usize| -> Option<ChannelRecord> {
            if ch % 100 == 0 {
                log::info!("{}: channel {ch}", module.name);
            }
            let channel = ch as u32;
            let svt_id = mapping.svt_id(hybrid, channel)?;
            let Some(threshold) = thresholds.threshold(hybrid, channel) else {
                log::warn!("{} ch{ch}: no threshold for {hybrid}, skipping", module.name);
                return None;
            };
            let result = self.prepare_channel(&rebinned, ch).and_then(|histogram| {
                self.calibrate_channel(&ChannelInput {
                    halfmodule: module.name.clone(),
                    channel,
                    svt_id,
                    threshold,
                    histogram,
                })
            });
            match result {
                Ok(record) => Some(record),
                Err(e) => {
                    log::warn!("{} ch{ch}: {e}", module.name);
                    None
                }
            }
        };

        let records: Vec<ChannelRecord> = match &self.pool {
            Some(pool) => pool.install(|| (0..n_channels).into_par_iter().filter_map(run).collect()),
            None => (0..n_channels).filter_map(run).collect(),
        };
        Ok(records)
    }
}

/// Names selected for calibration, sorted. With a `layer` filter, keeps names whose
/// prefix before the first `_` contains it (`L1` matches `L1T_axial...`).
pub fn select_histograms<'a, I>(names: I, layer: Option<&str>) -> Vec<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut selected: Vec<&str> = names
        .into_iter()
        .filter(|name| match layer {
            Some(layer) => name.split('_').next().is_some_and(|prefix| prefix.contains(layer)),
            None => true,
        })
        .collect();
    selected.sort_unstable();
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    struct OneHybrid;

    impl ChannelMapping for OneHybrid {
        fn hybrid_for(&self, name: &str) -> Option<HybridId> {
            name.starts_with("L0T").then_some(HybridId::new(0, 0))
        }

        fn svt_id(&self, _hybrid: HybridId, channel: u32) -> Option<u32> {
            (channel < 3).then_some(1000 + channel)
        }
    }

    struct Flat(f64);

    impl ThresholdSource for Flat {
        fn threshold(&self, _hybrid: HybridId, channel: u32) -> Option<f64> {
            (channel != 1).then_some(self.0)
        }
    }

    fn module(n_channels: usize) -> Histogram2D {
        let mut h = Histogram2D::for_channels("L0T_axial_raw", n_channels, 400, 0.0, 400.0).unwrap();
        for ch in 0..n_channels {
            for iy in 0..400 {
                let y = iy as f64 + 0.5;
                let z = (y - 200.0) / 10.0;
                let w = (400.0 * (-0.5 * z * z).exp()).round();
                if w > 0.0 {
                    h.fill(ch as f64 + 0.5, y, w);
                }
            }
        }
        h
    }

    fn calibrator() -> ChannelCalibrator {
        let config = CalibrationConfig { min_stats: 100.0, ..Default::default() };
        ChannelCalibrator::new(config).unwrap()
    }

    #[test]
    fn test_module_skips_unmapped_and_unthresholded_channels() {
        let records = calibrator().calibrate_module(&module(5), &OneHybrid, &Flat(390.0)).unwrap();
        let channels: Vec<u32> = records.iter().map(|r| r.channel).collect();
        assert_eq!(channels, vec![0, 2]);
        assert_eq!(records[1].svt_id, 1002);
        for r in &records {
            assert!(r.flags.is_clean(), "ch{} flagged {:?}", r.channel, r.flags.names());
            let fit = r.fit.unwrap();
            assert_relative_eq!(fit.mean, 200.0, epsilon = 0.5);
            assert_relative_eq!(fit.sigma, 10.0, epsilon = 0.5);
            assert_relative_eq!(r.threshold, 389.0);
        }
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let m = module(5);
        let seq = calibrator().calibrate_module(&m, &OneHybrid, &Flat(390.0)).unwrap();
        let par = calibrator()
            .with_threads(3)
            .unwrap()
            .calibrate_module(&m, &OneHybrid, &Flat(390.0))
            .unwrap();
        assert_eq!(seq, par);
    }

    #[test]
    fn test_unknown_module() {
        let mut m = module(1);
        m.name = "L9X_unknown".into();
        assert!(matches!(
            calibrator().calibrate_module(&m, &OneHybrid, &Flat(390.0)),
            Err(Error::UnknownModule(_))
        ));
    }

    #[test]
    fn test_select_histograms() {
        let names = ["L1T_axial_raw", "L0B_stereo_raw", "L1B_axial_raw", "L10T_axial_raw"];
        assert_eq!(
            select_histograms(names, Some("L1")),
            vec!["L10T_axial_raw", "L1B_axial_raw", "L1T_axial_raw"]
        );
        assert_eq!(select_histograms(names, Some("L0")), vec!["L0B_stereo_raw"]);
        assert_eq!(select_histograms(names, None).len(), 4);
    }
}
