//! Channel quality classification.
//!
//! Flags are decided in a fixed order:
//!
//! 1. `dead`: RMS below the dead threshold, or no entries. Not terminal.
//! 2. `lowStats`: no peak-seed bin, or fewer entries than the minimum. Terminal; every
//!    fit-derived flag stays clear.
//! 3. `badfit`: fitted mean at or below the window's lower edge, inverted window, or a
//!    degenerate fit.
//! 4. `suplowDaq`: only without `badfit`; fitted mean at or above the upper edge.
//! 5. `lowdaq`: only without `badfit` and `suplowDaq`; any of the shape checks in
//!    [`ShapeSummary`] fails.
//!
//! [`classify`] is a pure function of its inputs.

use bl_core::{ChannelFlags, FitWindow, GaussFit};
use bl_hist::Histogram;
use serde::{Deserialize, Serialize};

/// Bins past the window's upper edge averaged for the tail check.
pub const TAIL_BINS: usize = 5;

/// Thresholds for the statistics screen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// A channel with RMS strictly below this is dead.
    pub dead_rms: f64,
    /// A channel with strictly fewer entries than this is low-statistics.
    pub min_stats: f64,
}

/// Entry-level summary of one channel histogram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelStats {
    /// Entry count.
    pub entries: f64,
    /// Histogram RMS.
    pub rms: f64,
    /// Whether a bin reaches the peak fraction of the maximum.
    pub peak_seed_found: bool,
}

/// Histogram shape measured against the final fit window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeSummary {
    /// Low edge of the maximum-content bin.
    pub max_bin_x: f64,
    /// Mean content of the [`TAIL_BINS`] bins after the bin holding the window's
    /// upper edge. Bins past the axis count as empty.
    pub tail_average: f64,
}

impl ShapeSummary {
    /// Measure `hist` against `window`.
    pub fn probe(hist: &Histogram, window: FitWindow) -> Self {
        let max_bin_x = hist.bin_low_edge(hist.maximum_bin());
        let edge_bin = hist.find_bin_with_flow(window.max);
        let tail_sum: f64 = (1..=TAIL_BINS as isize).map(|k| hist.content_at(edge_bin + k)).sum();
        Self { max_bin_x, tail_average: tail_sum / TAIL_BINS as f64 }
    }
}

/// What the fitting stage produced for a channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FitOutcome {
    /// No fit was run.
    NotAttempted,
    /// The fit could not produce a usable mean/sigma in `window`.
    Degenerate {
        /// Window being fitted when the fit degenerated.
        window: FitWindow,
    },
    /// A fit was obtained.
    Fitted {
        /// Final fit.
        fit: GaussFit,
        /// Final window.
        window: FitWindow,
        /// Histogram shape against `window`.
        shape: ShapeSummary,
    },
}

/// Statistics screen: `(dead, low_stats)`.
pub fn screen(stats: &ChannelStats, config: &ClassifierConfig) -> (bool, bool) {
    let dead = stats.rms < config.dead_rms || stats.entries == 0.0;
    let low_stats = !stats.peak_seed_found || stats.entries < config.min_stats;
    (dead, low_stats)
}

fn is_badfit(fit: &GaussFit, window: FitWindow) -> bool {
    fit.mean <= window.min || window.min > window.max
}

fn is_suplow_daq(fit: &GaussFit, window: FitWindow) -> bool {
    fit.mean >= window.max
}

fn is_lowdaq(fit: &GaussFit, window: FitWindow, shape: &ShapeSummary) -> bool {
    let peak_displaced = (shape.max_bin_x - fit.mean).abs() > fit.sigma;
    let mean_outside = fit.mean > window.max || fit.mean < window.min;
    let tail_not_decaying = shape.tail_average > fit.norm;
    peak_displaced || mean_outside || tail_not_decaying
}

/// Assign quality flags.
pub fn classify(stats: &ChannelStats, config: &ClassifierConfig, outcome: &FitOutcome) -> ChannelFlags {
    let (dead, low_stats) = screen(stats, config);
    let mut flags = ChannelFlags { dead, low_stats, ..Default::default() };
    if low_stats {
        return flags;
    }

    match outcome {
        FitOutcome::NotAttempted => {}
        FitOutcome::Degenerate { .. } => flags.badfit = true,
        FitOutcome::Fitted { fit, window, shape } => {
            flags.badfit = is_badfit(fit, *window) || fit.is_degenerate();
            flags.suplow_daq = !flags.badfit && is_suplow_daq(fit, *window);
            flags.lowdaq = !flags.badfit && !flags.suplow_daq && is_lowdaq(fit, *window, shape);
        }
    }
    flags
}
