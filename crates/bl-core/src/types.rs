//! Common data types for baseline calibration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Value written to flat output tables for fields that were not computed.
pub const NOT_COMPUTED: f64 = -9999.9;

/// Hardware address of one hybrid: front-end board and hybrid slot, written `F<feb>H<hybrid>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HybridId {
    /// Front-end board number.
    pub feb: u8,
    /// Hybrid slot on the board.
    pub hybrid: u8,
}

impl HybridId {
    /// Create a new hybrid address.
    pub fn new(feb: u8, hybrid: u8) -> Self {
        Self { feb, hybrid }
    }
}

impl fmt::Display for HybridId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "F{}H{}", self.feb, self.hybrid)
    }
}

impl FromStr for HybridId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || Error::Validation(format!("invalid hardware tag '{s}', expected F<feb>H<hybrid>"));
        let rest = s.strip_prefix('F').ok_or_else(bad)?;
        let (feb, hybrid) = rest.split_once('H').ok_or_else(bad)?;
        Ok(Self { feb: feb.parse().map_err(|_| bad())?, hybrid: hybrid.parse().map_err(|_| bad())? })
    }
}

/// Closed interval `[min, max]` on the amplitude axis over which a Gaussian is fitted.
///
/// Windows built from caller bounds are not checked for ordering: an inverted window
/// is a legitimate input to the classifier (it flags `badfit`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitWindow {
    /// Lower edge.
    pub min: f64,
    /// Upper edge.
    pub max: f64,
}

impl FitWindow {
    /// Create a new window.
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Inclusive containment.
    pub fn contains(&self, x: f64) -> bool {
        x >= self.min && x <= self.max
    }

    /// `true` if `self` lies entirely inside `outer`.
    pub fn is_within(&self, outer: &FitWindow) -> bool {
        self.min >= outer.min && self.max <= outer.max
    }

    /// Width of the window.
    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}

/// Result of one Gaussian chi-square fit, `norm * exp(-0.5 * ((x - mean) / sigma)^2)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussFit {
    /// Peak height (constant term).
    pub norm: f64,
    /// Gaussian centre.
    pub mean: f64,
    /// Gaussian width.
    pub sigma: f64,
    /// Chi-square at the minimum.
    pub chi2: f64,
    /// Degrees of freedom (points minus fitted parameters).
    pub ndf: usize,
    /// Uncertainty on `mean`. `None` if the normal matrix was singular.
    pub mean_error: Option<f64>,
    /// Uncertainty on `sigma`. `None` if the normal matrix was singular.
    pub sigma_error: Option<f64>,
}

impl GaussFit {
    /// A fit whose mean or sigma cannot seed another narrowing step.
    pub fn is_degenerate(&self) -> bool {
        !self.mean.is_finite() || !self.sigma.is_finite() || self.sigma <= 0.0
    }
}

/// Data-quality flags for one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelFlags {
    /// RMS below the dead threshold, or no entries at all.
    pub dead: bool,
    /// Too few entries (or no usable peak) to attempt a fit.
    pub low_stats: bool,
    /// Fit centre collapsed onto the lower window edge, or the window is inverted.
    pub badfit: bool,
    /// DAQ threshold cuts through the baseline peak.
    pub suplow_daq: bool,
    /// DAQ threshold interferes with the baseline tail.
    pub lowdaq: bool,
}

impl ChannelFlags {
    /// `true` if no flag is set.
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }

    /// Names of the flags that are set, in classification order.
    pub fn names(&self) -> Vec<&'static str> {
        [
            (self.dead, "dead"),
            (self.low_stats, "lowStats"),
            (self.badfit, "badfit"),
            (self.suplow_daq, "suplowDaq"),
            (self.lowdaq, "lowdaq"),
        ]
        .into_iter()
        .filter_map(|(set, name)| set.then_some(name))
        .collect()
    }
}

/// Everything computed for one readout channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRecord {
    /// Name of the half-module histogram the channel came from.
    pub halfmodule: String,
    /// Channel index within the hybrid.
    pub channel: u32,
    /// Global detector ID.
    pub svt_id: u32,
    /// Minimum-statistics threshold in effect.
    pub min_stats: f64,
    /// Y rebin factor in effect.
    pub rebin: f64,
    /// Entry count of the channel histogram.
    pub entries: f64,
    /// RMS of the channel histogram.
    pub rms: f64,
    /// Upper fit bound derived from the DAQ threshold.
    pub threshold: f64,
    /// Quality flags.
    pub flags: ChannelFlags,
    /// Final Gaussian fit. `None` when no fit was attempted or the fit degenerated.
    pub fit: Option<GaussFit>,
    /// Final fit window. `None` when no fit was attempted.
    pub window: Option<FitWindow>,
}
