//! # bl-fit
//!
//! Baseline (pedestal) calibration of strip-detector readout channels.
//!
//! This crate provides:
//! - Range seeding from histogram occupancy ([`seed`])
//! - Single Gaussian chi-square fits via Levenberg-Marquardt ([`gauss`])
//! - The iterative outlier-trimmed fitter ([`trimmed`])
//! - Channel quality classification ([`classify`])
//! - Per-channel and per-module calibration drivers ([`calibrate`])
//!
//! Every channel is processed in isolation: nothing but the read-only
//! [`CalibrationConfig`] is shared between channels.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod calibrate;
pub mod classify;
pub mod config;
pub mod gauss;
pub mod seed;
pub mod trimmed;

pub use calibrate::{ChannelCalibrator, ChannelInput, ChannelMapping, ThresholdSource, select_histograms};
pub use classify::{ChannelStats, ClassifierConfig, FitOutcome, ShapeSummary, classify};
pub use config::CalibrationConfig;
pub use gauss::{LmConfig, fit_gaussian, fit_gaussian_with};
pub use seed::seed_window;
pub use trimmed::{TrimConfig, TrimmedFit, iterative_gauss_fit};
