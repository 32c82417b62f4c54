//! # bl-hist
//!
//! Histogram containers for per-channel amplitude distributions.
//!
//! A readout module is recorded as a 2-D histogram (channel on X, amplitude on Y).
//! The calibration works on its per-channel Y projections, optionally rebinned
//! and smoothed with the 353QH-twice running-median filter.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod histogram;
pub mod histogram2d;
pub mod smooth;

pub use histogram::Histogram;
pub use histogram2d::Histogram2D;
pub use smooth::smooth_353qh;
