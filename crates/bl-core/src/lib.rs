//! # bl-core
//!
//! Shared types for the baseline (pedestal) calibration pipeline.
//!
//! This crate provides:
//! - The error taxonomy used by every other crate
//! - Fit results and fit windows produced by the trimmed Gaussian fitter
//! - Channel quality flags and the per-channel output record

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{ChannelFlags, ChannelRecord, FitWindow, GaussFit, HybridId, NOT_COMPUTED};

/// Crate version, reported by `blfit --version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
