//! Error types for baseline calibration

use thiserror::Error;

/// Calibration error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// CSV writer error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// The histogram has no bin with content above zero, so no fit window exists.
    #[error("empty distribution in '{name}': no bin above zero")]
    EmptyDistribution {
        /// Histogram name.
        name: String,
    },

    /// A Gaussian fit evaluation produced an unusable result.
    #[error("degenerate fit in window [{min}, {max}]: {reason}")]
    FitDegeneracy {
        /// What went wrong.
        reason: String,
        /// Lower edge of the window being fitted.
        min: f64,
        /// Upper edge of the window being fitted.
        max: f64,
    },

    /// Malformed line in a text input (thresholds file).
    #[error("parse error at line {line}: {message}")]
    Parse {
        /// 1-based line number.
        line: usize,
        /// Description.
        message: String,
    },

    /// Histogram name did not match any known half-module.
    #[error("unknown module: {0}")]
    UnknownModule(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
