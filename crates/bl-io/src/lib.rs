//! # bl-io
//!
//! Everything the calibration reads from or writes to the outside world:
//!
//! - [`mapper`]: the 2019 detector layout (half-module names, hardware tags,
//!   software names) and global SVT channel IDs
//! - [`thresholds`]: per-APV DAQ threshold files
//! - [`input`]: per-module 2-D histograms serialized as JSON
//! - [`sink`]: flat per-channel output tables (CSV or JSON)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod input;
pub mod mapper;
pub mod sink;
pub mod thresholds;

pub use input::HistogramFile;
pub use mapper::{ModuleEntry, ModuleMapper};
pub use sink::{COLUMNS, CsvSink, JsonSink, OutputFormat, OutputRow, RecordSink, open_sink};
pub use thresholds::ThresholdTable;
