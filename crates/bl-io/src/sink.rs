//! Flat per-channel output tables.
//!
//! One row per calibrated channel with the columns in [`COLUMNS`]. Flags are written
//! as 0/1. Fit fields that were not computed carry [`NOT_COMPUTED`].

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use bl_core::{ChannelRecord, Error, NOT_COMPUTED, Result};
use serde::{Deserialize, Serialize};

/// Output column names, in order.
pub const COLUMNS: [&str; 20] = [
    "halfmodule_hh",
    "channel",
    "svt_id",
    "minStats",
    "rebin",
    "n_entries",
    "rms",
    "dead",
    "threshold",
    "lowStats",
    "badfit",
    "lowdaq",
    "suplowDaq",
    "BlFitMean",
    "BlFitSigma",
    "BlFitNorm",
    "BlFitChi2",
    "BlFitNdf",
    "BlFitRangeLower",
    "BlFitRangeUpper",
];

/// One output row. Field order matches [`COLUMNS`].
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRow {
    #[serde(rename = "halfmodule_hh")]
    pub halfmodule: String,
    pub channel: u32,
    pub svt_id: u32,
    #[serde(rename = "minStats")]
    pub min_stats: f64,
    pub rebin: f64,
    #[serde(rename = "n_entries")]
    pub entries: f64,
    pub rms: f64,
    pub dead: u8,
    pub threshold: f64,
    #[serde(rename = "lowStats")]
    pub low_stats: u8,
    pub badfit: u8,
    pub lowdaq: u8,
    #[serde(rename = "suplowDaq")]
    pub suplow_daq: u8,
    #[serde(rename = "BlFitMean")]
    pub mean: f64,
    #[serde(rename = "BlFitSigma")]
    pub sigma: f64,
    #[serde(rename = "BlFitNorm")]
    pub norm: f64,
    #[serde(rename = "BlFitChi2")]
    pub chi2: f64,
    #[serde(rename = "BlFitNdf")]
    pub ndf: f64,
    #[serde(rename = "BlFitRangeLower")]
    pub range_lower: f64,
    #[serde(rename = "BlFitRangeUpper")]
    pub range_upper: f64,
}

impl From<&ChannelRecord> for OutputRow {
    fn from(r: &ChannelRecord) -> Self {
        let fit = r.fit.as_ref();
        let field = |f: fn(&bl_core::GaussFit) -> f64| fit.map_or(NOT_COMPUTED, f);
        Self {
            halfmodule: r.halfmodule.clone(),
            channel: r.channel,
            svt_id: r.svt_id,
            min_stats: r.min_stats,
            rebin: r.rebin,
            entries: r.entries,
            rms: r.rms,
            dead: u8::from(r.flags.dead),
            threshold: r.threshold,
            low_stats: u8::from(r.flags.low_stats),
            badfit: u8::from(r.flags.badfit),
            lowdaq: u8::from(r.flags.lowdaq),
            suplow_daq: u8::from(r.flags.suplow_daq),
            mean: field(|f| f.mean),
            sigma: field(|f| f.sigma),
            norm: field(|f| f.norm),
            chi2: field(|f| f.chi2),
            ndf: field(|f| f.ndf as f64),
            range_lower: r.window.map_or(NOT_COMPUTED, |w| w.min),
            range_upper: r.window.map_or(NOT_COMPUTED, |w| w.max),
        }
    }
}

/// Destination for channel records.
pub trait RecordSink {
    /// Append one record.
    fn fill(&mut self, record: &ChannelRecord) -> Result<()>;

    /// Flush everything written so far. No record may be filled afterwards.
    fn finish(&mut self) -> Result<()>;
}

/// CSV table with a header row.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CsvSink<W> {
    /// Write to `out`. The header is written immediately.
    pub fn new(out: W) -> Result<Self> {
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(out);
        writer.write_record(COLUMNS)?;
        Ok(Self { writer })
    }
}

impl CsvSink<File> {
    /// Create (or truncate) the file at `path`.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(File::create(path)?)
    }
}

impl<W: Write> RecordSink for CsvSink<W> {
    fn fill(&mut self, record: &ChannelRecord) -> Result<()> {
        self.writer.serialize(OutputRow::from(record))?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Pretty-printed JSON array, written on [`RecordSink::finish`].
pub struct JsonSink<W: Write> {
    out: W,
    rows: Vec<OutputRow>,
}

impl<W: Write> JsonSink<W> {
    /// Write to `out`.
    pub fn new(out: W) -> Self {
        Self { out, rows: Vec::new() }
    }
}

impl JsonSink<BufWriter<File>> {
    /// Create (or truncate) the file at `path`.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> RecordSink for JsonSink<W> {
    fn fill(&mut self, record: &ChannelRecord) -> Result<()> {
        self.rows.push(OutputRow::from(record));
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        serde_json::to_writer_pretty(&mut self.out, &self.rows)?;
        writeln!(self.out)?;
        self.out.flush()?;
        self.rows.clear();
        Ok(())
    }
}

/// Output table format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Comma-separated values with a header row.
    #[default]
    Csv,
    /// JSON array of row objects.
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Csv => "csv",
            Self::Json => "json",
        })
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            other => Err(Error::Validation(format!("unknown output format '{other}', expected csv or json"))),
        }
    }
}

/// Sink writing `format` to `path`, or to stdout when `path` is `None`.
pub fn open_sink(format: OutputFormat, path: Option<&Path>) -> Result<Box<dyn RecordSink>> {
    let sink: Box<dyn RecordSink> = match (format, path) {
        (OutputFormat::Csv, Some(p)) => Box::new(CsvSink::from_path(p)?),
        (OutputFormat::Csv, None) => Box::new(CsvSink::new(std::io::stdout())?),
        (OutputFormat::Json, Some(p)) => Box::new(JsonSink::from_path(p)?),
        (OutputFormat::Json, None) => Box::new(JsonSink::new(std::io::stdout())),
    };
    Ok(sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bl_core::{ChannelFlags, FitWindow, GaussFit};

    fn record(fit: bool) -> ChannelRecord {
        ChannelRecord {
            halfmodule: "L1T_axial_raw".into(),
            channel: 12,
            svt_id: 1036,
            min_stats: 8000.0,
            rebin: 1.0,
            entries: if fit { 10_000.0 } else { 0.0 },
            rms: if fit { 48.5 } else { 0.0 },
            threshold: 2995.0,
            flags: ChannelFlags { dead: !fit, low_stats: !fit, ..Default::default() },
            fit: fit.then_some(GaussFit {
                norm: 400.0,
                mean: 1500.25,
                sigma: 49.75,
                chi2: 12.5,
                ndf: 17,
                mean_error: None,
                sigma_error: None,
            }),
            window: fit.then_some(FitWindow::new(1450.5, 1550.0)),
        }
    }

    #[test]
    fn test_row_uses_sentinel_for_missing_fit() {
        let row = OutputRow::from(&record(false));
        assert_eq!((row.dead, row.low_stats, row.badfit), (1, 1, 0));
        for v in [row.mean, row.sigma, row.norm, row.chi2, row.ndf, row.range_lower, row.range_upper] {
            assert_eq!(v, NOT_COMPUTED);
        }
        let row = OutputRow::from(&record(true));
        assert_eq!(row.ndf, 17.0);
        assert_eq!(row.range_upper, 1550.0);
    }

    #[test]
    fn test_csv_header_and_rows() {
        let mut buf = Vec::new();
        {
            let mut sink = CsvSink::new(&mut buf).unwrap();
            sink.fill(&record(true)).unwrap();
            sink.fill(&record(false)).unwrap();
            sink.finish().unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], COLUMNS.join(","));
        assert!(lines[1].starts_with("L1T_axial_raw,12,1036,8000.0,1.0,10000.0,48.5,0,2995.0,0,0,0,0,1500.25"));
        assert!(lines[2].ends_with("-9999.9,-9999.9"));
    }

    #[test]
    fn test_json_rows_use_column_names() {
        let mut buf = Vec::new();
        {
            let mut sink = JsonSink::new(&mut buf);
            sink.fill(&record(true)).unwrap();
            sink.finish().unwrap();
        }
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        let row = &value[0];
        assert_eq!(row.as_object().unwrap().len(), COLUMNS.len());
        assert_eq!(row["halfmodule_hh"], "L1T_axial_raw");
        assert_eq!(row["BlFitMean"], 1500.25);
        assert_eq!(row["suplowDaq"], 0);
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("CSV".parse::<OutputFormat>().unwrap(), OutputFormat::Csv);
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("xml".parse::<OutputFormat>().is_err());
    }
}
