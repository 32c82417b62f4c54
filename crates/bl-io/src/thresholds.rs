//! Per-APV DAQ readout thresholds.
//!
//! Text format, one APV per line:
//!
//! ```text
//! # feb hyb apv t0 t1 ... t127
//! 2 0 0 0x1a40 0x1a52 ...
//! ```
//!
//! Values are decimal or `0x`-prefixed hex. Blank lines and `#` comments are ignored.
//! Channel `c` of a hybrid reads APV `c / 128`, slot `c % 128`.

use std::collections::HashMap;
use std::path::Path;

use bl_core::{Error, HybridId, Result};
use bl_fit::ThresholdSource;

/// Channels served by one APV chip.
pub const CHANNELS_PER_APV: usize = 128;

/// Thresholds keyed by hybrid and APV.
#[derive(Debug, Clone, Default)]
pub struct ThresholdTable {
    apvs: HashMap<(HybridId, u8), Vec<f64>>,
}

fn parse_value(token: &str) -> Option<f64> {
    match token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok().map(|v| v as f64),
        None => token.parse::<f64>().ok().filter(|v| v.is_finite()),
    }
}

fn parse_index(token: &str) -> Option<u8> {
    match token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16).ok(),
        None => token.parse().ok(),
    }
}

impl ThresholdTable {
    /// Parse the text of a thresholds file.
    pub fn parse(text: &str) -> Result<Self> {
        let mut apvs = HashMap::new();
        for (i, raw) in text.lines().enumerate() {
            let line_no = i + 1;
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let err = |message: String| Error::Parse { line: line_no, message };

            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() != 3 + CHANNELS_PER_APV {
                return Err(err(format!(
                    "expected feb, hybrid, apv and {CHANNELS_PER_APV} thresholds, got {} fields",
                    tokens.len()
                )));
            }
            let [feb, hybrid, apv] = [0, 1, 2].map(|k| parse_index(tokens[k]));
            let (Some(feb), Some(hybrid), Some(apv)) = (feb, hybrid, apv) else {
                return Err(err(format!("invalid address '{} {} {}'", tokens[0], tokens[1], tokens[2])));
            };
            let values = tokens[3..]
                .iter()
                .map(|t| parse_value(t).ok_or_else(|| err(format!("invalid threshold '{t}'"))))
                .collect::<Result<Vec<f64>>>()?;

            let key = (HybridId::new(feb, hybrid), apv);
            if apvs.insert(key, values).is_some() {
                return Err(err(format!("duplicate entry for {} apv {apv}", key.0)));
            }
        }
        log::debug!("loaded thresholds for {} APVs", apvs.len());
        Ok(Self { apvs })
    }

    /// Read and parse a thresholds file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&text)
    }

    /// Number of APVs with thresholds.
    pub fn len(&self) -> usize {
        self.apvs.len()
    }

    /// `true` if no APV has thresholds.
    pub fn is_empty(&self) -> bool {
        self.apvs.is_empty()
    }

    /// Threshold of `channel` on `hybrid`.
    pub fn get(&self, hybrid: HybridId, channel: u32) -> Option<f64> {
        let channel = channel as usize;
        let apv = u8::try_from(channel / CHANNELS_PER_APV).ok()?;
        self.apvs.get(&(hybrid, apv)).map(|values| values[channel % CHANNELS_PER_APV])
    }
}

impl ThresholdSource for ThresholdTable {
    fn threshold(&self, hybrid: HybridId, channel: u32) -> Option<f64> {
        self.get(hybrid, channel)
    }
}
