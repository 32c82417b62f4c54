//! Histogram input file.
//!
//! JSON object mapping module histogram names to 2-D histograms:
//!
//! ```json
//! { "histograms": { "L1T_axial_raw_hh": { "x_edges": [...], "y_edges": [...], "content": [...] } } }
//! ```
//!
//! The map key is the histogram's name; a `name` field inside the histogram is overridden.

use std::collections::BTreeMap;
use std::path::Path;

use bl_core::Result;
use bl_hist::Histogram2D;
use serde::{Deserialize, Serialize};

/// Module histograms keyed (and ordered) by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistogramFile {
    /// Histograms by name.
    pub histograms: BTreeMap<String, Histogram2D>,
}

impl HistogramFile {
    /// Parse and validate a JSON document.
    pub fn from_json(text: &str) -> Result<Self> {
        let mut file: Self = serde_json::from_str(text)?;
        for (name, hist) in &mut file.histograms {
            hist.name.clone_from(name);
            hist.validate()?;
        }
        Ok(file)
    }

    /// Read, parse and validate a histogram file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let file = Self::from_json(&text)?;
        log::debug!("{}: {} histograms", path.as_ref().display(), file.histograms.len());
        Ok(file)
    }

    /// Add a histogram under its own name.
    pub fn insert(&mut self, hist: Histogram2D) {
        self.histograms.insert(hist.name.clone(), hist);
    }

    /// Histogram names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.histograms.keys().map(String::as_str)
    }

    /// Histogram by name.
    pub fn get(&self, name: &str) -> Option<&Histogram2D> {
        self.histograms.get(name)
    }

    /// Write as pretty-printed JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
