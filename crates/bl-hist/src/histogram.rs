//! 1-D histogram with the occupancy and moment queries used by the baseline fit.

use bl_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::smooth::smooth_353qh;

/// A 1-D histogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    /// Histogram name.
    pub name: String,
    /// Bin edges (length = n_bins + 1, strictly increasing).
    pub bin_edges: Vec<f64>,
    /// Bin contents (length = n_bins, excluding under/overflow).
    pub bin_content: Vec<f64>,
    /// Sum of weights squared per bin, if tracked.
    #[serde(default)]
    pub sumw2: Option<Vec<f64>>,
    /// Number of entries.
    pub entries: f64,
}

impl Histogram {
    /// Build a histogram from explicit edges and contents.
    ///
    /// `entries` is set to the sum of contents.
    pub fn new(name: impl Into<String>, bin_edges: Vec<f64>, bin_content: Vec<f64>) -> Result<Self> {
        let h = Self {
            name: name.into(),
            entries: bin_content.iter().sum(),
            bin_edges,
            bin_content,
            sumw2: None,
        };
        h.validate()?;
        Ok(h)
    }

    /// Empty histogram with `n_bins` equal-width bins over `[x_min, x_max)`.
    pub fn uniform(name: impl Into<String>, n_bins: usize, x_min: f64, x_max: f64) -> Result<Self> {
        if n_bins == 0 || !(x_max > x_min) {
            return Err(Error::Validation(format!(
                "invalid uniform binning: n_bins={n_bins}, range=[{x_min}, {x_max})"
            )));
        }
        let width = (x_max - x_min) / n_bins as f64;
        let mut bin_edges: Vec<f64> = (0..n_bins).map(|i| x_min + i as f64 * width).collect();
        bin_edges.push(x_max);
        Self::new(name, bin_edges, vec![0.0; n_bins])
    }

    /// Check edge/content consistency.
    pub fn validate(&self) -> Result<()> {
        if self.bin_content.is_empty() {
            return Err(Error::Validation(format!("histogram '{}' has no bins", self.name)));
        }
        if self.bin_edges.len() != self.bin_content.len() + 1 {
            return Err(Error::Validation(format!(
                "histogram '{}': {} edges for {} bins",
                self.name,
                self.bin_edges.len(),
                self.bin_content.len()
            )));
        }
        if self.bin_edges.windows(2).any(|w| !(w[1] > w[0])) {
            return Err(Error::Validation(format!(
                "histogram '{}': bin edges must be strictly increasing",
                self.name
            )));
        }
        if let Some(sumw2) = &self.sumw2
            && sumw2.len() != self.bin_content.len()
        {
            return Err(Error::Validation(format!(
                "histogram '{}': sumw2 length {} != {}",
                self.name,
                sumw2.len(),
                self.bin_content.len()
            )));
        }
        Ok(())
    }

    /// Number of bins.
    pub fn n_bins(&self) -> usize {
        self.bin_content.len()
    }

    /// Lower edge of the first bin.
    pub fn x_min(&self) -> f64 {
        self.bin_edges[0]
    }

    /// Upper edge of the last bin.
    pub fn x_max(&self) -> f64 {
        self.bin_edges[self.n_bins()]
    }

    /// Add `weight` at `x`. Values outside the axis only count towards `entries`.
    pub fn fill(&mut self, x: f64, weight: f64) {
        self.entries += 1.0;
        if let Some(i) = self.find_bin(x) {
            self.bin_content[i] += weight;
            if let Some(sumw2) = self.sumw2.as_mut() {
                sumw2[i] += weight * weight;
            }
        }
    }

    /// Index of the bin containing `x` (`[low, high)`), or `None` outside the axis.
    pub fn find_bin(&self, x: f64) -> Option<usize> {
        if !(x >= self.x_min() && x < self.x_max()) {
            return None;
        }
        // partition_point: first edge strictly greater than x.
        let upper = self.bin_edges.partition_point(|&e| e <= x);
        Some(upper - 1)
    }

    /// Bin index including flow: `-1` below the axis, `n_bins` at or above the upper edge.
    pub fn find_bin_with_flow(&self, x: f64) -> isize {
        if x < self.x_min() {
            -1
        } else {
            match self.find_bin(x) {
                Some(i) => i as isize,
                None => self.n_bins() as isize,
            }
        }
    }

    /// Content of bin `i`, or 0 for any index outside the axis.
    pub fn content_at(&self, i: isize) -> f64 {
        if i < 0 {
            return 0.0;
        }
        self.bin_content.get(i as usize).copied().unwrap_or(0.0)
    }

    /// Lower edge of bin `i`.
    pub fn bin_low_edge(&self, i: usize) -> f64 {
        self.bin_edges[i]
    }

    /// Centre of bin `i`.
    pub fn bin_center(&self, i: usize) -> f64 {
        0.5 * (self.bin_edges[i] + self.bin_edges[i + 1])
    }

    /// Width of bin `i`.
    pub fn bin_width(&self, i: usize) -> f64 {
        self.bin_edges[i + 1] - self.bin_edges[i]
    }

    /// Statistical error on bin `i`: `sqrt(sumw2)` when tracked, else `sqrt(|content|)`.
    pub fn bin_error(&self, i: usize) -> f64 {
        match &self.sumw2 {
            Some(sumw2) => sumw2[i].max(0.0).sqrt(),
            None => self.bin_content[i].abs().sqrt(),
        }
    }

    /// First bin whose content is strictly above `threshold`.
    pub fn first_bin_above(&self, threshold: f64) -> Option<usize> {
        self.bin_content.iter().position(|&c| c > threshold)
    }

    /// Last bin whose content is strictly above `threshold`.
    pub fn last_bin_above(&self, threshold: f64) -> Option<usize> {
        self.bin_content.iter().rposition(|&c| c > threshold)
    }

    /// Bin holding the maximum content (first one on ties).
    pub fn maximum_bin(&self) -> usize {
        let mut best = 0;
        for (i, &c) in self.bin_content.iter().enumerate() {
            if c > self.bin_content[best] {
                best = i;
            }
        }
        best
    }

    /// Maximum bin content.
    pub fn maximum(&self) -> f64 {
        self.bin_content[self.maximum_bin()]
    }

    /// Sum of bin contents.
    pub fn integral(&self) -> f64 {
        self.bin_content.iter().sum()
    }

    /// Content-weighted standard deviation of the bin centres. 0 for an empty histogram.
    pub fn rms(&self) -> f64 {
        let (sw, swx, swx2) = self.moments();
        if sw <= 0.0 {
            return 0.0;
        }
        let mean = swx / sw;
        (swx2 / sw - mean * mean).max(0.0).sqrt()
    }

    fn moments(&self) -> (f64, f64, f64) {
        let mut sw = 0.0;
        let mut swx = 0.0;
        let mut swx2 = 0.0;
        for (i, &c) in self.bin_content.iter().enumerate() {
            let x = self.bin_center(i);
            sw += c;
            swx += c * x;
            swx2 += c * x * x;
        }
        (sw, swx, swx2)
    }

    /// Apply `passes` rounds of 353QH-twice smoothing to the contents.
    ///
    /// Entries and sumw2 are left untouched.
    pub fn smooth(&mut self, passes: usize) -> Result<()> {
        smooth_353qh(&mut self.bin_content, passes)
    }
}
