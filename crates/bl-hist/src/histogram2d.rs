//! Per-module 2-D histogram: channel index on X, sampled amplitude on Y.

use bl_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::histogram::Histogram;

/// A 2-D histogram stored row-major by X bin (`content[ix * n_y + iy]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram2D {
    /// Histogram name.
    #[serde(default)]
    pub name: String,
    /// X bin edges (length = n_x + 1).
    pub x_edges: Vec<f64>,
    /// Y bin edges (length = n_y + 1).
    pub y_edges: Vec<f64>,
    /// Bin contents, `n_x * n_y` values.
    pub content: Vec<f64>,
    /// Sum of weights squared per bin, if tracked.
    #[serde(default)]
    pub sumw2: Option<Vec<f64>>,
    /// Number of entries.
    #[serde(default)]
    pub entries: f64,
}

impl Histogram2D {
    /// Empty histogram with one X bin per channel and `n_y` equal-width Y bins.
    pub fn for_channels(
        name: impl Into<String>,
        n_channels: usize,
        n_y: usize,
        y_min: f64,
        y_max: f64,
    ) -> Result<Self> {
        if n_channels == 0 || n_y == 0 || !(y_max > y_min) {
            return Err(Error::Validation(format!(
                "invalid 2D binning: {n_channels} channels, {n_y} bins over [{y_min}, {y_max})"
            )));
        }
        let x_edges = (0..=n_channels).map(|i| i as f64).collect();
        let width = (y_max - y_min) / n_y as f64;
        let mut y_edges: Vec<f64> = (0..n_y).map(|i| y_min + i as f64 * width).collect();
        y_edges.push(y_max);
        Ok(Self {
            name: name.into(),
            x_edges,
            y_edges,
            content: vec![0.0; n_channels * n_y],
            sumw2: None,
            entries: 0.0,
        })
    }

    /// Check shape consistency.
    pub fn validate(&self) -> Result<()> {
        if self.x_edges.len() < 2 || self.y_edges.len() < 2 {
            return Err(Error::Validation(format!("histogram '{}' has no bins", self.name)));
        }
        for (axis, edges) in [("x", &self.x_edges), ("y", &self.y_edges)] {
            if edges.windows(2).any(|w| !(w[1] > w[0])) {
                return Err(Error::Validation(format!(
                    "histogram '{}': {axis} edges must be strictly increasing",
                    self.name
                )));
            }
        }
        let expected = self.n_x() * self.n_y();
        if self.content.len() != expected {
            return Err(Error::Validation(format!(
                "histogram '{}': {} contents for {}x{} bins",
                self.name,
                self.content.len(),
                self.n_x(),
                self.n_y()
            )));
        }
        if let Some(sumw2) = &self.sumw2
            && sumw2.len() != expected
        {
            return Err(Error::Validation(format!(
                "histogram '{}': sumw2 length {} != {expected}",
                self.name,
                sumw2.len()
            )));
        }
        Ok(())
    }

    /// Number of X bins.
    pub fn n_x(&self) -> usize {
        self.x_edges.len() - 1
    }

    /// Number of Y bins.
    pub fn n_y(&self) -> usize {
        self.y_edges.len() - 1
    }

    fn locate(edges: &[f64], v: f64) -> Option<usize> {
        let (lo, hi) = (edges[0], edges[edges.len() - 1]);
        if !(v >= lo && v < hi) {
            return None;
        }
        Some(edges.partition_point(|&e| e <= v) - 1)
    }

    /// Add `weight` at `(x, y)`. Out-of-range points only count towards `entries`.
    pub fn fill(&mut self, x: f64, y: f64, weight: f64) {
        self.entries += 1.0;
        let (Some(ix), Some(iy)) = (Self::locate(&self.x_edges, x), Self::locate(&self.y_edges, y))
        else {
            return;
        };
        let k = ix * self.n_y() + iy;
        self.content[k] += weight;
        if let Some(sumw2) = self.sumw2.as_mut() {
            sumw2[k] += weight * weight;
        }
    }

    /// Content of bin `(ix, iy)`.
    pub fn bin_content(&self, ix: usize, iy: usize) -> f64 {
        self.content[ix * self.n_y() + iy]
    }

    /// Merge every `factor` adjacent Y bins. A trailing partial group is dropped.
    pub fn rebin_y(&self, factor: usize) -> Result<Self> {
        if factor == 0 {
            return Err(Error::Validation("rebin factor must be positive".into()));
        }
        if factor == 1 {
            return Ok(self.clone());
        }
        let n_y = self.n_y();
        let new_n_y = n_y / factor;
        if new_n_y == 0 {
            return Err(Error::Validation(format!(
                "rebin factor {factor} exceeds the {n_y} Y bins of '{}'",
                self.name
            )));
        }

        let y_edges: Vec<f64> = (0..=new_n_y).map(|j| self.y_edges[j * factor]).collect();
        let merge = |values: &[f64]| -> Vec<f64> {
            let mut out = vec![0.0; self.n_x() * new_n_y];
            for ix in 0..self.n_x() {
                let row = &values[ix * n_y..(ix + 1) * n_y];
                for (j, group) in row.chunks_exact(factor).enumerate() {
                    out[ix * new_n_y + j] = group.iter().sum();
                }
            }
            out
        };

        Ok(Self {
            name: self.name.clone(),
            x_edges: self.x_edges.clone(),
            y_edges,
            content: merge(&self.content),
            sumw2: self.sumw2.as_deref().map(merge),
            entries: self.entries,
        })
    }

    /// Y projection of a single X bin (one readout channel), with per-bin errors.
    ///
    /// Entries of the projection are the sum of the channel's contents.
    pub fn projection_y(&self, ix: usize) -> Result<Histogram> {
        if ix >= self.n_x() {
            return Err(Error::Validation(format!(
                "channel {ix} out of range for '{}' ({} channels)",
                self.name,
                self.n_x()
            )));
        }
        let n_y = self.n_y();
        let row = self.content[ix * n_y..(ix + 1) * n_y].to_vec();
        let sumw2 = match &self.sumw2 {
            Some(w2) => w2[ix * n_y..(ix + 1) * n_y].to_vec(),
            None => row.iter().map(|c| c.abs()).collect(),
        };
        Ok(Histogram {
            name: format!("{}_proY_ch{ix}", self.name),
            bin_edges: self.y_edges.clone(),
            entries: row.iter().sum(),
            bin_content: row,
            sumw2: Some(sumw2),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn module() -> Histogram2D {
        let mut h = Histogram2D::for_channels("L1T_axial", 3, 6, 0.0, 60.0).unwrap();
        for (ch, y, w) in [(0.5, 5.0, 1.0), (0.5, 15.0, 2.0), (1.5, 25.0, 4.0), (1.5, 59.0, 1.0)] {
            h.fill(ch, y, w);
        }
        h
    }

    #[test]
    fn test_fill_and_shape() {
        let h = module();
        h.validate().unwrap();
        assert_eq!(h.n_x(), 3);
        assert_eq!(h.n_y(), 6);
        assert_relative_eq!(h.bin_content(0, 1), 2.0);
        assert_relative_eq!(h.bin_content(1, 5), 1.0);
        assert_relative_eq!(h.entries, 4.0);
    }

    #[test]
    fn test_rebin_y() {
        let h = module().rebin_y(4).unwrap();
        assert_eq!(h.n_y(), 1);
        assert_eq!(h.y_edges, vec![0.0, 40.0]);
        assert_relative_eq!(h.bin_content(0, 0), 3.0);
        // (1.5, 59.0) falls in the dropped partial group
        assert_relative_eq!(h.bin_content(1, 0), 4.0);

        assert!(module().rebin_y(0).is_err());
        assert!(module().rebin_y(7).is_err());
    }

    #[test]
    fn test_projection() {
        let p = module().projection_y(1).unwrap();
        assert_eq!(p.name, "L1T_axial_proY_ch1");
        assert_eq!(p.n_bins(), 6);
        assert_relative_eq!(p.entries, 5.0);
        assert_relative_eq!(p.bin_content[2], 4.0);
        assert_relative_eq!(p.bin_error(2), 2.0);
        assert!(module().projection_y(3).is_err());
    }

    #[test]
    fn test_json_round_trip_validates() {
        let json = serde_json::to_string(&module()).unwrap();
        let back: Histogram2D = serde_json::from_str(&json).unwrap();
        back.validate().unwrap();
        assert_eq!(back, module());
    }
}
