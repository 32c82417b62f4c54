//! Iterative outlier-trimmed Gaussian fit.
//!
//! The window is repeatedly re-centred on `mean ± sigma_range·sigma` of the previous
//! fit. Each proposed edge only replaces the current one when it stays strictly inside
//! the matching hard clamp, so the window never moves past `hard_min`/`hard_max`.
//! The starting window is clipped to the clamps before the first fit.
//! Two unconditional seed passes come first; the convergence loop then refits until
//! mean and sigma both move by at most [`CONVERGENCE_TOLERANCE`], or until the refit
//! whose index exceeds [`MAX_REFIT_INDEX`].

use bl_core::{FitWindow, GaussFit, Result};
use bl_hist::Histogram;

use crate::gauss::{LmConfig, fit_gaussian_with};

/// Absolute tolerance on mean and sigma between consecutive refits, in x-axis units.
pub const CONVERGENCE_TOLERANCE: f64 = 0.0005;

/// The convergence loop stops after the refit whose index exceeds this.
pub const MAX_REFIT_INDEX: usize = 20;

/// Trimming parameters for one channel.
#[derive(Debug, Clone)]
pub struct TrimConfig {
    /// Half-width of the window in units of the fitted sigma.
    pub sigma_range: f64,
    /// A proposed lower edge must be strictly above this to be applied.
    pub hard_min: f64,
    /// A proposed upper edge must be strictly below this to be applied.
    pub hard_max: f64,
    /// Absolute tolerance on mean and sigma between consecutive refits. A negative
    /// value never settles, so the loop always runs to the refit cap.
    pub tolerance: f64,
    /// Minimizer settings for every fit evaluation.
    pub lm: LmConfig,
}

impl TrimConfig {
    /// Trimming with default minimizer settings.
    pub fn new(sigma_range: f64, hard_min: f64, hard_max: f64) -> Self {
        Self {
            sigma_range,
            hard_min,
            hard_max,
            tolerance: CONVERGENCE_TOLERANCE,
            lm: LmConfig::default(),
        }
    }

    /// Clip both edges of `window` to `[hard_min, hard_max]`.
    pub fn clamp(&self, window: FitWindow) -> FitWindow {
        FitWindow::new(window.min.max(self.hard_min), window.max.min(self.hard_max))
    }

    /// One-sided narrowing: move each edge to `mean ± sigma_range·sigma` if that stays
    /// inside the hard clamp, otherwise keep the current edge.
    pub fn narrow(&self, window: FitWindow, mean: f64, sigma: f64) -> FitWindow {
        let mut next = window;
        let upper = mean + sigma * self.sigma_range;
        if upper < self.hard_max {
            next.max = upper;
        }
        let lower = mean - sigma * self.sigma_range;
        if lower > self.hard_min {
            next.min = lower;
        }
        next
    }
}

/// Outcome of the trimmed fit.
#[derive(Debug, Clone)]
pub struct TrimmedFit {
    /// Fit evaluated at the final window.
    pub fit: GaussFit,
    /// Final window.
    pub window: FitWindow,
    /// Refits performed in the convergence loop.
    pub iterations: usize,
    /// `true` if the loop ended on the tolerance rather than the refit cap.
    pub converged: bool,
    /// Every window that was fitted, in order.
    pub history: Vec<FitWindow>,
}

/// Run the trimmed fit starting from `initial`.
///
/// # Errors
/// [`bl_core::Error::FitDegeneracy`] from the first fit evaluation that cannot seed
/// another narrowing step. The error carries the window that was being fitted.
pub fn iterative_gauss_fit(
    hist: &Histogram,
    initial: FitWindow,
    config: &TrimConfig,
) -> Result<TrimmedFit> {
    let mut history = Vec::new();
    let mut evaluate = |window: FitWindow| -> Result<GaussFit> {
        history.push(window);
        let fit = fit_gaussian_with(hist, window, &config.lm)?;
        log::debug!(
            "{}: fit [{:.4}, {:.4}] -> mean {:.4}, sigma {:.4}",
            hist.name,
            window.min,
            window.max,
            fit.mean,
            fit.sigma
        );
        Ok(fit)
    };

    // Seed passes: a single narrowing is unreliable when the first window spans
    // far into contaminated tails.
    let mut window = config.clamp(initial);
    let first = evaluate(window)?;
    window = config.narrow(window, first.mean, first.sigma);
    let second = evaluate(window)?;
    window = config.narrow(window, second.mean, second.sigma);

    let mut current = second;
    let mut iterations = 0;
    let mut converged = false;
    loop {
        window = config.narrow(window, current.mean, current.sigma);
        let next = evaluate(window)?;
        let index = iterations;
        iterations += 1;

        let settled = (current.sigma - next.sigma).abs() <= config.tolerance
            && (current.mean - next.mean).abs() <= config.tolerance;
        current = next;
        if settled {
            converged = true;
            break;
        }
        if index > MAX_REFIT_INDEX {
            break;
        }
    }

    if !converged {
        log::debug!("{}: refit cap reached after {iterations} refits", hist.name);
    }

    Ok(TrimmedFit { fit: current, window, iterations, converged, history })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use bl_core::Error;

    fn gaussian_with_tail(n: usize, width: f64) -> Histogram {
        let mut h = Histogram::uniform("tail", n, 0.0, n as f64 * width).unwrap();
        for i in 0..n {
            let x = h.bin_center(i);
            let z = (x - 100.0) / 8.0;
            // baseline peak plus a flat contamination on the high side
            let tail = if x > 130.0 { 40.0 } else { 0.0 };
            h.bin_content[i] = (5000.0 * (-0.5 * z * z).exp() + tail).round();
        }
        h.entries = h.integral();
        h
    }

    #[test]
    fn test_narrow_is_one_sided() {
        let cfg = TrimConfig::new(1.0, 10.0, 90.0);
        let w = cfg.narrow(FitWindow::new(20.0, 80.0), 50.0, 5.0);
        assert_eq!(w, FitWindow::new(45.0, 55.0));

        // Proposed edges at or past the clamps keep the current edges.
        let w = cfg.narrow(FitWindow::new(20.0, 80.0), 50.0, 40.0);
        assert_eq!(w, FitWindow::new(20.0, 80.0));
        let w = cfg.narrow(FitWindow::new(20.0, 80.0), 85.0, 5.0);
        assert_eq!(w, FitWindow::new(80.0, 80.0));
    }

    #[test]
    fn test_trims_contaminated_tail() {
        let h = gaussian_with_tail(300, 1.0);
        let cfg = TrimConfig::new(1.0, 0.0, 300.0);
        let out = iterative_gauss_fit(&h, FitWindow::new(0.0, 299.0), &cfg).unwrap();
        assert!(out.converged);
        assert_relative_eq!(out.fit.mean, 100.0, epsilon = 0.05);
        assert_relative_eq!(out.fit.sigma, 8.0, epsilon = 0.05);
        assert!(out.window.min > 90.0 && out.window.max < 110.0);
        assert_eq!(out.history.len(), 2 + out.iterations);
    }

    #[test]
    fn test_refit_cap_bounds_history() {
        let h = gaussian_with_tail(300, 1.0);
        let cfg = TrimConfig { tolerance: -1.0, ..TrimConfig::new(1.0, 0.0, 300.0) };
        let out = iterative_gauss_fit(&h, FitWindow::new(0.0, 299.0), &cfg).unwrap();
        assert!(!out.converged);
        assert_eq!(out.iterations, MAX_REFIT_INDEX + 2);
        assert_eq!(out.history.len(), 24);
        // Still a usable fit of the peak.
        assert_relative_eq!(out.fit.mean, 100.0, epsilon = 0.05);
    }

    #[test]
    fn test_initial_window_is_clamped() {
        let h = gaussian_with_tail(300, 1.0);
        let cfg = TrimConfig::new(1.0, 60.0, 250.0);
        let out = iterative_gauss_fit(&h, FitWindow::new(0.0, 299.0), &cfg).unwrap();
        assert_eq!(out.history[0], FitWindow::new(60.0, 250.0));
        let clamps = FitWindow::new(60.0, 250.0);
        assert!(out.history.iter().all(|w| w.is_within(&clamps)));
        assert!(out.window.is_within(&clamps));
    }

    #[test]
    fn test_degenerate_window_surfaces() {
        let h = gaussian_with_tail(300, 1.0);
        let cfg = TrimConfig::new(1.0, 0.0, 300.0);
        match iterative_gauss_fit(&h, FitWindow::new(200.0, 201.0), &cfg) {
            Err(Error::FitDegeneracy { min, max, .. }) => {
                assert_relative_eq!(min, 200.0);
                assert_relative_eq!(max, 201.0);
            }
            other => panic!("expected FitDegeneracy, got {other:?}"),
        }
    }
}
