//! Single Gaussian chi-square fit over a window of a histogram.
//!
//! Model: `f(x) = norm * exp(-0.5 * ((x - mean) / sigma)^2)`, parameters
//! `[norm, mean, sigma]`. Points are the bins whose centre lies inside the window;
//! empty bins and bins without a positive error are skipped. The weighted
//! least-squares problem is solved with Levenberg-Marquardt on the 3x3 normal
//! equations.

use bl_core::{Error, FitWindow, GaussFit, Result};
use bl_hist::Histogram;
use nalgebra::{Matrix3, Vector3};

const N_PARAMS: usize = 3;

/// Configuration for the Levenberg-Marquardt minimizer.
#[derive(Debug, Clone)]
pub struct LmConfig {
    /// Maximum iterations.
    pub max_iterations: usize,
    /// Stop once every relative parameter step is below this.
    pub param_tolerance: f64,
    /// Stop once the relative chi-square improvement is below this.
    pub chi2_tolerance: f64,
    /// Initial damping.
    pub initial_lambda: f64,
    /// Damping growth on a rejected step.
    pub lambda_up: f64,
    /// Damping decay on an accepted step.
    pub lambda_down: f64,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            param_tolerance: 1e-10,
            chi2_tolerance: 1e-12,
            initial_lambda: 1e-3,
            lambda_up: 10.0,
            lambda_down: 0.1,
        }
    }
}

struct Point {
    x: f64,
    y: f64,
    inv_err: f64,
}

fn collect_points(hist: &Histogram, window: FitWindow) -> (Vec<Point>, f64) {
    let mut points = Vec::new();
    let mut width = 0.0;
    for i in 0..hist.n_bins() {
        let x = hist.bin_center(i);
        if !window.contains(x) {
            continue;
        }
        let y = hist.bin_content[i];
        let err = hist.bin_error(i);
        if y == 0.0 || !(err > 0.0) {
            continue;
        }
        if points.is_empty() {
            width = hist.bin_width(i);
        }
        points.push(Point { x, y, inv_err: 1.0 / err });
    }
    (points, width)
}

/// Starting values from the in-window moments.
fn initial_params(points: &[Point], width: f64, window: FitWindow) -> [f64; N_PARAMS] {
    let mut sum = 0.0;
    let mut sum_x = 0.0;
    let mut sum_x2 = 0.0;
    let mut peak = f64::NEG_INFINITY;
    for p in points {
        sum += p.y;
        sum_x += p.y * p.x;
        sum_x2 += p.y * p.x * p.x;
        peak = peak.max(p.y);
    }
    let mean = sum_x / sum;
    let mut rms = (sum_x2 / sum - mean * mean).max(0.0).sqrt();
    if !(rms > 0.0) {
        let span = points[points.len() - 1].x - points[0].x + width;
        rms = if span > 0.0 { span / 4.0 } else { window.span().abs() / 4.0 };
    }
    let norm = 0.5 * (peak + width * sum / ((2.0 * std::f64::consts::PI).sqrt() * rms));
    [norm, mean, rms]
}

#[inline]
fn model_and_gradient(x: f64, p: &[f64; N_PARAMS]) -> (f64, [f64; N_PARAMS]) {
    let [norm, mean, sigma] = *p;
    let dx = x - mean;
    let s2 = sigma * sigma;
    let e = (-0.5 * dx * dx / s2).exp();
    let f = norm * e;
    (f, [e, f * dx / s2, f * dx * dx / (s2 * sigma)])
}

fn chi2(points: &[Point], p: &[f64; N_PARAMS]) -> f64 {
    points
        .iter()
        .map(|pt| {
            let r = (pt.y - model_and_gradient(pt.x, p).0) * pt.inv_err;
            r * r
        })
        .sum()
}

fn normal_equations(points: &[Point], p: &[f64; N_PARAMS]) -> (Matrix3<f64>, Vector3<f64>) {
    let mut a = Matrix3::zeros();
    let mut g = Vector3::zeros();
    for pt in points {
        let (f, grad) = model_and_gradient(pt.x, p);
        let row = Vector3::from(grad) * pt.inv_err;
        let r = (pt.y - f) * pt.inv_err;
        g += row * r;
        a += row * row.transpose();
    }
    (a, g)
}

/// Reason a minimum cannot seed another narrowing step, if any. A centre off the
/// histogram axis means the minimizer ran away rather than found a peak.
fn rejected_minimum(hist: &Histogram, params: &[f64; N_PARAMS]) -> Option<String> {
    let [norm, mean, sigma] = *params;
    if !norm.is_finite() || !mean.is_finite() || !sigma.is_finite() || sigma <= 0.0 {
        return Some(format!("minimum at norm={norm}, mean={mean}, sigma={sigma}"));
    }
    if mean < hist.x_min() || mean > hist.x_max() {
        return Some(format!(
            "mean {mean} outside the axis [{}, {}] (sigma={sigma})",
            hist.x_min(),
            hist.x_max()
        ));
    }
    None
}

/// Fit a Gaussian over `window` with the default minimizer settings.
pub fn fit_gaussian(hist: &Histogram, window: FitWindow) -> Result<GaussFit> {
    fit_gaussian_with(hist, window, &LmConfig::default())
}

/// Fit a Gaussian over `window`.
///
/// # Errors
/// [`Error::FitDegeneracy`] when fewer than three usable bins fall inside the window,
/// when the minimum has a non-finite mean or a non-finite or zero sigma, or when its
/// mean lies off the histogram axis.
pub fn fit_gaussian_with(hist: &Histogram, window: FitWindow, config: &LmConfig) -> Result<GaussFit> {
    let degenerate = |reason: String| Error::FitDegeneracy { reason, min: window.min, max: window.max };

    let (points, width) = collect_points(hist, window);
    if points.len() < N_PARAMS {
        return Err(degenerate(format!("{} usable bins, need at least {N_PARAMS}", points.len())));
    }

    let mut params = initial_params(&points, width, window);
    let mut lambda = config.initial_lambda;
    let mut current = chi2(&points, &params);

    for _ in 0..config.max_iterations {
        let (a, g) = normal_equations(&points, &params);
        let mut damped = a;
        for i in 0..N_PARAMS {
            damped[(i, i)] *= 1.0 + lambda;
        }
        let Some(delta) = damped.lu().solve(&g) else {
            break;
        };

        let mut trial = params;
        for (t, d) in trial.iter_mut().zip(delta.iter()) {
            *t += d;
        }
        let trial_chi2 = chi2(&points, &trial);

        if trial_chi2.is_finite() && trial_chi2 <= current {
            let improvement = current - trial_chi2;
            let max_rel_step = params
                .iter()
                .zip(delta.iter())
                .map(|(p, d)| d.abs() / p.abs().max(1e-12))
                .fold(0.0f64, f64::max);
            params = trial;
            current = trial_chi2;
            lambda *= config.lambda_down;
            if max_rel_step < config.param_tolerance
                || improvement <= config.chi2_tolerance * (1.0 + current)
            {
                break;
            }
        } else {
            lambda *= config.lambda_up;
            if lambda > 1e12 {
                break;
            }
        }
    }

    // The model is even in sigma.
    params[2] = params[2].abs();
    if let Some(reason) = rejected_minimum(hist, &params) {
        return Err(degenerate(reason));
    }
    let [norm, mean, sigma] = params;

    let (a, _) = normal_equations(&points, &params);
    let covariance = a.try_inverse();
    let error = |i: usize| {
        covariance.as_ref().map(|c| c[(i, i)]).filter(|v| v.is_finite() && *v >= 0.0).map(f64::sqrt)
    };

    Ok(GaussFit {
        norm,
        mean,
        sigma,
        chi2: current,
        ndf: points.len() - N_PARAMS,
        mean_error: error(1),
        sigma_error: error(2),
    })
}
