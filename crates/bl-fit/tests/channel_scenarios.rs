//! End-to-end channel calibration scenarios on synthetic baselines.

use approx::assert_relative_eq;
use bl_core::FitWindow;
use bl_fit::trimmed::CONVERGENCE_TOLERANCE;
use bl_fit::{CalibrationConfig, ChannelCalibrator, ChannelInput, TrimConfig, iterative_gauss_fit, seed_window};
use bl_hist::Histogram;
use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use statrs::function::erf::erf;

/// Bin contents are the Gaussian's exact integral over each bin, rounded to counts.
fn binned_gaussian(n_bins: usize, lo: f64, hi: f64, mean: f64, sigma: f64, total: f64) -> Histogram {
    let mut h = Histogram::uniform("baseline", n_bins, lo, hi).unwrap();
    let cdf = |x: f64| 0.5 * (1.0 + erf((x - mean) / (sigma * std::f64::consts::SQRT_2)));
    for i in 0..n_bins {
        let a = h.bin_low_edge(i);
        let b = a + h.bin_width(i);
        h.bin_content[i] = (total * (cdf(b) - cdf(a))).round();
    }
    h.entries = h.integral();
    h
}

fn input(histogram: Histogram, threshold: f64) -> ChannelInput {
    ChannelInput { halfmodule: "L1T_axial_raw".into(), channel: 7, svt_id: 1031, threshold, histogram }
}

fn calibrator() -> ChannelCalibrator {
    ChannelCalibrator::new(CalibrationConfig::default()).unwrap()
}

#[test]
fn test_empty_channel() {
    let h = Histogram::uniform("baseline", 600, 0.0, 3000.0).unwrap();
    let r = calibrator().calibrate_channel(&input(h, 3000.0)).unwrap();
    assert!(r.flags.dead);
    assert!(r.flags.low_stats);
    assert!(!r.flags.badfit && !r.flags.suplow_daq && !r.flags.lowdaq);
    assert!(r.fit.is_none());
    assert!(r.window.is_none());
    assert_eq!(r.entries, 0.0);
    assert_relative_eq!(r.threshold, 2995.0);
}

#[test]
fn test_clean_gaussian_baseline() {
    let h = binned_gaussian(600, 0.0, 3000.0, 1500.0, 50.0, 10_000.0);
    let r = calibrator().calibrate_channel(&input(h, 3000.0)).unwrap();
    assert!(r.flags.is_clean(), "unexpected flags {:?}", r.flags.names());
    let fit = r.fit.unwrap();
    assert_relative_eq!(fit.mean, 1500.0, epsilon = 3.0);
    assert_relative_eq!(fit.sigma, 50.0, epsilon = 3.0);
    let window = r.window.unwrap();
    assert!(window.contains(fit.mean));
    assert_relative_eq!(window.span(), 2.0 * fit.sigma, epsilon = 0.05);
    assert_eq!(r.svt_id, 1031);
    assert_eq!(r.min_stats, 8000.0);
    assert_eq!(r.rebin, 1.0);
}

#[test]
fn test_sampled_gaussian_baseline() {
    let mut rng = StdRng::seed_from_u64(42);
    let normal = Normal::new(1500.0, 50.0).unwrap();
    let mut h = Histogram::uniform("baseline", 1500, 0.0, 3000.0).unwrap();
    for _ in 0..20_000 {
        h.fill(normal.sample(&mut rng), 1.0);
    }
    h.smooth(1).unwrap();
    let r = calibrator().calibrate_channel(&input(h, 3000.0)).unwrap();
    assert!(r.flags.is_clean(), "unexpected flags {:?}", r.flags.names());
    let fit = r.fit.unwrap();
    assert_relative_eq!(fit.mean, 1500.0, epsilon = 5.0);
    assert_relative_eq!(fit.sigma, 50.0, epsilon = 5.0);
    assert_relative_eq!(r.entries, 20_000.0);
}

#[test]
fn test_peak_beyond_threshold_is_suplow_daq() {
    let h = binned_gaussian(3000, 0.0, 3000.0, 1500.0, 50.0, 1e6);
    let r = calibrator().calibrate_channel(&input(h, 1480.0)).unwrap();
    assert!(r.flags.suplow_daq, "flags {:?}", r.flags.names());
    assert!(!r.flags.badfit && !r.flags.lowdaq);
    let window = r.window.unwrap();
    assert_relative_eq!(window.max, 1479.0);
    assert!(r.fit.unwrap().mean >= window.max);
}

#[test]
fn test_min_stats_boundary() {
    let mut h = binned_gaussian(600, 0.0, 3000.0, 1500.0, 50.0, 10_000.0);
    h.entries = 8000.0;
    let r = calibrator().calibrate_channel(&input(h.clone(), 3000.0)).unwrap();
    assert!(!r.flags.low_stats);
    assert!(r.fit.is_some());

    h.entries = 7999.0;
    let r = calibrator().calibrate_channel(&input(h, 3000.0)).unwrap();
    assert!(r.flags.low_stats);
    assert!(r.fit.is_none() && r.window.is_none());
}

#[test]
fn test_rms_below_dead_threshold() {
    // Everything in two bins: fitted or not, the channel is dead.
    let mut h = Histogram::uniform("baseline", 600, 0.0, 3000.0).unwrap();
    h.bin_content[300] = 9000.0;
    h.bin_content[301] = 9000.0;
    h.entries = 18_000.0;
    let r = calibrator().calibrate_channel(&input(h, 3000.0)).unwrap();
    assert!(r.flags.dead);
    assert!(!r.flags.low_stats);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_window_respects_clamps(
        mean in 600.0f64..2400.0,
        sigma in 20.0f64..120.0,
        threshold_offset in -150.0f64..600.0,
    ) {
        let h = binned_gaussian(600, 0.0, 3000.0, mean, sigma, 20_000.0);
        let seed_edge = h.bin_low_edge(h.first_bin_above(0.25 * h.maximum()).unwrap());
        let threshold = mean + threshold_offset;
        let r = calibrator().calibrate_channel(&input(h, threshold)).unwrap();
        if let Some(window) = r.window {
            prop_assert!(window.min >= seed_edge);
            prop_assert!(window.max < threshold);
        }
        if r.fit.is_none() {
            prop_assert!(r.flags.badfit || r.flags.low_stats);
        }
    }

    #[test]
    fn prop_final_window_survives_one_more_narrowing(
        mean in 600.0f64..2400.0,
        sigma in 20.0f64..120.0,
    ) {
        let h = binned_gaussian(600, 0.0, 3000.0, mean, sigma, 20_000.0);
        let cfg = TrimConfig::new(1.0, 0.0, 3000.0);
        let initial = seed_window(&h, None, None, cfg.hard_min, cfg.hard_max).unwrap();
        let out = iterative_gauss_fit(&h, initial, &cfg).unwrap();

        let clamps = FitWindow::new(cfg.hard_min, cfg.hard_max);
        prop_assert!(out.window.is_within(&clamps));
        prop_assert!(out.history.iter().all(|w| w.is_within(&clamps)));

        // Edges move by at most the tolerance on mean plus sigma_range times the
        // tolerance on sigma once the loop has settled.
        if out.converged {
            let narrowed = cfg.narrow(out.window, out.fit.mean, out.fit.sigma);
            let slack = 2.0 * (1.0 + cfg.sigma_range) * CONVERGENCE_TOLERANCE;
            let outer = FitWindow::new(narrowed.min - slack, narrowed.max + slack);
            prop_assert!(
                out.window.is_within(&outer),
                "window {:?} vs narrowed {:?}", out.window, narrowed
            );
        }
    }
}
