//! 353QH-twice smoothing (running medians of 3, 5, 3, quadratic fix-up of flat
//! segments, Hanning running mean), applied to the data and once more to the residuals.
//!
//! Matches the classic histogram smoother used for channel baseline distributions,
//! so that smoothed inputs reproduce the same peak positions.

use bl_core::{Error, Result};

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted[sorted.len() / 2]
}

/// Smooth `values` in place, `passes` times.
///
/// Requires at least 3 values. If the input has no negative entries the result is
/// clamped at zero.
pub fn smooth_353qh(values: &mut [f64], passes: usize) -> Result<()> {
    let n = values.len();
    if passes == 0 {
        return Ok(());
    }
    if n < 3 {
        return Err(Error::Validation(format!("smoothing needs at least 3 bins, got {n}")));
    }

    let mut yy = vec![0.0; n];
    let mut zz = vec![0.0; n];
    let mut rr = vec![0.0; n];

    for _ in 0..passes {
        zz.copy_from_slice(values);

        for round in 0..2 {
            running_medians(&mut zz, &mut yy);

            yy.copy_from_slice(&zz);
            quadratic_flat_fix(&zz, &mut yy);

            for i in 1..n - 1 {
                zz[i] = 0.25 * yy[i - 1] + 0.5 * yy[i] + 0.25 * yy[i + 1];
            }
            zz[0] = yy[0];
            zz[n - 1] = yy[n - 1];

            if round == 0 {
                // Keep the smooth, then smooth the residuals ("twice").
                rr.copy_from_slice(&zz);
                for i in 0..n {
                    zz[i] = values[i] - zz[i];
                }
            }
        }

        let floor_at_zero = values.iter().all(|&v| v >= 0.0);
        for i in 0..n {
            let v = rr[i] + zz[i];
            values[i] = if floor_at_zero { v.max(0.0) } else { v };
        }
    }
    Ok(())
}

/// Running median 3, then 5, then 3, with end-point rules.
fn running_medians(zz: &mut [f64], yy: &mut [f64]) {
    let n = zz.len();
    for k in 0..3 {
        yy.copy_from_slice(zz);
        let (width, first, last) = if k == 1 { (5, 2, n.saturating_sub(2)) } else { (3, 1, n - 1) };
        for i in first..last {
            zz[i] = median(&yy[i - first..i - first + width]);
        }

        if k == 0 {
            zz[0] = median(&[zz[1], zz[0], 3.0 * zz[1] - 2.0 * zz[2]]);
            zz[n - 1] = median(&[zz[n - 2], zz[n - 1], 3.0 * zz[n - 2] - 2.0 * zz[n - 3]]);
        }
        if k == 1 {
            zz[1] = median(&yy[0..3]);
            zz[n - 2] = median(&yy[n - 3..n]);
        }
    }
}

/// Replace 3-point plateaus that sit on a monotone slope by a quadratic interpolation.
fn quadratic_flat_fix(zz: &[f64], yy: &mut [f64]) {
    let n = zz.len();
    for i in 2..n.saturating_sub(2) {
        if zz[i - 1] != zz[i] || zz[i] != zz[i + 1] {
            continue;
        }
        let left = zz[i - 2] - zz[i];
        let right = zz[i + 2] - zz[i];
        if left * right <= 0.0 {
            continue;
        }
        let (near, far) = if right.abs() > left.abs() { (i - 1, i - 2) } else { (i + 1, i + 2) };
        let opposite = if right.abs() > left.abs() { i + 2 } else { i - 2 };
        yy[i] = -0.5 * zz[opposite] + zz[i] / 0.75 + zz[far] / 6.0;
        yy[near] = 0.5 * (zz[far] - zz[opposite]) + zz[i];
    }
}
