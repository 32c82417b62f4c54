//! Initial fit window from histogram occupancy.

use bl_core::{Error, FitWindow, Result};
use bl_hist::Histogram;

/// Derive the starting fit window.
///
/// An unset `min` becomes the low edge of the first bin with content strictly above
/// zero; an unset `max` the low edge of the last such bin. Both edges are then clipped
/// to `[hard_min, hard_max]`. No fit is performed.
///
/// # Errors
/// [`Error::EmptyDistribution`] if no bin has content above zero.
pub fn seed_window(
    hist: &Histogram,
    min: Option<f64>,
    max: Option<f64>,
    hard_min: f64,
    hard_max: f64,
) -> Result<FitWindow> {
    let (Some(first), Some(last)) = (hist.first_bin_above(0.0), hist.last_bin_above(0.0)) else {
        return Err(Error::EmptyDistribution { name: hist.name.clone() });
    };
    let min = min.unwrap_or_else(|| hist.bin_low_edge(first)).max(hard_min);
    let max = max.unwrap_or_else(|| hist.bin_low_edge(last)).min(hard_max);
    log::debug!("{}: initial window [{min}, {max}]", hist.name);
    Ok(FitWindow::new(min, max))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn hist() -> Histogram {
        let edges = (0..=8).map(|i| i as f64 * 10.0).collect();
        Histogram::new("h", edges, vec![0.0, 0.0, 3.0, 9.0, 0.0, 4.0, 0.0, 0.0]).unwrap()
    }

    #[test]
    fn test_unset_bounds_follow_occupancy() {
        let w = seed_window(&hist(), None, None, 0.0, 80.0).unwrap();
        assert_relative_eq!(w.min, 20.0);
        assert_relative_eq!(w.max, 50.0);
    }

    #[test]
    fn test_caller_bounds_win() {
        let w = seed_window(&hist(), Some(15.0), None, 0.0, 80.0).unwrap();
        assert_relative_eq!(w.min, 15.0);
        assert_relative_eq!(w.max, 50.0);
        let w = seed_window(&hist(), None, Some(42.0), 0.0, 80.0).unwrap();
        assert_relative_eq!(w.min, 20.0);
        assert_relative_eq!(w.max, 42.0);
    }

    #[test]
    fn test_window_is_clipped_to_hard_bounds() {
        // Occupancy starts at 20 and ends at 50, both outside [25, 45].
        let w = seed_window(&hist(), None, None, 25.0, 45.0).unwrap();
        assert_relative_eq!(w.min, 25.0);
        assert_relative_eq!(w.max, 45.0);
        let w = seed_window(&hist(), Some(5.0), Some(70.0), 25.0, 45.0).unwrap();
        assert!(w.is_within(&FitWindow::new(25.0, 45.0)));
    }

    #[test]
    fn test_empty_distribution_is_an_error() {
        let empty = Histogram::uniform("empty", 8, 0.0, 80.0).unwrap();
        match seed_window(&empty, None, None, 0.0, 80.0) {
            Err(Error::EmptyDistribution { name }) => assert_eq!(name, "empty"),
            other => panic!("expected EmptyDistribution, got {other:?}"),
        }
        // Explicit bounds do not paper over an empty histogram.
        assert!(seed_window(&empty, Some(0.0), Some(10.0), 0.0, 80.0).is_err());
    }
}
