/// Turns a monotonically increasing counter into a per-second rate.
///
/// Holds exactly one previous `(value, time)` pair. The first observation
/// has no baseline and yields `None`; callers decide whether that means
/// "report zero" or "omit the field".
#[derive(Debug, Clone, Copy, Default)]
pub struct RateTracker {
    prev: Option<(f64, f64)>,
}

impl RateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the baseline without producing a rate, so the first real tick
    /// diffs against connection time instead of process start.
    pub fn prime(&mut self, value: f64, at: f64) {
        self.prev = Some((value, at));
    }

    /// Record a new counter reading taken at `at` (seconds) and return the
    /// rate since the previous reading.
    ///
    /// Returns `None` with no baseline, `Some(0.0)` when the clock did not
    /// advance or the counter went backward (e.g. a driver reset).
    pub fn update(&mut self, value: f64, at: f64) -> Option<f64> {
        let rate = self.prev.map(|(prev_value, prev_at)| {
            if at <= prev_at || value < prev_value {
                0.0
            } else {
                (value - prev_value) / (at - prev_at)
            }
        });
        self.prev = Some((value, at));
        rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn first_update_has_no_baseline() {
        let mut tracker = RateTracker::new();
        assert_eq!(tracker.update(1_000_000.0, 0.0), None);
    }

    #[test]
    fn rate_is_delta_over_elapsed() {
        let mut tracker = RateTracker::new();
        tracker.prime(1_000_000.0, 0.0);
        let rate = tracker.update(1_500_000.0, 1.0).unwrap();
        assert!((rate - 500_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn stalled_clock_yields_zero() {
        let mut tracker = RateTracker::new();
        tracker.prime(100.0, 5.0);
        assert_eq!(tracker.update(200.0, 5.0), Some(0.0));
    }

    #[test]
    fn backward_clock_yields_zero() {
        let mut tracker = RateTracker::new();
        tracker.prime(100.0, 5.0);
        assert_eq!(tracker.update(200.0, 4.0), Some(0.0));
    }

    #[test]
    fn counter_regression_clamps_to_zero() {
        let mut tracker = RateTracker::new();
        tracker.prime(1000.0, 0.0);
        assert_eq!(tracker.update(10.0, 1.0), Some(0.0));
    }

    #[test]
    fn prime_does_not_produce_a_rate() {
        let mut tracker = RateTracker::new();
        tracker.prime(50.0, 0.0);
        tracker.prime(75.0, 1.0);
        // Still diffs against the latest baseline only.
        let rate = tracker.update(175.0, 2.0).unwrap();
        assert!((rate - 100.0).abs() < f64::EPSILON);
    }

    proptest! {
        #[test]
        fn rate_matches_formula_and_is_nonnegative(
            prev in 0.0f64..1e12,
            delta in 0.0f64..1e9,
            t0 in 0.0f64..1e6,
            dt in 0.01f64..1e6,
        ) {
            let mut tracker = RateTracker::new();
            tracker.prime(prev, t0);
            let rate = tracker.update(prev + delta, t0 + dt).unwrap();
            let expected = delta / dt;
            // Tolerance covers the float rounding of (prev + delta) - prev.
            prop_assert!(rate >= 0.0);
            prop_assert!((rate - expected).abs() <= 0.1 + 1e-9 * expected);
        }
    }
}
