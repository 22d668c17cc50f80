//! First-order lag (PT1) filter.

use crate::error::{ControlError, Result};

/// PT1 low-pass: `y[n] = (x[n] + (tau/dt) * y[n-1]) / (1 + tau/dt)`.
///
/// A time constant of zero disables filtering entirely and passes the
/// truncated input through.
#[derive(Debug, Clone)]
pub struct Pt1Filter {
    time_constant_s: f64,
    cycle_time_s: f64,
    last_output: f64,
}

impl Pt1Filter {
    pub fn new(time_constant_s: f64, cycle_time_s: f64) -> Result<Self> {
        if time_constant_s < 0.0 {
            return Err(ControlError::configuration(format!(
                "time constant must not be negative, got {time_constant_s}"
            )));
        }
        if cycle_time_s <= 0.0 {
            return Err(ControlError::configuration(format!(
                "cycle time must be positive, got {cycle_time_s}"
            )));
        }
        Ok(Self {
            time_constant_s,
            cycle_time_s,
            last_output: 0.0,
        })
    }

    pub fn apply(&mut self, value: f64) -> f64 {
        if self.time_constant_s == 0.0 {
            self.last_output = value;
            return value.trunc();
        }
        let k = self.time_constant_s / self.cycle_time_s;
        self.last_output = (value + k * self.last_output) / (1.0 + k);
        self.last_output
    }

    pub fn reset(&mut self) {
        self.last_output = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_time_constant_truncates_input() {
        let mut pt1 = Pt1Filter::new(0.0, 1.0).unwrap();
        for x in [0.2, 1.7, -3.9, 100.999, -0.5] {
            assert_eq!(pt1.apply(x), x.trunc());
        }
    }

    #[test]
    fn test_converges_toward_constant_input() {
        let mut pt1 = Pt1Filter::new(5.0, 1.0).unwrap();
        let mut y = 0.0;
        for _ in 0..100 {
            y = pt1.apply(100.0);
        }
        assert!((y - 100.0).abs() < 0.1);
    }

    #[test]
    fn test_single_step_matches_recurrence() {
        let mut pt1 = Pt1Filter::new(2.0, 1.0).unwrap();
        // k = 2: y = (60 + 2 * 0) / 3 = 20
        assert!((pt1.apply(60.0) - 20.0).abs() < 1e-9);
        // y = (60 + 2 * 20) / 3
        assert!((pt1.apply(60.0) - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_smooths_more_with_larger_time_constant() {
        let mut slow = Pt1Filter::new(10.0, 1.0).unwrap();
        let mut fast = Pt1Filter::new(1.0, 1.0).unwrap();
        assert!(slow.apply(100.0) < fast.apply(100.0));
    }

    #[test]
    fn test_rejects_invalid_construction() {
        assert!(Pt1Filter::new(-1.0, 1.0).is_err());
        assert!(Pt1Filter::new(1.0, 0.0).is_err());
    }
}
