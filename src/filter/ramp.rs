//! Rate limiter for setpoint changes.
//!
//! Moves a value stepwise toward a target, never overshooting, with the step
//! size derived from the configured high limit. Used to walk an active power
//! limit toward the state machine's target power one cycle at a time.

use crate::error::{ControlError, Result};

/// Default fraction of the high limit applied per call.
pub const DEFAULT_INCREASING_RATE: f64 = 0.05;

#[derive(Debug, Clone)]
pub struct RampFilter {
    low: Option<f64>,
    high: Option<f64>,
    increasing_rate: f64,
}

impl Default for RampFilter {
    fn default() -> Self {
        Self {
            low: None,
            high: None,
            increasing_rate: DEFAULT_INCREASING_RATE,
        }
    }
}

impl RampFilter {
    /// Creates the filter. `low > high` is rejected. An `increasing_rate`
    /// outside `(0, 1)` is silently ignored and the default of 0.05 stays in
    /// effect; callers rely on that fallback.
    pub fn new(low: Option<f64>, high: Option<f64>, increasing_rate: Option<f64>) -> Result<Self> {
        let mut filter = Self::default();
        filter.set_limits(low, high)?;
        if let Some(rate) = increasing_rate {
            filter.set_increasing_rate(rate);
        }
        Ok(filter)
    }

    /// Updates the limits, e.g. when the rated apparent power of the device
    /// becomes known at runtime.
    pub fn set_limits(&mut self, low: Option<f64>, high: Option<f64>) -> Result<()> {
        if let (Some(low), Some(high)) = (low, high) {
            if low > high {
                return Err(ControlError::configuration(format!(
                    "ramp limits: low ({low}) must not exceed high ({high})"
                )));
            }
        }
        self.low = low;
        self.high = high;
        Ok(())
    }

    /// Same fallback behavior as at construction: values outside `(0, 1)`
    /// leave the previous rate in place.
    pub fn set_increasing_rate(&mut self, rate: f64) {
        if rate > 0.0 && rate < 1.0 {
            self.increasing_rate = rate;
        }
    }

    pub fn increasing_rate(&self) -> f64 {
        self.increasing_rate
    }

    /// Returns `current` moved toward `target` by at most
    /// `high * increasing_rate`, without overshoot. The target is clamped to
    /// the configured limits first. Fails if no high limit is configured.
    pub fn apply(&self, current: f64, target: f64) -> Result<f64> {
        let high = self.high.ok_or_else(|| {
            ControlError::configuration("ramp filter requires a configured high limit")
        })?;

        let mut target = target.min(high);
        if let Some(low) = self.low {
            target = target.max(low);
        }

        let delta = target - current;
        if delta == 0.0 {
            return Ok(target);
        }

        let step = high * self.increasing_rate;
        if delta.abs() <= step {
            Ok(target)
        } else {
            Ok(current + step * delta.signum())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_high_limit() {
        let filter = RampFilter::default();
        assert!(filter.apply(0.0, 100.0).is_err());
    }

    #[test]
    fn test_steps_toward_target_without_overshoot() {
        let filter = RampFilter::new(Some(0.0), Some(10_000.0), Some(0.01)).unwrap();
        // Step size 100 per call.
        let mut value = 10_000.0;
        for expected in [9_900.0, 9_800.0, 9_700.0] {
            value = filter.apply(value, 5_000.0).unwrap();
            assert_eq!(value, expected);
        }
    }

    #[test]
    fn test_reaches_target_exactly() {
        let filter = RampFilter::new(None, Some(1_000.0), Some(0.1)).unwrap();
        // 60 away with step 100: arrive in one call, no overshoot.
        assert_eq!(filter.apply(940.0, 1_000.0).unwrap(), 1_000.0);
        assert_eq!(filter.apply(1_000.0, 1_000.0).unwrap(), 1_000.0);
    }

    #[test]
    fn test_ramps_downward() {
        let filter = RampFilter::new(Some(-1_000.0), Some(1_000.0), Some(0.05)).unwrap();
        assert_eq!(filter.apply(0.0, -500.0).unwrap(), -50.0);
    }

    #[test]
    fn test_target_clamped_to_limits() {
        let filter = RampFilter::new(Some(0.0), Some(100.0), Some(0.5)).unwrap();
        assert_eq!(filter.apply(90.0, 500.0).unwrap(), 100.0);
        assert_eq!(filter.apply(10.0, -500.0).unwrap(), 0.0);
    }

    #[test]
    fn test_invalid_rate_falls_back_to_default() {
        let filter = RampFilter::new(None, Some(100.0), Some(1.5)).unwrap();
        assert_eq!(filter.increasing_rate(), DEFAULT_INCREASING_RATE);

        let filter = RampFilter::new(None, Some(100.0), Some(0.0)).unwrap();
        assert_eq!(filter.increasing_rate(), DEFAULT_INCREASING_RATE);

        let mut filter = RampFilter::new(None, Some(100.0), Some(0.2)).unwrap();
        filter.set_increasing_rate(-3.0);
        assert_eq!(filter.increasing_rate(), 0.2);
    }

    #[test]
    fn test_rejects_inverted_limits() {
        assert!(RampFilter::new(Some(10.0), Some(-10.0), None).is_err());
    }
}
