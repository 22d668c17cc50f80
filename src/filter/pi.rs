//! Simplified PI filter.
//!
//! Variant of the PID filter without a derivative term, for slow loops where
//! the integral alone removes the steady-state error. The error accumulator
//! is bounded by a fixed multiple of the output limits rather than by the
//! integral gain.

use serde::{Deserialize, Serialize};

use crate::error::{ControlError, Result};

/// Bound for the error accumulator, as a multiple of `max(|low|, |high|)`.
/// Fixed on purpose, independent of the integral gain.
const ERROR_SUM_LIMIT_FACTOR: f64 = 10.0;

/// PI filter configuration. Validated by [`PiFilter::new`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PiConfig {
    /// Proportional gain
    pub p: f64,
    /// Integral reset time in seconds
    pub ti_s: f64,
    /// Control cycle period in seconds
    pub cycle_time_s: f64,
    /// Output limits `(low, high)`; also bounds the error accumulator.
    pub output_limits: Option<(f64, f64)>,
}

impl PiConfig {
    pub fn new(p: f64, ti_s: f64, cycle_time_s: f64) -> Self {
        Self {
            p,
            ti_s,
            cycle_time_s,
            output_limits: None,
        }
    }

    pub fn with_output_limits(mut self, low: f64, high: f64) -> Self {
        self.output_limits = Some((low, high));
        self
    }
}

/// PI filter with bounded integral memory.
#[derive(Debug, Clone)]
pub struct PiFilter {
    config: PiConfig,
    error_sum: f64,
}

impl PiFilter {
    pub fn new(config: PiConfig) -> Result<Self> {
        if config.ti_s <= 0.0 {
            return Err(ControlError::configuration(format!(
                "reset time must be positive, got {}",
                config.ti_s
            )));
        }
        if config.cycle_time_s <= 0.0 {
            return Err(ControlError::configuration(format!(
                "cycle time must be positive, got {}",
                config.cycle_time_s
            )));
        }
        if let Some((low, high)) = config.output_limits {
            if low > high {
                return Err(ControlError::configuration(format!(
                    "output limits: low ({low}) must not exceed high ({high})"
                )));
            }
        }
        Ok(Self {
            config,
            error_sum: 0.0,
        })
    }

    /// Applies the filter and returns the output, rounded to the nearest
    /// integer value.
    pub fn apply(&mut self, input: f64, target: f64) -> f64 {
        let cfg = &self.config;
        let error = target - input;

        self.error_sum += error;
        if let Some((low, high)) = cfg.output_limits {
            let bound = ERROR_SUM_LIMIT_FACTOR * low.abs().max(high.abs());
            self.error_sum = self.error_sum.clamp(-bound, bound);
        }

        let mut output = cfg.p * (error + cfg.cycle_time_s / cfg.ti_s * self.error_sum);
        if let Some((low, high)) = cfg.output_limits {
            output = output.clamp(low, high);
        }
        output.round()
    }

    /// Zeroes the error accumulator.
    pub fn reset(&mut self) {
        self.error_sum = 0.0;
    }

    pub fn error_sum(&self) -> f64 {
        self.error_sum
    }
}
