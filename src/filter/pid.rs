//! PID filter with priority-ordered anti-windup.
//!
//! Computes a correction from proportional, integral and derivative terms,
//! with optional output limits, a target-distance clamp, a per-call ramp
//! window and output blending. The integral memory is protected against
//! windup by three prioritized rules: reset on output saturation, reset on
//! ramp violation, clamp while integrating.

use serde::{Deserialize, Serialize};

use crate::error::{ControlError, Result};

/// PID filter configuration. Validated by [`PidFilter::new`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PidConfig {
    /// Proportional gain
    pub p: f64,
    /// Integral gain
    pub i: f64,
    /// Derivative gain
    pub d: f64,

    /// Output limits `(low, high)`, applied to the output and driving the
    /// saturation anti-windup rule. Must satisfy `low <= high`.
    pub output_limits: Option<(f64, f64)>,

    /// Maximum distance the target may lie from the measured value. The
    /// target is clamped into `[measured - limit, measured + limit]` before
    /// the error is formed.
    pub target_distance_limit: Option<f64>,

    /// Maximum output change per call. Outputs outside
    /// `[last_output - ramp, last_output + ramp]` are clamped and reset the
    /// integral memory.
    pub ramp_limit: Option<f64>,

    /// Magnitude limit for the integral term. Also bounds the error
    /// accumulator at `limit / i`.
    pub i_limit: Option<f64>,

    /// Output blending factor in `[0, 1)`: the returned output is
    /// `last_output * factor + output * (1 - factor)`. `0` is pass-through.
    pub output_filter: Option<f64>,
}

impl PidConfig {
    pub fn new(p: f64, i: f64, d: f64) -> Self {
        Self {
            p,
            i,
            d,
            output_limits: None,
            target_distance_limit: None,
            ramp_limit: None,
            i_limit: None,
            output_filter: None,
        }
    }

    pub fn with_output_limits(mut self, low: f64, high: f64) -> Self {
        self.output_limits = Some((low, high));
        self
    }

    pub fn with_target_distance_limit(mut self, limit: f64) -> Self {
        self.target_distance_limit = Some(limit);
        self
    }

    pub fn with_ramp_limit(mut self, limit: f64) -> Self {
        self.ramp_limit = Some(limit);
        self
    }

    pub fn with_i_limit(mut self, limit: f64) -> Self {
        self.i_limit = Some(limit);
        self
    }

    pub fn with_output_filter(mut self, factor: f64) -> Self {
        self.output_filter = Some(factor);
        self
    }

    fn validate(&self) -> Result<()> {
        if let Some((low, high)) = self.output_limits {
            if low > high {
                return Err(ControlError::configuration(format!(
                    "output limits: low ({low}) must not exceed high ({high})"
                )));
            }
        }
        if let Some(limit) = self.target_distance_limit {
            if limit <= 0.0 {
                return Err(ControlError::configuration(format!(
                    "target distance limit must be positive, got {limit}"
                )));
            }
        }
        if let Some(limit) = self.ramp_limit {
            if limit <= 0.0 {
                return Err(ControlError::configuration(format!(
                    "ramp limit must be positive, got {limit}"
                )));
            }
        }
        if let Some(limit) = self.i_limit {
            if limit <= 0.0 {
                return Err(ControlError::configuration(format!(
                    "I-term limit must be positive, got {limit}"
                )));
            }
        }
        if let Some(factor) = self.output_filter {
            if !(0.0..1.0).contains(&factor) {
                return Err(ControlError::configuration(format!(
                    "output filter factor must lie in [0, 1), got {factor}"
                )));
            }
        }
        Ok(())
    }
}

/// PID filter. Owns its mutable memory (error accumulator, last input, last
/// output) for the lifetime of the owning controller.
#[derive(Debug, Clone)]
pub struct PidFilter {
    config: PidConfig,

    first_run: bool,
    last_input: f64,
    last_output: f64,
    error_sum: f64,
}

impl PidFilter {
    /// Creates the filter. Rejects invalid configuration instead of silently
    /// correcting it.
    pub fn new(config: PidConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            first_run: true,
            last_input: 0.0,
            last_output: 0.0,
            error_sum: 0.0,
        })
    }

    /// Applies the filter to one measured/target pair and returns the output.
    pub fn apply(&mut self, input: f64, target: f64) -> f64 {
        let cfg = &self.config;

        // No target beyond the configured distance from the measured value.
        let target = match cfg.target_distance_limit {
            Some(limit) => target.clamp(input - limit, input + limit),
            None => target,
        };

        let error = target - input;
        let output_p = cfg.p * error;

        // Seed the memory on the first call so the derivative term does not
        // spike and the ramp window has a meaningful anchor.
        if self.first_run {
            self.last_input = input;
            self.last_output = output_p;
            self.first_run = false;
        }

        let mut output_i = cfg.i * self.error_sum;
        if let Some(limit) = cfg.i_limit {
            output_i = output_i.clamp(-limit, limit);
        }

        let output_d = -cfg.d * (input - self.last_input);

        let output = output_p + output_i + output_d;

        let output_limits = cfg.output_limits;
        let ramp_limit = cfg.ramp_limit;
        let output_filter = cfg.output_filter;

        self.update_error_sum(output, error);

        let mut output = output;
        if let Some((low, high)) = output_limits {
            output = output.clamp(low, high);
        }
        if let Some(ramp) = ramp_limit {
            output = output.clamp(self.last_output - ramp, self.last_output + ramp);
        }
        if let Some(factor) = output_filter {
            output = self.last_output * factor + output * (1.0 - factor);
        }

        self.last_input = input;
        self.last_output = output;
        output
    }

    /// Anti-windup: exactly one rule applies, in priority order.
    fn update_error_sum(&mut self, output: f64, error: f64) {
        let cfg = &self.config;

        let saturated = matches!(cfg.output_limits,
            Some((low, high)) if low != high && (output < low || output > high));
        let ramp_violated = matches!(cfg.ramp_limit,
            Some(ramp) if output < self.last_output - ramp || output > self.last_output + ramp);

        if saturated || ramp_violated {
            self.error_sum = error;
        } else if let Some(limit) = cfg.i_limit.filter(|_| cfg.i != 0.0) {
            let error_max = limit / cfg.i;
            self.error_sum = (self.error_sum + error).clamp(-error_max, error_max);
        } else {
            self.error_sum += error;
        }
    }

    /// Zeroes the error accumulator and re-arms the first-call seeding.
    pub fn reset(&mut self) {
        self.first_run = true;
        self.error_sum = 0.0;
    }

    /// Current error accumulator, for diagnostics.
    pub fn error_sum(&self) -> f64 {
        self.error_sum
    }

    /// Output of the previous call, for diagnostics.
    pub fn last_output(&self) -> f64 {
        self.last_output
    }
}
