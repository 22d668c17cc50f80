//! Reserve-capacity protection controller.
//!
//! Keeps a configured share of the battery capacity in reserve for emergency
//! power. The state machine decides the target discharge limit and how fast
//! the applied limit may move toward it; the controller walks the limit with
//! a ramp filter and reports `None` once no restriction is needed anymore.

pub mod states;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::filter::RampFilter;
use crate::statemachine::StateMachine;

pub use states::{ReserveHandler, ReserveInput, Setpoint, State};

/// Reserve SoC values outside this range are flagged and clamped: below 5 %
/// most batteries cannot reliably black-start, above 100 % is meaningless.
pub const RESERVE_SOC_MIN: u8 = 5;
pub const RESERVE_SOC_MAX: u8 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReserveConfig {
    /// Whether the reserve protection is active at all.
    pub enabled: bool,
    /// SoC percentage to keep in reserve.
    pub reserve_soc: u8,
}

impl Default for ReserveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reserve_soc: 20,
        }
    }
}

impl ReserveConfig {
    /// Diagnostic flag for a configured reserve outside the allowed range.
    pub fn reserve_soc_out_of_range(&self) -> bool {
        !(RESERVE_SOC_MIN..=RESERVE_SOC_MAX).contains(&self.reserve_soc)
    }

    /// Reserve SoC actually used for control, clamped into the allowed range.
    pub fn effective_reserve_soc(&self) -> u8 {
        self.reserve_soc.clamp(RESERVE_SOC_MIN, RESERVE_SOC_MAX)
    }
}

/// Owns the reserve state machine and the ramp filter, and converts per-cycle
/// setpoints into an applied discharge power limit.
pub struct ReserveController {
    config: ReserveConfig,
    machine: StateMachine<ReserveHandler>,
    ramp: RampFilter,
    /// Limit the ramp walked to in the previous cycle, in W.
    last_limit: Option<f64>,
    /// Limit reported to the adapter in the previous successful cycle.
    last_applied: Option<i64>,
}

impl ReserveController {
    pub fn new(config: ReserveConfig) -> Self {
        if config.reserve_soc_out_of_range() {
            warn!(
                reserve_soc = config.reserve_soc,
                "configured reserve soc is out of range; clamping for control"
            );
        }
        let handler = ReserveHandler::new(config.effective_reserve_soc());
        Self {
            config,
            machine: StateMachine::new(handler, State::Undefined),
            ramp: RampFilter::default(),
            last_limit: None,
            last_applied: None,
        }
    }

    /// Runs one control cycle, recovering from evaluation failures: on error
    /// the previous cycle's limit stays in effect.
    pub fn run_cycle(&mut self, input: &ReserveInput) -> Option<i64> {
        match self.cycle(input) {
            Ok(limit) => {
                self.last_applied = limit;
                limit
            }
            Err(error) => {
                warn!(%error, "cycle evaluation failed; previous power limit stays in effect");
                self.last_applied
            }
        }
    }

    /// One control cycle: step the state machine, then move the applied limit
    /// toward the target by at most the setpoint's ramp power. `None` means
    /// "no override": the limit has ramped back up to the rated power.
    pub fn cycle(&mut self, input: &ReserveInput) -> Result<Option<i64>> {
        if !self.config.enabled {
            return Ok(None);
        }

        let before = self.machine.current_state();
        let setpoint = *self.machine.step(input)?;
        let state = self.machine.current_state();
        if state != before {
            info!(from = ?before, to = ?state, soc = ?input.soc, "reserve state changed");
        }

        let Some(max_apparent_power) = input.max_apparent_power else {
            return Ok(None);
        };
        let Some(target) = setpoint.target_power else {
            return Ok(None);
        };

        // Force-charge targets are negative, so the limit may swing across
        // the full rated power range.
        self.ramp
            .set_limits(Some(-max_apparent_power), Some(max_apparent_power))?;
        self.ramp
            .set_increasing_rate(setpoint.ramp_power / max_apparent_power);

        let current = self.last_limit.unwrap_or(max_apparent_power);
        let limit = self.ramp.apply(current, target)?;
        self.last_limit = Some(limit);

        if limit >= max_apparent_power {
            Ok(None)
        } else {
            Ok(Some(limit.round() as i64))
        }
    }

    pub fn state(&self) -> State {
        self.machine.current_state()
    }

    /// Setpoint of the most recent successful cycle, for diagnostics.
    pub fn setpoint(&self) -> Option<Setpoint> {
        self.machine.latched_output().copied()
    }

    pub fn config(&self) -> &ReserveConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(soc: u8) -> ReserveInput {
        ReserveInput {
            soc: Some(soc),
            max_apparent_power: Some(10_000.0),
            grid_charge_allowed: true,
            production_dc: Some(0.0),
            production_ac: Some(0.0),
        }
    }

    #[test]
    fn test_reserve_soc_range_flag() {
        let config = |reserve_soc| ReserveConfig {
            enabled: true,
            reserve_soc,
        };
        assert!(!config(20).reserve_soc_out_of_range());
        assert!(!config(5).reserve_soc_out_of_range());
        assert!(!config(100).reserve_soc_out_of_range());
        assert!(config(4).reserve_soc_out_of_range());
        assert!(config(101).reserve_soc_out_of_range());
        assert_eq!(config(4).effective_reserve_soc(), 5);
        assert_eq!(config(101).effective_reserve_soc(), 100);
    }

    #[test]
    fn test_disabled_controller_never_limits() {
        let mut controller = ReserveController::new(ReserveConfig {
            enabled: false,
            reserve_soc: 20,
        });
        assert_eq!(controller.run_cycle(&input(10)), None);
        assert_eq!(controller.state(), State::Undefined);
    }

    #[test]
    fn test_no_limit_reports_no_override() {
        let mut controller = ReserveController::new(ReserveConfig::default());
        assert_eq!(controller.run_cycle(&input(80)), None); // Undefined cycle
        assert_eq!(controller.state(), State::NoLimit);
        assert_eq!(controller.run_cycle(&input(80)), None);
        let setpoint = controller.setpoint().unwrap();
        assert_eq!(setpoint.target_power, Some(10_000.0));
        assert_eq!(setpoint.ramp_power, 100.0);
    }

    #[test]
    fn test_limit_ramps_toward_half_rated_power() {
        let mut controller = ReserveController::new(ReserveConfig::default());
        controller.run_cycle(&input(80)); // Undefined -> NoLimit
        controller.run_cycle(&input(21)); // NoLimit -> AboveReserveSoc

        // AboveReserveSoc: target 5000, 1 % ramp from the rated power down.
        assert_eq!(controller.run_cycle(&input(21)), Some(9_900));
        assert_eq!(controller.run_cycle(&input(21)), Some(9_800));
        assert_eq!(controller.run_cycle(&input(21)), Some(9_700));
    }

    #[test]
    fn test_evaluation_failure_latches_previous_limit() {
        let mut controller = ReserveController::new(ReserveConfig::default());
        controller.run_cycle(&input(80));
        controller.run_cycle(&input(21));
        assert_eq!(controller.run_cycle(&input(21)), Some(9_900));

        // SoC drops out while actively limiting: limit and state must hold.
        let mut broken = input(21);
        broken.soc = None;
        assert_eq!(controller.run_cycle(&broken), Some(9_900));
        assert_eq!(controller.state(), State::AboveReserveSoc);

        // Recovered input continues from where the ramp stopped.
        assert_eq!(controller.run_cycle(&input(21)), Some(9_800));
    }
}
