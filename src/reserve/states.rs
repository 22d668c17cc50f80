//! State set and handler table for reserve-capacity protection.
//!
//! Keeps a configured SoC headroom available for emergency use: discharge is
//! progressively limited as the SoC approaches the reserve threshold and the
//! battery is force-charged (from PV, or from the grid when permitted) once
//! it falls below. The comparison bands around the threshold are deliberately
//! asymmetric so the machine does not oscillate when the SoC hovers at the
//! boundary.

use serde::{Deserialize, Serialize};

use crate::error::{ControlError, Result};
use crate::statemachine::{Bookkeeping, CycleHandler, MachineState, Step};

/// Ramp rate as a fraction of the maximum apparent power, per cycle.
const RAMP_FRACTION: f64 = 0.01;
/// Faster ramp while below the reserve, to pull discharge down quickly.
const RAMP_FRACTION_BELOW_RESERVE: f64 = 0.05;

/// Operating modes of the reserve-capacity controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    Undefined,
    NoLimit,
    AboveReserveSoc,
    AtReserveSoc,
    BelowReserveSoc,
    ForceChargePv,
    ForceChargeGrid,
}

impl MachineState for State {
    fn is_neutral(&self) -> bool {
        matches!(self, State::Undefined)
    }
}

/// Read-only input snapshot for one cycle, built by the caller from the live
/// sensor values.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ReserveInput {
    /// State of charge in percent (0..=100), if known.
    pub soc: Option<u8>,
    /// Rated apparent power of the storage inverter in W.
    pub max_apparent_power: Option<f64>,
    /// Whether force-charging from the grid is permitted.
    pub grid_charge_allowed: bool,
    /// Aggregate DC-side PV production in W.
    pub production_dc: Option<f64>,
    /// Aggregate AC-side PV production in W.
    pub production_ac: Option<f64>,
}

/// Per-cycle setpoint computed by a state handler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Setpoint {
    /// Discharge power limit target in W; `None` means "no override this
    /// cycle".
    pub target_power: Option<f64>,
    /// Maximum limit change per cycle in W.
    pub ramp_power: f64,
}

/// Total handler mapping for [`State`]. One exhaustive match, no registry.
pub struct ReserveHandler {
    reserve_soc: i32,
}

impl ReserveHandler {
    pub fn new(reserve_soc: u8) -> Self {
        Self {
            reserve_soc: i32::from(reserve_soc),
        }
    }

    /// SoC and rated power are required in every state that actively limits.
    fn required(&self, input: &ReserveInput) -> Result<(i32, f64)> {
        let soc = input
            .soc
            .ok_or_else(|| ControlError::evaluation("soc is undefined"))?;
        let max_apparent_power = input
            .max_apparent_power
            .ok_or_else(|| ControlError::evaluation("max apparent power is undefined"))?;
        Ok((i32::from(soc), max_apparent_power))
    }

    fn ramp_power(&self, input: &ReserveInput, fraction: f64) -> f64 {
        fraction * input.max_apparent_power.unwrap_or(0.0)
    }

    fn undefined(&self, input: &ReserveInput) -> Step<State, Setpoint> {
        let r = self.reserve_soc;
        let next = match input.soc.map(i32::from) {
            None => State::NoLimit,
            Some(soc) if soc < r - 1 => State::ForceChargeGrid,
            Some(soc) if soc == r - 1 => State::ForceChargePv,
            Some(soc) if soc == r => State::AtReserveSoc,
            Some(soc) if soc == r + 1 => State::AboveReserveSoc,
            Some(_) => State::NoLimit,
        };
        Step {
            next,
            output: Setpoint {
                target_power: None,
                ramp_power: self.ramp_power(input, RAMP_FRACTION),
            },
        }
    }

    fn no_limit(&self, input: &ReserveInput) -> Step<State, Setpoint> {
        let next = match input.soc.map(i32::from) {
            Some(soc) if soc <= self.reserve_soc + 1 => State::AboveReserveSoc,
            _ => State::NoLimit,
        };
        Step {
            next,
            output: Setpoint {
                target_power: input.max_apparent_power,
                ramp_power: self.ramp_power(input, RAMP_FRACTION),
            },
        }
    }

    fn above_reserve_soc(&self, input: &ReserveInput) -> Result<Step<State, Setpoint>> {
        let (soc, max_apparent_power) = self.required(input)?;
        let r = self.reserve_soc;

        let next = if soc <= r {
            State::AtReserveSoc
        } else if soc > r + 1 {
            State::NoLimit
        } else {
            State::AboveReserveSoc
        };

        // Allow discharging at half the rated power, or at the DC production
        // level when the PV currently produces more than that.
        let target = (max_apparent_power / 2.0).max(input.production_dc.unwrap_or(0.0));
        Ok(Step {
            next,
            output: Setpoint {
                target_power: Some(target),
                ramp_power: self.ramp_power(input, RAMP_FRACTION),
            },
        })
    }

    fn at_reserve_soc(
        &self,
        input: &ReserveInput,
        bookkeeping: &Bookkeeping<State>,
    ) -> Result<Step<State, Setpoint>> {
        let (soc, _) = self.required(input)?;
        let r = self.reserve_soc;

        // One extra percent of headroom after a grid force-charge, so a
        // fresh charge is not immediately followed by discharge.
        let soc_buffer = if bookkeeping.last_active == State::ForceChargeGrid {
            1
        } else {
            0
        };

        let next = if soc < r {
            State::BelowReserveSoc
        } else if soc > r + soc_buffer {
            State::AboveReserveSoc
        } else {
            State::AtReserveSoc
        };

        // Hold discharge at the PV production level so the SoC is kept.
        let target = input.production_dc.unwrap_or(0.0).max(0.0);
        Ok(Step {
            next,
            output: Setpoint {
                target_power: Some(target),
                ramp_power: self.ramp_power(input, RAMP_FRACTION),
            },
        })
    }

    fn below_reserve_soc(&self, input: &ReserveInput) -> Result<Step<State, Setpoint>> {
        let (soc, _) = self.required(input)?;
        let r = self.reserve_soc;

        let next = if soc <= r - 2 && input.grid_charge_allowed {
            State::ForceChargeGrid
        } else if soc <= r - 1 || soc <= 0 {
            State::ForceChargePv
        } else if soc > r {
            State::AtReserveSoc
        } else {
            State::BelowReserveSoc
        };

        Ok(Step {
            next,
            output: Setpoint {
                target_power: Some(0.0),
                ramp_power: self.ramp_power(input, RAMP_FRACTION_BELOW_RESERVE),
            },
        })
    }

    fn force_charge_pv(&self, input: &ReserveInput) -> Result<Step<State, Setpoint>> {
        let (soc, _) = self.required(input)?;
        let r = self.reserve_soc;

        let next = if soc >= r + 1 || soc == 100 {
            State::AtReserveSoc
        } else if soc <= r - 2 && input.grid_charge_allowed {
            State::ForceChargeGrid
        } else {
            State::ForceChargePv
        };

        // Charge with whatever the AC-side PV currently delivers.
        let target = -input.production_ac.unwrap_or(0.0).max(0.0);
        Ok(Step {
            next,
            output: Setpoint {
                target_power: Some(target),
                ramp_power: self.ramp_power(input, RAMP_FRACTION),
            },
        })
    }

    fn force_charge_grid(&self, input: &ReserveInput) -> Result<Step<State, Setpoint>> {
        let (soc, max_apparent_power) = self.required(input)?;
        let r = self.reserve_soc;

        let next = if !input.grid_charge_allowed {
            if soc <= r - 1 {
                State::BelowReserveSoc
            } else {
                State::AtReserveSoc
            }
        } else if soc >= r + 1 || soc == 100 {
            State::AtReserveSoc
        } else {
            State::ForceChargeGrid
        };

        // Charge hard while far below the reserve, gently close to it.
        let target = if soc <= r - 4 || soc <= 0 {
            -0.5 * max_apparent_power
        } else {
            -0.1 * max_apparent_power
        };
        Ok(Step {
            next,
            output: Setpoint {
                target_power: Some(target),
                ramp_power: self.ramp_power(input, RAMP_FRACTION),
            },
        })
    }
}

impl CycleHandler for ReserveHandler {
    type State = State;
    type Input = ReserveInput;
    type Output = Setpoint;

    fn handle(
        &mut self,
        state: State,
        input: &ReserveInput,
        bookkeeping: &Bookkeeping<State>,
    ) -> Result<Step<State, Setpoint>> {
        match state {
            State::Undefined => Ok(self.undefined(input)),
            State::NoLimit => Ok(self.no_limit(input)),
            State::AboveReserveSoc => self.above_reserve_soc(input),
            State::AtReserveSoc => self.at_reserve_soc(input, bookkeeping),
            State::BelowReserveSoc => self.below_reserve_soc(input),
            State::ForceChargePv => self.force_charge_pv(input),
            State::ForceChargeGrid => self.force_charge_grid(input),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn input(soc: impl Into<Option<u8>>, grid_charge_allowed: bool) -> ReserveInput {
        ReserveInput {
            soc: soc.into(),
            max_apparent_power: Some(10_000.0),
            grid_charge_allowed,
            production_dc: Some(0.0),
            production_ac: Some(0.0),
        }
    }

    fn neutral_bookkeeping() -> Bookkeeping<State> {
        Bookkeeping {
            last_active: State::Undefined,
            previous: State::Undefined,
        }
    }

    fn next_state(state: State, soc: impl Into<Option<u8>>, grid: bool) -> State {
        ReserveHandler::new(20)
            .handle(state, &input(soc, grid), &neutral_bookkeeping())
            .unwrap()
            .next
    }

    #[rstest]
    // Undefined resolves by distance to the reserve threshold.
    #[case(State::Undefined, Some(17), State::ForceChargeGrid)]
    #[case(State::Undefined, Some(19), State::ForceChargePv)]
    #[case(State::Undefined, Some(20), State::AtReserveSoc)]
    #[case(State::Undefined, Some(21), State::AboveReserveSoc)]
    #[case(State::Undefined, Some(50), State::NoLimit)]
    #[case(State::Undefined, None, State::NoLimit)]
    // NoLimit enters the limiting band one percent early.
    #[case(State::NoLimit, Some(22), State::NoLimit)]
    #[case(State::NoLimit, Some(21), State::AboveReserveSoc)]
    #[case(State::NoLimit, None, State::NoLimit)]
    // AboveReserveSoc.
    #[case(State::AboveReserveSoc, Some(20), State::AtReserveSoc)]
    #[case(State::AboveReserveSoc, Some(21), State::AboveReserveSoc)]
    #[case(State::AboveReserveSoc, Some(22), State::NoLimit)]
    // AtReserveSoc without a preceding grid charge.
    #[case(State::AtReserveSoc, Some(19), State::BelowReserveSoc)]
    #[case(State::AtReserveSoc, Some(20), State::AtReserveSoc)]
    #[case(State::AtReserveSoc, Some(21), State::AboveReserveSoc)]
    // BelowReserveSoc.
    #[case(State::BelowReserveSoc, Some(18), State::ForceChargeGrid)]
    #[case(State::BelowReserveSoc, Some(19), State::ForceChargePv)]
    #[case(State::BelowReserveSoc, Some(20), State::BelowReserveSoc)]
    #[case(State::BelowReserveSoc, Some(21), State::AtReserveSoc)]
    // ForceChargePv.
    #[case(State::ForceChargePv, Some(21), State::AtReserveSoc)]
    #[case(State::ForceChargePv, Some(100), State::AtReserveSoc)]
    #[case(State::ForceChargePv, Some(18), State::ForceChargeGrid)]
    #[case(State::ForceChargePv, Some(19), State::ForceChargePv)]
    // ForceChargeGrid with grid charging still allowed.
    #[case(State::ForceChargeGrid, Some(21), State::AtReserveSoc)]
    #[case(State::ForceChargeGrid, Some(100), State::AtReserveSoc)]
    #[case(State::ForceChargeGrid, Some(20), State::ForceChargeGrid)]
    fn test_transition_table(
        #[case] state: State,
        #[case] soc: Option<u8>,
        #[case] expected: State,
    ) {
        assert_eq!(next_state(state, soc, true), expected);
    }

    #[rstest]
    // Grid charging disabled: BelowReserveSoc falls back to PV charging…
    #[case(State::BelowReserveSoc, Some(18), State::ForceChargePv)]
    // …and ForceChargeGrid backs out to where the SoC says it belongs.
    #[case(State::ForceChargeGrid, Some(19), State::BelowReserveSoc)]
    #[case(State::ForceChargeGrid, Some(20), State::AtReserveSoc)]
    fn test_grid_charge_revoked(
        #[case] state: State,
        #[case] soc: Option<u8>,
        #[case] expected: State,
    ) {
        assert_eq!(next_state(state, soc, false), expected);
    }

    #[test]
    fn test_at_reserve_buffer_after_grid_charge() {
        let mut handler = ReserveHandler::new(20);
        let after_grid_charge = Bookkeeping {
            last_active: State::ForceChargeGrid,
            previous: State::ForceChargeGrid,
        };

        // With the buffer, 21 % is still "at reserve"…
        let step = handler
            .handle(State::AtReserveSoc, &input(21, true), &after_grid_charge)
            .unwrap();
        assert_eq!(step.next, State::AtReserveSoc);

        // …22 % leaves, and without the buffer 21 % already leaves.
        let step = handler
            .handle(State::AtReserveSoc, &input(22, true), &after_grid_charge)
            .unwrap();
        assert_eq!(step.next, State::AboveReserveSoc);
        assert_eq!(next_state(State::AtReserveSoc, 21, true), State::AboveReserveSoc);
    }

    #[test]
    fn test_setpoints_per_state() {
        let mut handler = ReserveHandler::new(20);
        let book = neutral_bookkeeping();

        let step = handler.handle(State::NoLimit, &input(50, true), &book).unwrap();
        assert_eq!(step.output.target_power, Some(10_000.0));
        assert_eq!(step.output.ramp_power, 100.0);

        let mut with_pv = input(21, true);
        with_pv.production_dc = Some(6_000.0);
        let step = handler
            .handle(State::AboveReserveSoc, &with_pv, &book)
            .unwrap();
        assert_eq!(step.output.target_power, Some(6_000.0));

        with_pv.production_dc = Some(2_000.0);
        let step = handler
            .handle(State::AboveReserveSoc, &with_pv, &book)
            .unwrap();
        assert_eq!(step.output.target_power, Some(5_000.0));

        let step = handler
            .handle(State::BelowReserveSoc, &input(19, true), &book)
            .unwrap();
        assert_eq!(step.output.target_power, Some(0.0));
        assert_eq!(step.output.ramp_power, 500.0);

        let mut with_ac = input(19, true);
        with_ac.production_ac = Some(3_000.0);
        let step = handler
            .handle(State::ForceChargePv, &with_ac, &book)
            .unwrap();
        assert_eq!(step.output.target_power, Some(-3_000.0));

        // Deep below the reserve: charge at half the rated power.
        let step = handler
            .handle(State::ForceChargeGrid, &input(16, true), &book)
            .unwrap();
        assert_eq!(step.output.target_power, Some(-5_000.0));
        // Close to the reserve: gentle charge.
        let step = handler
            .handle(State::ForceChargeGrid, &input(19, true), &book)
            .unwrap();
        assert_eq!(step.output.target_power, Some(-1_000.0));
    }

    #[test]
    fn test_active_states_require_soc_and_rated_power() {
        let mut handler = ReserveHandler::new(20);
        let book = neutral_bookkeeping();

        let no_soc = ReserveInput {
            max_apparent_power: Some(10_000.0),
            ..Default::default()
        };
        let no_power = ReserveInput {
            soc: Some(19),
            ..Default::default()
        };

        for state in [
            State::AboveReserveSoc,
            State::AtReserveSoc,
            State::BelowReserveSoc,
            State::ForceChargePv,
            State::ForceChargeGrid,
        ] {
            assert!(handler.handle(state, &no_soc, &book).is_err());
            assert!(handler.handle(state, &no_power, &book).is_err());
        }

        // The idle states tolerate missing inputs.
        assert!(handler.handle(State::Undefined, &no_soc, &book).is_ok());
        assert!(handler.handle(State::NoLimit, &no_power, &book).is_ok());
    }
}
