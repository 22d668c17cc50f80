//! State set and handler table for parallel-cluster start/stop sequencing.
//!
//! Several battery members share one DC link. Closing a member contactor
//! while the pack voltages disagree drives a large balancing current through
//! the weakest member, so the cluster refuses to advance into `Running`
//! unless the voltage spread is within tolerance, and drops to `Error`
//! instead of switching members on when it is not.

use serde::{Deserialize, Serialize};

use crate::error::{ControlError, Result};
use crate::statemachine::{Bookkeeping, CycleHandler, MachineState, Step};

/// Cluster-level operating modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    Undefined,
    GoStopped,
    Stopped,
    GoRunning,
    Running,
    Error,
}

impl MachineState for State {
    fn is_neutral(&self) -> bool {
        matches!(self, State::Undefined)
    }
}

/// Requested cluster target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartStop {
    Start,
    Stop,
}

/// Operating state one member reports for itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberState {
    Undefined,
    Stopped,
    GoRunning,
    Running,
    Error,
}

/// Per-cycle reading from one cluster member.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemberReading {
    pub state: Option<MemberState>,
    /// DC link voltage in V.
    pub voltage_v: Option<f64>,
    pub soc: Option<u8>,
    pub max_charge_current_a: Option<f64>,
    pub max_discharge_current_a: Option<f64>,
}

/// Read-only input snapshot for one cluster cycle.
#[derive(Debug, Clone)]
pub struct ClusterInput {
    pub target: StartStop,
    pub members: Vec<MemberReading>,
}

/// What the cluster commands its members to do this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MemberCommand {
    Start,
    Stop,
}

/// Per-cycle output of the cluster machine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClusterOutput {
    pub command: MemberCommand,
    /// Aggregated charge current limit over all members, in A. Only defined
    /// while the cluster is running and every member reports a limit.
    pub charge_current_limit_a: Option<f64>,
    /// Aggregated discharge current limit, in A.
    pub discharge_current_limit_a: Option<f64>,
}

impl ClusterOutput {
    fn stop() -> Self {
        Self {
            command: MemberCommand::Stop,
            charge_current_limit_a: None,
            discharge_current_limit_a: None,
        }
    }

    fn start() -> Self {
        Self {
            command: MemberCommand::Start,
            charge_current_limit_a: None,
            discharge_current_limit_a: None,
        }
    }
}

/// Total handler mapping for the cluster [`State`].
pub struct ClusterHandler {
    voltage_tolerance_v: f64,
}

impl ClusterHandler {
    pub fn new(voltage_tolerance_v: f64) -> Self {
        Self {
            voltage_tolerance_v,
        }
    }

    /// Max/min spread of the member DC link voltages. Every member must
    /// report a voltage while sequencing up.
    fn voltage_spread(&self, input: &ClusterInput) -> Result<f64> {
        if input.members.is_empty() {
            return Err(ControlError::evaluation("cluster has no members"));
        }
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for (index, member) in input.members.iter().enumerate() {
            let voltage = member.voltage_v.ok_or_else(|| {
                ControlError::evaluation(format!("member {index} reports no voltage"))
            })?;
            min = min.min(voltage);
            max = max.max(voltage);
        }
        Ok(max - min)
    }

    fn all_members(&self, input: &ClusterInput, state: MemberState) -> bool {
        !input.members.is_empty()
            && input.members.iter().all(|member| member.state == Some(state))
    }

    fn any_member_error(&self, input: &ClusterInput) -> bool {
        input
            .members
            .iter()
            .any(|member| member.state == Some(MemberState::Error))
    }

    /// Parallel members: the weakest member bounds the per-string current,
    /// the cluster carries that bound times the member count.
    fn aggregated_limit(
        &self,
        input: &ClusterInput,
        limit: impl Fn(&MemberReading) -> Option<f64>,
    ) -> Option<f64> {
        let mut min: Option<f64> = None;
        for member in &input.members {
            let value = limit(member)?;
            min = Some(match min {
                Some(current) => current.min(value),
                None => value,
            });
        }
        min.map(|value| value * input.members.len() as f64)
    }

    fn go_running(&self, input: &ClusterInput) -> Result<Step<State, ClusterOutput>> {
        let spread = self.voltage_spread(input)?;
        if spread > self.voltage_tolerance_v {
            return Ok(Step {
                next: State::Error,
                output: ClusterOutput::stop(),
            });
        }
        if self.all_members(input, MemberState::Running) {
            Ok(Step {
                next: State::Running,
                output: ClusterOutput::start(),
            })
        } else {
            Ok(Step {
                next: State::GoRunning,
                output: ClusterOutput::start(),
            })
        }
    }

    fn running(&self, input: &ClusterInput) -> Result<Step<State, ClusterOutput>> {
        if input.target == StartStop::Stop {
            return Ok(Step {
                next: State::GoStopped,
                output: ClusterOutput::stop(),
            });
        }
        let spread = self.voltage_spread(input)?;
        if spread > self.voltage_tolerance_v || self.any_member_error(input) {
            return Ok(Step {
                next: State::Error,
                output: ClusterOutput::stop(),
            });
        }
        Ok(Step {
            next: State::Running,
            output: ClusterOutput {
                command: MemberCommand::Start,
                charge_current_limit_a: self
                    .aggregated_limit(input, |member| member.max_charge_current_a),
                discharge_current_limit_a: self
                    .aggregated_limit(input, |member| member.max_discharge_current_a),
            },
        })
    }
}

impl CycleHandler for ClusterHandler {
    type State = State;
    type Input = ClusterInput;
    type Output = ClusterOutput;

    fn handle(
        &mut self,
        state: State,
        input: &ClusterInput,
        _bookkeeping: &Bookkeeping<State>,
    ) -> Result<Step<State, ClusterOutput>> {
        match state {
            // Always sequence through a defined stop first.
            State::Undefined => Ok(Step {
                next: State::GoStopped,
                output: ClusterOutput::stop(),
            }),
            State::GoStopped => {
                let next = if self.all_members(input, MemberState::Stopped) {
                    State::Stopped
                } else {
                    State::GoStopped
                };
                Ok(Step {
                    next,
                    output: ClusterOutput::stop(),
                })
            }
            State::Stopped => {
                let next = match input.target {
                    StartStop::Start => State::GoRunning,
                    StartStop::Stop => State::Stopped,
                };
                Ok(Step {
                    next,
                    output: ClusterOutput::stop(),
                })
            }
            State::GoRunning => self.go_running(input),
            State::Running => self.running(input),
            // Latched until an explicit stop request sequences us out.
            State::Error => {
                let next = match input.target {
                    StartStop::Stop => State::GoStopped,
                    StartStop::Start => State::Error,
                };
                Ok(Step {
                    next,
                    output: ClusterOutput::stop(),
                })
            }
        }
    }
}
