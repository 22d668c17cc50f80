//! Parallel-cluster start/stop supervisor.
//!
//! Drives the same generic state machine engine as the reserve controller,
//! over a completely different state set and input shape: sequencing several
//! parallel battery members safely on and off one DC link.

pub mod states;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ControlError, Result};
use crate::statemachine::StateMachine;

pub use states::{
    ClusterHandler, ClusterInput, ClusterOutput, MemberCommand, MemberReading, MemberState,
    StartStop, State,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Maximum allowed spread between member DC link voltages before the
    /// cluster refuses to run, in V.
    pub voltage_tolerance_v: f64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            voltage_tolerance_v: 5.0,
        }
    }
}

/// Owns the cluster state machine and recovers from per-cycle evaluation
/// failures by keeping the previous command in effect.
pub struct ClusterSupervisor {
    machine: StateMachine<ClusterHandler>,
}

impl ClusterSupervisor {
    pub fn new(config: ClusterConfig) -> Result<Self> {
        if config.voltage_tolerance_v <= 0.0 {
            return Err(ControlError::configuration(format!(
                "voltage tolerance must be positive, got {}",
                config.voltage_tolerance_v
            )));
        }
        let handler = ClusterHandler::new(config.voltage_tolerance_v);
        Ok(Self {
            machine: StateMachine::new(handler, State::Undefined),
        })
    }

    /// Runs one cycle, recovering from evaluation failures: the previous
    /// cycle's command stays in effect.
    pub fn run_cycle(&mut self, input: &ClusterInput) -> Option<ClusterOutput> {
        match self.cycle(input) {
            Ok(output) => Some(output),
            Err(error) => {
                warn!(%error, "cluster cycle failed; previous command stays in effect");
                self.machine.latched_output().copied()
            }
        }
    }

    pub fn cycle(&mut self, input: &ClusterInput) -> Result<ClusterOutput> {
        let before = self.machine.current_state();
        let output = *self.machine.step(input)?;
        let state = self.machine.current_state();
        if state != before {
            info!(from = ?before, to = ?state, "cluster state changed");
        }
        Ok(output)
    }

    pub fn state(&self) -> State {
        self.machine.current_state()
    }
}
