//! # Energy Control Engine
//!
//! A cycle-driven control engine for energy systems: a generic finite-state
//! machine runner plus the numeric filters (PID, PI, ramp, PT1) that
//! controllers built on top of it use for setpoint shaping.
//!
//! Two concrete controllers ship with the crate:
//! - [`reserve`]: emergency capacity reserve for a battery inverter. Holds
//!   back a configurable state of charge and ramps the discharge limit so
//!   the reserve is approached smoothly.
//! - [`cluster`]: start/stop supervision for a battery cluster, aggregating
//!   per-member current limits and guarding parallel connection on voltage
//!   spread.
//!
//! Controllers run one cycle per tick against an immutable input snapshot,
//! so a recorded sequence of snapshots replays to identical outputs.

pub mod cluster;
pub mod config;
pub mod error;
pub mod filter;
pub mod reserve;
#[cfg(feature = "sim")]
pub mod sim;
pub mod statemachine;
pub mod telemetry;

pub use error::{ControlError, Result};
pub use statemachine::{Bookkeeping, CycleHandler, MachineState, StateMachine, Step};
