//! Generic cycle-driven state machine engine.
//!
//! The engine is parameterized over a closed state enum and an arbitrary
//! per-cycle input snapshot. Each machine supplies one [`CycleHandler`] whose
//! `handle` is an exhaustive `match` over the state enum, so "every state has
//! a handler" is a compile-time guarantee rather than a runtime condition
//! that needs checking.
//!
//! One call to [`StateMachine::step`] per control cycle: dispatch to the
//! handler for the current state, record bookkeeping, advance. Handlers are
//! pure functions of the snapshot and the bookkeeping; determinism across
//! replays is a hard requirement.

use std::fmt::Debug;

use tracing::debug;

use crate::error::Result;

/// A closed set of operating modes for one state machine.
pub trait MachineState: Copy + Eq + Debug {
    /// True for the machine's neutral/idle state. Cycles spent in it are not
    /// recorded as "last active".
    fn is_neutral(&self) -> bool;
}

/// Bookkeeping the machine carries forward between cycles and hands to the
/// handler read-only.
#[derive(Debug, Clone, Copy)]
pub struct Bookkeeping<S> {
    /// Most recent non-neutral state that completed a cycle. Updated after
    /// each cycle with the state that just ran, so the first cycle in a newly
    /// entered state still observes the state it came from. That gives
    /// handlers a one-cycle hysteresis band (e.g. "just left
    /// force-charge-from-grid, tolerate one extra percent of SoC before
    /// leaving the at-reserve state").
    pub last_active: S,
    /// State that ran in the previous cycle.
    pub previous: S,
}

/// Result of one handler invocation: the state to advance to plus the output
/// computed for this cycle.
#[derive(Debug, Clone)]
pub struct Step<S, O> {
    pub next: S,
    pub output: O,
}

/// The total handler mapping for one state machine.
pub trait CycleHandler {
    type State: MachineState;
    type Input;
    type Output;

    /// Evaluates one cycle for `state`. Reads only the snapshot and the
    /// bookkeeping, never external mutable state. An `Err` means this cycle
    /// produced no result; the machine stays where it is.
    fn handle(
        &mut self,
        state: Self::State,
        input: &Self::Input,
        bookkeeping: &Bookkeeping<Self::State>,
    ) -> Result<Step<Self::State, Self::Output>>;
}

/// Owns the current state of one machine and drives its handler once per
/// cycle. Created when the owning controller activates, dropped on
/// deactivation; never shared between controllers.
pub struct StateMachine<H: CycleHandler> {
    handler: H,
    initial: H::State,
    current: H::State,
    bookkeeping: Bookkeeping<H::State>,
    last_output: Option<H::Output>,
}

impl<H: CycleHandler> StateMachine<H> {
    pub fn new(handler: H, initial: H::State) -> Self {
        Self {
            handler,
            initial,
            current: initial,
            bookkeeping: Bookkeeping {
                last_active: initial,
                previous: initial,
            },
            last_output: None,
        }
    }

    /// Runs one control cycle.
    ///
    /// On success the machine advances and the cycle's output is latched and
    /// returned. On failure nothing changes: the current state, bookkeeping
    /// and the previously latched output all stay in effect, so a transient
    /// evaluation problem never commands an uncontrolled setpoint change.
    pub fn step(&mut self, input: &H::Input) -> Result<&H::Output> {
        let step = self.handler.handle(self.current, input, &self.bookkeeping)?;

        if step.next != self.current {
            debug!(from = ?self.current, to = ?step.next, "state transition");
        }

        self.bookkeeping.previous = self.current;
        if !self.current.is_neutral() {
            self.bookkeeping.last_active = self.current;
        }
        self.current = step.next;

        Ok(&*self.last_output.insert(step.output))
    }

    pub fn current_state(&self) -> H::State {
        self.current
    }

    pub fn previous_state(&self) -> H::State {
        self.bookkeeping.previous
    }

    pub fn last_active_state(&self) -> H::State {
        self.bookkeeping.last_active
    }

    /// Output of the most recent successful cycle, if any.
    pub fn latched_output(&self) -> Option<&H::Output> {
        self.last_output.as_ref()
    }

    /// Returns to the initial state and clears bookkeeping and the latched
    /// output.
    pub fn reset(&mut self) {
        self.current = self.initial;
        self.bookkeeping = Bookkeeping {
            last_active: self.initial,
            previous: self.initial,
        };
        self.last_output = None;
    }
}
