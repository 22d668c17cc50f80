use thiserror::Error;

/// Errors raised by the control core.
///
/// There is no "unregistered state" variant: every state machine dispatches
/// through an exhaustive `match` over a closed enum, so handler tables are
/// total at compile time.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Invalid gains or limits detected at construction time. Never recovered
    /// locally; the owning controller must not activate.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A state handler could not produce a result for the current cycle,
    /// typically because a required input was undefined. Recovered by the
    /// owning controller: the previous setpoint stays latched. The engine
    /// never substitutes a zero setpoint on error, since an uncommanded drop
    /// to zero power can itself be unsafe for grid-tied power electronics.
    #[error("evaluation failed: {0}")]
    Evaluation(String),
}

impl ControlError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, ControlError>;
