//! Numeric control filters.
//!
//! Pure transforms with internal memory: a full PID with priority-ordered
//! anti-windup, a simplified PI, a rate limiter and a first-order lag. Each
//! filter is created once when the owning controller activates; the filter
//! memory is the only state that survives across control cycles.

pub mod pi;
pub mod pid;
pub mod pt1;
pub mod ramp;

pub use pi::{PiConfig, PiFilter};
pub use pid::{PidConfig, PidFilter};
pub use pt1::Pt1Filter;
pub use ramp::RampFilter;
