//! Marionette Motion - time-based parameter animation
//!
//! Everything here is a pure function of time. Callers pass the current
//! session time in seconds; nothing in this crate reads a clock.
//!
//! - Easing curves over normalized progress
//! - Eased transitions of one parameter from a start to a target value
//! - Background oscillators for idle motion
//! - Rolling frame timing for FPS reporting

pub mod easing;
pub mod oscillator;
pub mod timing;
pub mod transition;

pub use easing::*;
pub use oscillator::*;
pub use timing::*;
pub use transition::*;
