//! # IPA Power Subsystem
//!
//! The power gate keeps the accelerator's clocks and bus vote up while at
//! least one user needs the hardware, and takes them down when the last
//! user leaves.
//!
//! ```text
//!   acquire()  0 ──▶ 1   power_on:  clocks on in order, bus vote 1
//!   acquire()  1 ──▶ 2   (count only)
//!   release()  2 ──▶ 1   (count only)
//!   release()  1 ──▶ 0   power_off: bus vote 0, clocks off in reverse
//! ```
//!
//! The gate is generic over a [`PowerSequence`]; [`ClockTree`] is the
//! hardware one, built from the clock handles obtained at attach.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod clocks;
pub mod gate;

pub use clocks::{ClockHandles, ClockTree};
pub use gate::{GateStats, PowerGate, PowerHold, PowerSequence};
