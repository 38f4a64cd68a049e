//! # IPA Driver
//!
//! Control plane of the IPA packet-offload accelerator: device bring-up
//! with mirrored teardown, and the control request decoder behind the
//! device node.
//!
//! ## Architecture
//!
//! ```text
//!   attach ──▶ Orchestrator ──▶ 17 steps ──▶ Device ──open──▶ Session
//!                  │                            │                │
//!                  │ failure at step k          │ shutdown       │ ioctl
//!                  ▼                            ▼                ▼
//!            unwind k-1..1               unwind all         ControlDecoder
//!                                                                │
//!                                               PowerGate ◀──────┤
//!                                               ControlHandler ◀─┘
//! ```

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod bringup;
pub mod control;
pub mod device;

pub use bringup::{BringupFailure, BringupStep, DeviceContext, Orchestrator};
pub use control::{ControlDecoder, ControlHandler, Opcode, Payload, UserMemory};
pub use device::{Device, DriverInfo, IpaDriver, Session};
