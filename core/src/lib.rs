//! # IPA Driver Core
//!
//! Shared foundations for the IPA packet-offload accelerator driver.
//! Nothing in here touches hardware; it defines the vocabulary that the
//! HAL, the power subsystem and the driver agree on.
//!
//! ## Components
//!
//! - **Error**: unified error type and its errno mapping
//! - **Types**: hardware generation, mode, address family, handles
//! - **Caps**: static per-generation capability table
//! - **Config**: the attach-time resource descriptor and feature flags

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

pub mod caps;
pub mod config;
pub mod error;
pub mod types;

pub use caps::HwCapabilities;
pub use config::{
    A2Direction, A2PipeConnection, A2Resources, DriverFlags, MemRegion, PipeMemType,
    PlatformResources,
};
pub use error::{Error, ErrorKind, Result};
pub use types::*;

/// Driver name, used for the device class and node
pub const DRV_NAME: &str = "ipa";

/// Number of hardware pipes (endpoints)
pub const NUM_PIPES: usize = 0x14;

/// Fixed length of every resource name carried across the control ABI
pub const RESOURCE_NAME_MAX: usize = 32;
