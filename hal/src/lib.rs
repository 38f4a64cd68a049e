//! # IPA Hardware Abstraction Layer
//!
//! Narrow service interfaces for everything the driver core does not own:
//! clocks, bus arbitration, register mapping, the BAM transport, kernel
//! memory pools, the rule/header engine, the device-node registry, the
//! resource manager, interrupts and the tethering bridge.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Platform                              │
//! │  ┌──────────┐ ┌──────────┐ ┌───────────┐ ┌────────────────┐  │
//! │  │  clock   │ │   mmio   │ │ transport │ │     memory     │  │
//! │  │ Clock    │ │ IoMapper │ │ Transport │ │ KernelMemory   │  │
//! │  │ BusScale │ │ Window   │ │ Immediate │ │                │  │
//! │  └──────────┘ └──────────┘ └───────────┘ └────────────────┘  │
//! │  ┌──────────────────────────────────────────────────────────┐│
//! │  │ services: HwController, RuleEngine, CharDevRegistry,     ││
//! │  │           ResourceManager, InterruptController, Tether   ││
//! │  └──────────────────────────────────────────────────────────┘│
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every trait is object safe; the driver holds each service as an
//! `Arc<dyn ...>` so teardown closures can keep their own reference.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

/// Declare an opaque `u32` handle type
macro_rules! handle_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);
    };
}

pub mod clock;
pub mod memory;
pub mod mmio;
pub mod services;
pub mod transport;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

use alloc::sync::Arc;
use core::fmt;

pub use clock::{BusClient, BusScaling, Clock, ClockProvider};
pub use memory::{CacheHandle, DmaPoolHandle, DmaRegion, KernelMemory, PipeMemHandle};
pub use mmio::{IoMapper, RegisterWindow};
pub use services::{
    CdevHandle, CharDevRegistry, ClassHandle, DevNumber, FilterMatch, HwController,
    InterruptController, ResourceManager, RuleEngine, SramBudget, TetherBridge,
};
pub use transport::{BamHandle, BamProperties, ImmediateCommand, PipeConfig, PipeHandle, Transport};

// =============================================================================
// PLATFORM BUNDLE
// =============================================================================

/// Every service the driver consumes, bundled for attach
#[derive(Clone)]
pub struct Platform {
    /// Clock handles
    pub clocks: Arc<dyn ClockProvider>,
    /// Bus bandwidth arbiter
    pub bus: Arc<dyn BusScaling>,
    /// Register window mapping
    pub io: Arc<dyn IoMapper>,
    /// Per-generation hardware init
    pub controller: Arc<dyn HwController>,
    /// BAM queueing transport
    pub transport: Arc<dyn Transport>,
    /// Object caches, DMA pools, coherent memory
    pub memory: Arc<dyn KernelMemory>,
    /// Header, routing and filter rule engine
    pub rules: Arc<dyn RuleEngine>,
    /// Character device registration
    pub chardev: Arc<dyn CharDevRegistry>,
    /// Dependency/resource manager
    pub resource_manager: Arc<dyn ResourceManager>,
    /// Interrupt wiring
    pub interrupts: Arc<dyn InterruptController>,
    /// Optional tethering bridge
    pub tether: Arc<dyn TetherBridge>,
}

impl fmt::Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Platform").finish_non_exhaustive()
    }
}
