//! # Clocks and Bus Scaling
//!
//! Clock handles follow the usual two-level gating: `prepare` may sleep
//! and is paired with `unprepare`; `enable` is atomic and paired with
//! `disable`. A handle is obtained by name and returned with `put`.

use alloc::sync::Arc;

use ipa_core::Result;

/// A single gateable clock
pub trait Clock: Send + Sync {
    /// Clock name as known to the platform
    fn name(&self) -> &'static str;

    /// Prepare the clock for enabling
    fn prepare(&self) -> Result<()>;

    /// Ungate the clock
    fn enable(&self) -> Result<()>;

    /// Request a rate in Hz
    fn set_rate(&self, hz: u64) -> Result<()>;

    /// Gate the clock
    fn disable(&self);

    /// Undo `prepare`
    fn unprepare(&self);
}

/// Source of clock handles
pub trait ClockProvider: Send + Sync {
    /// Look up a clock by name
    fn get(&self, name: &'static str) -> Result<Arc<dyn Clock>>;

    /// Return a handle obtained from `get`
    fn put(&self, clock: Arc<dyn Clock>);
}

handle_type!(
    /// Registration with the bus bandwidth arbiter
    BusClient
);

/// Shared-bus bandwidth arbiter
pub trait BusScaling: Send + Sync {
    /// Register a client; votes start at level 0
    fn register(&self, name: &'static str) -> Result<BusClient>;

    /// Vote for a bandwidth level; 0 retracts the vote
    fn vote(&self, client: BusClient, level: u32) -> Result<()>;

    /// Drop the registration
    fn unregister(&self, client: BusClient);
}
