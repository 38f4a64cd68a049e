//! # Collaborator Services
//!
//! The subsystems the driver brings up but does not implement: hardware
//! init, the rule/header engine, device-node registration, the resource
//! manager, interrupt wiring and the tethering bridge.

use ipa_core::{Client, IpFamily, Result, RuleHandle};

use crate::mmio::RegisterWindow;

// =============================================================================
// HARDWARE CONTROLLER
// =============================================================================

/// On-chip memory budget reported by the hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SramBudget {
    /// Total on-chip memory in bytes
    pub size: u32,
    /// Bytes reserved for the hardware's own use
    pub restricted: u32,
}

impl SramBudget {
    /// Bytes left for the driver's tables
    pub const fn available(&self) -> u32 {
        self.size.saturating_sub(self.restricted)
    }
}

/// Per-generation hardware init and parameter readout
pub trait HwController: Send + Sync {
    /// Run the one-time reset/init sequence
    fn init_hw(&self, regs: &dyn RegisterWindow) -> Result<()>;

    /// Read the on-chip memory budget
    fn sram_budget(&self, regs: &dyn RegisterWindow) -> SramBudget;
}

// =============================================================================
// RULE ENGINE
// =============================================================================

/// Match criteria for the bring-up filter rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMatch {
    /// IPv4 protocol field equals the value
    Protocol(u8),
    /// IPv6 next-header field equals the value
    NextHeader(u8),
}

/// Header, routing and filter table engine
pub trait RuleEngine: Send + Sync {
    /// Add a header table entry
    fn add_header(&self, name: &str, len: u32) -> Result<RuleHandle>;

    /// Delete a header table entry
    fn del_header(&self, header: RuleHandle);

    /// Add a routing rule to a named table
    fn add_route(
        &self,
        family: IpFamily,
        table: &str,
        dst: Client,
        header: RuleHandle,
    ) -> Result<RuleHandle>;

    /// Delete a routing rule
    fn del_route(&self, rule: RuleHandle);

    /// Direct exception traffic to an endpoint with a header
    fn route_exceptions(&self, dst: Client, header: RuleHandle) -> Result<()>;

    /// Add a global filter rule that passes matches to a routing table
    fn add_global_filter(
        &self,
        family: IpFamily,
        matches: FilterMatch,
        table: &str,
    ) -> Result<RuleHandle>;
}

// =============================================================================
// CHARACTER DEVICES
// =============================================================================

/// Device number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DevNumber {
    /// Major number
    pub major: u32,
    /// First minor number
    pub minor: u32,
}

handle_type!(
    /// Device class
    ClassHandle
);

handle_type!(
    /// Registered character device
    CdevHandle
);

/// Device-node registration
pub trait CharDevRegistry: Send + Sync {
    /// Create a device class
    fn create_class(&self, name: &'static str) -> Result<ClassHandle>;

    /// Destroy a device class
    fn destroy_class(&self, class: ClassHandle);

    /// Reserve a range of device numbers
    fn alloc_region(&self, name: &'static str, count: u32) -> Result<DevNumber>;

    /// Release a range of device numbers
    fn unregister_region(&self, dev: DevNumber, count: u32);

    /// Create the visible device node
    fn create_node(&self, class: ClassHandle, dev: DevNumber, name: &'static str) -> Result<()>;

    /// Remove the visible device node
    fn destroy_node(&self, class: ClassHandle, dev: DevNumber);

    /// Register the character device so opens reach the driver
    fn add_cdev(&self, dev: DevNumber, count: u32) -> Result<CdevHandle>;

    /// Unregister the character device
    fn del_cdev(&self, cdev: CdevHandle);
}

// =============================================================================
// MISC SERVICES
// =============================================================================

/// Dependency/resource manager
pub trait ResourceManager: Send + Sync {
    /// Initialise the manager
    fn initialize(&self) -> Result<()>;

    /// Shut the manager down
    fn shutdown(&self);
}

/// Interrupt wiring
pub trait InterruptController: Send + Sync {
    /// Wire the accelerator interrupt for an execution environment
    fn init(&self, irq: u32, ee: u32) -> Result<()>;
}

/// Tethering bridge service
pub trait TetherBridge: Send + Sync {
    /// Initialise the bridge
    fn init(&self) -> Result<()>;

    /// Shut the bridge down
    fn shutdown(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sram_available_saturates() {
        let budget = SramBudget {
            size: 0x100,
            restricted: 0x200,
        };
        assert_eq!(budget.available(), 0);

        let budget = SramBudget {
            size: 0x3000,
            restricted: 0x1000,
        };
        assert_eq!(budget.available(), 0x2000);
    }
}
