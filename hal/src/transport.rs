//! # BAM Transport
//!
//! The queueing transport that moves descriptors between the host and
//! the accelerator. The driver registers the transport device once,
//! connects its internal system pipes, and pushes immediate commands
//! through the command pipe.

use ipa_core::{Client, IpFamily, Result};

handle_type!(
    /// Registered transport device
    BamHandle
);

handle_type!(
    /// Connected system pipe
    PipeHandle
);

/// Transport device registration parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BamProperties {
    /// Physical base of the transport registers
    pub phys_addr: u64,
    /// Size of the transport register window
    pub virt_size: u64,
    /// Transport interrupt line
    pub irq: u32,
    /// Number of pipes
    pub num_pipes: u32,
    /// Byte count that triggers a summing interrupt
    pub summing_threshold: u32,
    /// Descriptor count that triggers an event
    pub event_threshold: u32,
    /// Execution environment
    pub ee: u32,
}

/// System pipe connection parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeConfig {
    /// Client the pipe serves
    pub client: Client,
    /// Descriptor FIFO size in bytes
    pub desc_fifo_size: u32,
    /// Length of the header the pipe strips or adds, 0 for none
    pub header_len: u32,
}

/// Immediate commands issued over the command pipe during bring-up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImmediateCommand {
    /// Zero the on-chip memory not reserved by the hardware
    InitSram {
        /// Bytes reserved at the start of on-chip memory
        restricted: u32,
        /// Bytes to initialise
        size: u32,
    },
    /// Point the hardware at the header table
    InitHeaderTable,
    /// Point the hardware at the routing table for a family
    InitRoutingTable(IpFamily),
    /// Point the hardware at the filter table for a family
    InitFilterTable(IpFamily),
}

/// Queueing transport
pub trait Transport: Send + Sync {
    /// Register the transport device
    fn register_device(&self, props: &BamProperties) -> Result<BamHandle>;

    /// Deregister the transport device
    fn deregister_device(&self, handle: BamHandle);

    /// Connect a system pipe
    fn connect(&self, config: &PipeConfig) -> Result<PipeHandle>;

    /// Tear down a connected system pipe
    fn disconnect(&self, pipe: PipeHandle);

    /// Send an immediate command and wait for its completion
    fn send_immediate(&self, command: ImmediateCommand) -> Result<()>;
}
