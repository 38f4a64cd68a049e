//! # Attach Configuration
//!
//! The resource descriptor handed to the driver when a device instance
//! attaches, and the feature flags that select optional services.

use bitflags::bitflags;

use crate::error::{Error, Result};
use crate::types::HwMode;

bitflags! {
    /// Optional services enabled for this device instance
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DriverFlags: u32 {
        /// Route the A2 bridge through BAM-DMA
        const BAMDMA_A2_BRIDGE = 1 << 0;
        /// Expose the A2 service
        const A2_SERVICE       = 1 << 1;
        /// Bring up the tethering bridge at the end of attach
        const TETHER_BRIDGE    = 1 << 2;
    }
}

/// A physical memory region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemRegion {
    /// Physical base address
    pub base: u64,
    /// Size in bytes
    pub size: u64,
}

impl MemRegion {
    /// Create a region
    pub const fn new(base: u64, size: u64) -> Self {
        Self { base, size }
    }

    /// Whether the region has any extent
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }
}

/// Memory a pipe's FIFOs live in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum PipeMemType {
    /// Dedicated transport pipe memory
    #[default]
    SpsPipeMem = 0,
    /// Accelerator-private memory
    Private    = 1,
    /// System RAM
    System     = 2,
}

/// Direction of an A2 mux pipe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum A2Direction {
    /// A2 producer, accelerator consumer
    A2ToIpa,
    /// Accelerator producer, A2 consumer
    IpaToA2,
}

/// Connection parameters of one A2 mux pipe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct A2PipeConnection {
    /// Source BAM physical address
    pub src_phys_addr: u32,
    /// Source BAM pipe index
    pub src_pipe_index: u32,
    /// Destination BAM physical address
    pub dst_phys_addr: u32,
    /// Destination BAM pipe index
    pub dst_pipe_index: u32,
    /// Where the FIFOs live
    pub mem_type: PipeMemType,
    /// Data FIFO offset
    pub data_fifo_offset: u32,
    /// Data FIFO size
    pub data_fifo_size: u32,
    /// Descriptor FIFO offset
    pub desc_fifo_offset: u32,
    /// Descriptor FIFO size
    pub desc_fifo_size: u32,
}

/// Resources of the A2 BAM, handed on to the A2 mux driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct A2Resources {
    /// A2 BAM register window
    pub bam_regs: MemRegion,
    /// A2 BAM interrupt line
    pub bam_irq: u32,
    /// A2 to accelerator pipe
    pub a2_to_ipa: A2PipeConnection,
    /// Accelerator to A2 pipe
    pub ipa_to_a2: A2PipeConnection,
}

impl A2Resources {
    /// Connection for `dir`
    pub const fn pipe(&self, dir: A2Direction) -> &A2PipeConnection {
        match dir {
            A2Direction::A2ToIpa => &self.a2_to_ipa,
            A2Direction::IpaToA2 => &self.ipa_to_a2,
        }
    }
}

/// Attach-time resource descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformResources {
    /// Accelerator register window
    pub ipa_regs: MemRegion,
    /// Transport (BAM) register window
    pub bam_regs: MemRegion,
    /// Flat pipe memory, empty when the hardware has none
    pub pipe_mem: MemRegion,
    /// Accelerator interrupt line
    pub ipa_irq: u32,
    /// Transport interrupt line
    pub bam_irq: u32,
    /// Raw hardware version tag, `0` when absent
    pub hw_version: u32,
    /// Hardware mode
    pub hw_mode: HwMode,
    /// Execution environment index
    pub ee: u32,
    /// Optional services
    pub flags: DriverFlags,
    /// A2 BAM resources, required with [`DriverFlags::A2_SERVICE`]
    pub a2: Option<A2Resources>,
}

impl PlatformResources {
    /// Create a descriptor with the platform defaults
    ///
    /// Mode `Normal`, execution environment 0, no pipe memory, no flags.
    pub const fn new(ipa_regs: MemRegion, bam_regs: MemRegion, hw_version: u32) -> Self {
        Self {
            ipa_regs,
            bam_regs,
            pipe_mem: MemRegion::new(0, 0),
            ipa_irq: 0,
            bam_irq: 0,
            hw_version,
            hw_mode: HwMode::Normal,
            ee: 0,
            flags: DriverFlags::empty(),
            a2: None,
        }
    }

    /// Set interrupt lines
    pub const fn with_irqs(mut self, ipa_irq: u32, bam_irq: u32) -> Self {
        self.ipa_irq = ipa_irq;
        self.bam_irq = bam_irq;
        self
    }

    /// Set the pipe memory region
    pub const fn with_pipe_mem(mut self, pipe_mem: MemRegion) -> Self {
        self.pipe_mem = pipe_mem;
        self
    }

    /// Set hardware mode
    pub const fn with_mode(mut self, mode: HwMode) -> Self {
        self.hw_mode = mode;
        self
    }

    /// Set execution environment
    pub const fn with_ee(mut self, ee: u32) -> Self {
        self.ee = ee;
        self
    }

    /// Set feature flags
    pub const fn with_flags(mut self, flags: DriverFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the A2 BAM resources
    pub const fn with_a2(mut self, a2: A2Resources) -> Self {
        self.a2 = Some(a2);
        self
    }

    /// A2 resources, present only when the A2 service is enabled
    pub fn a2_service(&self) -> Option<&A2Resources> {
        if self.flags.contains(DriverFlags::A2_SERVICE) {
            self.a2.as_ref()
        } else {
            None
        }
    }

    /// Check the descriptor is usable for attach
    pub fn validate(&self) -> Result<()> {
        if self.hw_version == 0 {
            log::error!("IPA: hardware version missing from resources");
            return Err(Error::InvalidArgument);
        }
        if self.ipa_regs.is_empty() || self.bam_regs.is_empty() {
            log::error!("IPA: register window missing from resources");
            return Err(Error::InvalidArgument);
        }
        if self.flags.contains(DriverFlags::A2_SERVICE) {
            match self.a2 {
                Some(a2) if !a2.bam_regs.is_empty() => {}
                _ => {
                    log::error!("IPA: A2 service enabled without A2 BAM resources");
                    return Err(Error::NoDevice);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PlatformResources {
        PlatformResources::new(
            MemRegion::new(0xfd4c_0000, 0x2_6000),
            MemRegion::new(0xfd4c_4000, 0x1_4000),
            3,
        )
    }

    #[test]
    fn test_defaults() {
        let res = sample();
        assert_eq!(res.hw_mode, HwMode::Normal);
        assert_eq!(res.ee, 0);
        assert!(res.pipe_mem.is_empty());
        assert!(res.flags.is_empty());
        assert!(res.validate().is_ok());
    }

    #[test]
    fn test_missing_version_rejected() {
        let mut res = sample();
        res.hw_version = 0;
        assert_eq!(res.validate(), Err(Error::InvalidArgument));
    }

    #[test]
    fn test_empty_window_rejected() {
        let mut res = sample();
        res.bam_regs = MemRegion::default();
        assert_eq!(res.validate(), Err(Error::InvalidArgument));
    }

    #[test]
    fn test_builder() {
        let res = sample()
            .with_irqs(33, 34)
            .with_ee(1)
            .with_flags(DriverFlags::TETHER_BRIDGE | DriverFlags::A2_SERVICE);
        assert_eq!((res.ipa_irq, res.bam_irq, res.ee), (33, 34, 1));
        assert!(res.flags.contains(DriverFlags::TETHER_BRIDGE));
    }

    fn a2() -> A2Resources {
        A2Resources {
            bam_regs: MemRegion::new(0xfc83_4000, 0x1_9000),
            bam_irq: 61,
            a2_to_ipa: A2PipeConnection {
                src_pipe_index: 2,
                dst_pipe_index: 8,
                ..A2PipeConnection::default()
            },
            ipa_to_a2: A2PipeConnection {
                src_pipe_index: 9,
                dst_pipe_index: 3,
                mem_type: PipeMemType::System,
                ..A2PipeConnection::default()
            },
        }
    }

    #[test]
    fn test_a2_service_requires_resources() {
        let res = sample().with_flags(DriverFlags::A2_SERVICE);
        assert_eq!(res.validate(), Err(Error::NoDevice));

        let res = res.with_a2(A2Resources::default());
        assert_eq!(res.validate(), Err(Error::NoDevice));

        let res = res.with_a2(a2());
        assert!(res.validate().is_ok());
        let found = res.a2_service().unwrap();
        assert_eq!(found.pipe(A2Direction::A2ToIpa).dst_pipe_index, 8);
        assert_eq!(found.pipe(A2Direction::IpaToA2).mem_type, PipeMemType::System);
    }

    #[test]
    fn test_a2_hidden_without_service() {
        let res = sample().with_a2(a2());
        assert!(res.validate().is_ok());
        assert!(res.a2_service().is_none());
    }
}
