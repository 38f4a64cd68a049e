//! # Hardware Capability Table
//!
//! Static, per-generation facts the driver needs during bring-up. Binding
//! a version to its table is the first thing attach does; every later
//! step reads from the bound table instead of switching on the version.

use crate::error::Result;
use crate::types::HwVersion;

/// Geometry of the descriptor DMA pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaPoolSpec {
    /// Pool name
    pub name: &'static str,
    /// Block size in bytes
    pub size: usize,
    /// Block alignment
    pub align: usize,
    /// Blocks never straddle this boundary
    pub boundary: usize,
}

/// Header prepended to packets delivered on the exception path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionHeader {
    /// Header table entry name
    pub name: &'static str,
    /// Header length in bytes
    pub len: u32,
}

/// Per-generation capability table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwCapabilities {
    /// Bound hardware generation
    pub version: HwVersion,
    /// Core clock rate while powered
    pub clock_rate_hz: u64,
    /// Value for the transport configuration-bits register
    pub bam_cfg_bits: u32,
    /// Exception path header
    pub exception_header: ExceptionHeader,
    /// Descriptor DMA pool geometry
    pub dma_pool: DmaPoolSpec,
    /// On-chip memory holds the tables and needs init commands at bring-up
    pub sram_tables: bool,
    /// On-chip memory the driver needs, in bytes
    pub sram_required: u32,
}

const V1_CLK_RATE: u64 = 92_310_000;
const V2_CLK_RATE: u64 = 200_000_000;

const V1_BAM_CFG_BITS: u32 = 0x7FFF_E004;
const V2_BAM_CFG_BITS: u32 = 0xFFFF_E004;

const V2_SRAM_REQUIRED: u32 = 0x1000;

impl HwCapabilities {
    /// Bind the platform's raw version tag to its capability table
    pub fn bind(raw_version: u32) -> Result<Self> {
        let version = HwVersion::from_raw(raw_version)?;
        let dma_pool = DmaPoolSpec {
            name: if version == HwVersion::V1_0 { "ipa_1k" } else { "ipa_tx" },
            size: 512,
            align: 4,
            boundary: 1024,
        };

        let caps = match version {
            HwVersion::V1_0 | HwVersion::V1_1 => Self {
                version,
                clock_rate_hz: V1_CLK_RATE,
                bam_cfg_bits: V1_BAM_CFG_BITS,
                exception_header: ExceptionHeader {
                    name: "ipa_excp_hdr",
                    len: 8,
                },
                dma_pool,
                sram_tables: false,
                sram_required: 0,
            },
            HwVersion::V2_0 => Self {
                version,
                clock_rate_hz: V2_CLK_RATE,
                bam_cfg_bits: V2_BAM_CFG_BITS,
                exception_header: ExceptionHeader {
                    name: "ipa_lan_hdr",
                    len: 2,
                },
                dma_pool,
                sram_tables: true,
                sram_required: V2_SRAM_REQUIRED,
            },
        };

        log::debug!("IPA: bound capability table for {}", version);
        Ok(caps)
    }
}
