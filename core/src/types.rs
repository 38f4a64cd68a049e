//! # Core Types
//!
//! Hardware identification and the small value types shared by every crate.

use core::fmt;

use crate::error::{Error, Result};

// =============================================================================
// HARDWARE VERSION
// =============================================================================

/// Hardware generation, as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum HwVersion {
    /// First generation
    V1_0 = 1,
    /// First generation, revision 1
    V1_1 = 2,
    /// Second generation
    V2_0 = 3,
}

impl HwVersion {
    /// Decode the platform's raw version tag
    ///
    /// `0` means "not provided" and is rejected like any unknown tag.
    pub fn from_raw(raw: u32) -> Result<Self> {
        match raw {
            1 => Ok(Self::V1_0),
            2 => Ok(Self::V1_1),
            3 => Ok(Self::V2_0),
            _ => Err(Error::UnsupportedHardware),
        }
    }

    /// Raw version tag
    pub const fn raw(self) -> u32 {
        self as u32
    }

    /// First-generation parts share one clock tree
    pub const fn is_v1(self) -> bool {
        matches!(self, Self::V1_0 | Self::V1_1)
    }
}

impl fmt::Display for HwVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V1_0 => write!(f, "v1.0"),
            Self::V1_1 => write!(f, "v1.1"),
            Self::V2_0 => write!(f, "v2.0"),
        }
    }
}

// =============================================================================
// HARDWARE MODE
// =============================================================================

/// How the hardware is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum HwMode {
    /// Real silicon; clocks and bus votes are managed by the driver
    #[default]
    Normal  = 0,
    /// Emulated hardware; no clock management
    Virtual = 1,
    /// Behind a PCIe link; clocks belong to the link owner
    Pcie    = 2,
}

impl HwMode {
    /// Decode the platform's raw mode tag
    pub fn from_raw(raw: u32) -> Result<Self> {
        match raw {
            0 => Ok(Self::Normal),
            1 => Ok(Self::Virtual),
            2 => Ok(Self::Pcie),
            _ => Err(Error::InvalidArgument),
        }
    }

    /// Whether the driver owns clock and bus management
    pub const fn manages_clocks(self) -> bool {
        matches!(self, Self::Normal)
    }
}

// =============================================================================
// ADDRESS FAMILY
// =============================================================================

/// IP address family of a rule or table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum IpFamily {
    /// IPv4
    V4 = 0,
    /// IPv6
    V6 = 1,
}

impl IpFamily {
    /// Both families, in installation order
    pub const ALL: [IpFamily; 2] = [IpFamily::V4, IpFamily::V6];
}

// =============================================================================
// ENDPOINT CLIENTS
// =============================================================================

/// Internal data-path endpoints owned by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Client {
    /// Command producer (host to accelerator)
    AppsCmdProd,
    /// LAN consumer (accelerator to host)
    AppsLanCons,
    /// LAN/WAN data producer (host to accelerator)
    AppsLanWanProd,
}

impl Client {
    /// Pipe index the client is wired to
    pub const fn pipe(self) -> usize {
        match self {
            Self::AppsLanWanProd => 2,
            Self::AppsLanCons => 3,
            Self::AppsCmdProd => 4,
        }
    }
}

// =============================================================================
// HANDLES
// =============================================================================

/// Opaque handle returned by the rule and header services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleHandle(pub u32);

impl fmt::Display for RuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
