//! # IPA Error Handling
//!
//! One error type for the whole driver stack.
//!
//! - Errors are plain `Copy` values, usable from any context
//! - Every error maps to exactly one kernel errno for the caller
//! - Contract violations are not errors; they panic
//!
//! ## Categories
//!
//! ```text
//! ┌─────────────────────┬───────────────────────────────────────────┐
//! │ InvalidArgument     │ bad opcode, over-limit count, overflow    │
//! │ ResourceExhaustion  │ payload, pool or DMA allocation failure   │
//! │ TransferFault       │ a bounded user copy could not complete    │
//! │ HardwareSequencing  │ a bring-up step did not complete          │
//! │ NotSupported        │ unknown command                           │
//! │ OperationFailed     │ an external handler reported failure      │
//! └─────────────────────┴───────────────────────────────────────────┘
//! ```

use core::fmt;

// =============================================================================
// RESULT TYPE
// =============================================================================

/// IPA Result type alias
pub type Result<T> = core::result::Result<T, Error>;

// =============================================================================
// ERRNO VALUES
// =============================================================================

/// Kernel errno values returned across the device-node boundary
pub mod errno {
    /// Operation not permitted
    pub const EPERM: i32 = 1;
    /// I/O error
    pub const EIO: i32 = 5;
    /// Out of memory
    pub const ENOMEM: i32 = 12;
    /// Bad address
    pub const EFAULT: i32 = 14;
    /// No such device
    pub const ENODEV: i32 = 19;
    /// Invalid argument
    pub const EINVAL: i32 = 22;
    /// Inappropriate ioctl for device
    pub const ENOTTY: i32 = 25;
    /// Driver requests probe retry
    pub const EPROBE_DEFER: i32 = 517;
    /// No compat ioctl translation
    pub const ENOIOCTLCMD: i32 = 515;
}

// =============================================================================
// ERROR KIND
// =============================================================================

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorKind {
    /// Malformed or out-of-range request, rejected before any side effect
    InvalidArgument    = 0,
    /// An allocation could not be satisfied
    ResourceExhaustion = 1,
    /// Copy to or from the caller faulted
    TransferFault      = 2,
    /// Hardware or collaborator did not complete a sequence
    HardwareSequencing = 3,
    /// The request is not known to this driver
    NotSupported       = 4,
    /// An external handler failed
    OperationFailed    = 5,
}

impl ErrorKind {
    /// Get category name
    pub const fn category(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid-argument",
            Self::ResourceExhaustion => "resource-exhaustion",
            Self::TransferFault => "transfer-fault",
            Self::HardwareSequencing => "hardware-sequencing",
            Self::NotSupported => "not-supported",
            Self::OperationFailed => "operation-failed",
        }
    }

    /// Whether the caller's request or buffer was at fault
    pub const fn is_caller_fault(&self) -> bool {
        matches!(self, Self::InvalidArgument | Self::TransferFault)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.category())
    }
}

// =============================================================================
// ERROR ENUM
// =============================================================================

/// IPA unified error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Request Errors
    // =========================================================================
    /// Over-limit count, overflowing size, or malformed argument
    InvalidArgument,
    /// Command word does not name a known command
    UnknownCommand,
    /// Narrow-pointer command has no native counterpart
    NoCompatCommand,
    /// Copy to or from the caller's buffer did not complete
    TransferFault,
    /// External handler reported failure
    OperationFailed,

    // =========================================================================
    // Memory Errors
    // =========================================================================
    /// Allocation failed
    OutOfMemory,
    /// Register window could not be mapped
    MappingFailed,

    // =========================================================================
    // Hardware Errors
    // =========================================================================
    /// Hardware or a required handle is absent
    NoDevice,
    /// A collaborator is not ready yet; attach may be retried
    ProbeDeferred,
    /// Operation not permitted for this hardware configuration
    NotPermitted,
    /// A clock, bus or command sequence did not complete
    Sequencing,
    /// Hardware generation has no capability table
    UnsupportedHardware,
}

impl Error {
    /// Classify this error
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument | Self::UnsupportedHardware => ErrorKind::InvalidArgument,
            Self::UnknownCommand | Self::NoCompatCommand => ErrorKind::NotSupported,
            Self::TransferFault => ErrorKind::TransferFault,
            Self::OperationFailed => ErrorKind::OperationFailed,
            Self::OutOfMemory | Self::MappingFailed => ErrorKind::ResourceExhaustion,
            Self::NoDevice | Self::ProbeDeferred | Self::NotPermitted | Self::Sequencing => {
                ErrorKind::HardwareSequencing
            },
        }
    }

    /// Positive errno for this error
    pub const fn errno(&self) -> i32 {
        match self {
            Self::InvalidArgument => errno::EINVAL,
            Self::UnknownCommand => errno::ENOTTY,
            Self::NoCompatCommand => errno::ENOIOCTLCMD,
            Self::TransferFault | Self::MappingFailed => errno::EFAULT,
            Self::OperationFailed | Self::NotPermitted => errno::EPERM,
            Self::OutOfMemory => errno::ENOMEM,
            Self::NoDevice | Self::UnsupportedHardware => errno::ENODEV,
            Self::ProbeDeferred => errno::EPROBE_DEFER,
            Self::Sequencing => errno::EIO,
        }
    }

    /// Value handed back to the caller of a control entry point
    pub const fn to_return_code(&self) -> i64 {
        -(self.errno() as i64)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Request
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::UnknownCommand => write!(f, "unknown command"),
            Self::NoCompatCommand => write!(f, "no compat translation for command"),
            Self::TransferFault => write!(f, "fault during user transfer"),
            Self::OperationFailed => write!(f, "operation failed"),

            // Memory
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::MappingFailed => write!(f, "register window mapping failed"),

            // Hardware
            Self::NoDevice => write!(f, "no such device"),
            Self::ProbeDeferred => write!(f, "probe deferred"),
            Self::NotPermitted => write!(f, "operation not permitted"),
            Self::Sequencing => write!(f, "hardware sequencing failed"),
            Self::UnsupportedHardware => write!(f, "unsupported hardware generation"),
        }
    }
}
