//! # Opcode Catalogue
//!
//! One entry per command number, in number order. Each entry says how the
//! argument is laid out and whether the result is copied back.
//!
//! ```text
//!   Scalar    arg is a plain value; no transfer
//!   Fixed     one header-sized struct
//!   Variable  header + count * element, count read from the header
//! ```

use core::mem::{offset_of, size_of};

use ipa_core::{Error, Result};
use static_assertions::const_assert;

use super::abi::*;
use super::command::{Command, COMPAT_PTR_SIZE, NATIVE_PTR_SIZE};

/// Bound on every header; sized for the local header buffer
pub const MAX_HEADER_LEN: usize = 128;

/// Per-request bound on header, rule and NAT batches
pub const MAX_BATCH: u32 = 255;

/// Per-request bound on interface property slots
pub const MAX_PROPS: u32 = 32;

/// Largest message body a pull may ask for, one kernel heap block
pub const MAX_MSG_LEN: u32 = 4 << 20;

// =============================================================================
// OPCODES
// =============================================================================

/// Control request opcodes, numbered contiguously from 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Opcode {
    AddHeader = 0,
    DelHeader,
    AddRtRule,
    DelRtRule,
    AddFltRule,
    DelFltRule,
    CommitHeader,
    ResetHeader,
    CommitRt,
    ResetRt,
    CommitFlt,
    ResetFlt,
    Dump,
    GetRtTable,
    PutRtTable,
    CopyHeader,
    QueryInterface,
    QueryIntfTxProps,
    QueryIntfRxProps,
    QueryIntfExtProps,
    GetHeader,
    PutHeader,
    AllocNatMem,
    V4InitNat,
    NatDma,
    V4DelNat,
    SetFlt,
    PullMessage,
    RmAddDependency,
    RmDelDependency,
    GenerateFltEq,
    QueryEpMapping,
    QueryRtTableIndex,
    WriteQmapId,
}

impl Opcode {
    /// Number of opcodes; valid command numbers are below this
    pub const COUNT: u8 = Opcode::WriteQmapId as u8 + 1;

    /// Opcode for a command number
    pub fn from_nr(nr: u8) -> Option<Self> {
        CATALOG.get(nr as usize).map(|spec| spec.opcode)
    }

    /// Command number
    pub const fn nr(self) -> u8 {
        self as u8
    }

    /// Catalogue entry
    pub fn spec(self) -> &'static OpcodeSpec {
        &CATALOG[self as usize]
    }

    /// Native command word
    pub fn command(self) -> Command {
        self.spec().command()
    }
}

// =============================================================================
// LAYOUT
// =============================================================================

/// How a request's argument is laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Argument is a value, not a buffer
    Scalar,
    /// Argument is one fixed-size struct
    Fixed {
        /// Struct size
        size: usize,
    },
    /// Argument is a header followed by `count` elements
    Variable {
        /// Header size
        header: usize,
        /// Byte offset of the `u32` count inside the header
        count_offset: usize,
        /// Element size
        element: usize,
        /// Largest accepted count, when bounded
        max_count: Option<u32>,
    },
}

/// Catalogue entry for one opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeSpec {
    /// Opcode
    pub opcode: Opcode,
    /// Argument layout
    pub layout: Layout,
    /// Copy the argument back to the caller after the handler runs
    pub writeback: bool,
}

impl OpcodeSpec {
    const fn scalar(opcode: Opcode) -> Self {
        Self {
            opcode,
            layout: Layout::Scalar,
            writeback: false,
        }
    }

    const fn fixed<T>(opcode: Opcode, writeback: bool) -> Self {
        Self {
            opcode,
            layout: Layout::Fixed {
                size: size_of::<T>(),
            },
            writeback,
        }
    }

    const fn variable<H, E>(
        opcode: Opcode,
        count_offset: usize,
        max_count: Option<u32>,
        writeback: bool,
    ) -> Self {
        Self {
            opcode,
            layout: Layout::Variable {
                header: size_of::<H>(),
                count_offset,
                element: size_of::<E>(),
                max_count,
            },
            writeback,
        }
    }

    /// Native command word for this entry
    pub fn command(&self) -> Command {
        match self.layout {
            Layout::Scalar => Command::none(self.opcode.nr()),
            _ => Command::read_write(self.opcode.nr(), NATIVE_PTR_SIZE),
        }
    }

    /// Command word a 32-bit caller uses for this entry
    pub fn compat_command(&self) -> Command {
        match self.layout {
            Layout::Scalar => self.command(),
            _ => Command::read_write(self.opcode.nr(), COMPAT_PTR_SIZE),
        }
    }

    /// Bytes read in the first phase
    pub const fn header_len(&self) -> usize {
        match self.layout {
            Layout::Scalar => 0,
            Layout::Fixed { size } => size,
            Layout::Variable { header, .. } => header,
        }
    }
}

const BATCH: Option<u32> = Some(MAX_BATCH);
const PROPS: Option<u32> = Some(MAX_PROPS);

/// The catalogue, indexed by command number
pub static CATALOG: [OpcodeSpec; Opcode::COUNT as usize] = [
    OpcodeSpec::variable::<AddHeaders, HeaderEntry>(
        Opcode::AddHeader,
        offset_of!(AddHeaders, num_hdrs),
        BATCH,
        true,
    ),
    OpcodeSpec::variable::<DelHeaders, HandleDelete>(
        Opcode::DelHeader,
        offset_of!(DelHeaders, num_hdls),
        BATCH,
        true,
    ),
    OpcodeSpec::variable::<AddRoutes, RouteEntry>(
        Opcode::AddRtRule,
        offset_of!(AddRoutes, num_rules),
        BATCH,
        true,
    ),
    OpcodeSpec::variable::<DelRules, HandleDelete>(
        Opcode::DelRtRule,
        offset_of!(DelRules, num_hdls),
        BATCH,
        true,
    ),
    OpcodeSpec::variable::<AddFilters, FilterEntry>(
        Opcode::AddFltRule,
        offset_of!(AddFilters, num_rules),
        BATCH,
        true,
    ),
    OpcodeSpec::variable::<DelRules, HandleDelete>(
        Opcode::DelFltRule,
        offset_of!(DelRules, num_hdls),
        BATCH,
        true,
    ),
    OpcodeSpec::scalar(Opcode::CommitHeader),
    OpcodeSpec::scalar(Opcode::ResetHeader),
    OpcodeSpec::scalar(Opcode::CommitRt),
    OpcodeSpec::scalar(Opcode::ResetRt),
    OpcodeSpec::scalar(Opcode::CommitFlt),
    OpcodeSpec::scalar(Opcode::ResetFlt),
    OpcodeSpec::scalar(Opcode::Dump),
    OpcodeSpec::fixed::<GetRouteTable>(Opcode::GetRtTable, true),
    OpcodeSpec::scalar(Opcode::PutRtTable),
    OpcodeSpec::fixed::<CopyHeader>(Opcode::CopyHeader, true),
    OpcodeSpec::fixed::<QueryInterface>(Opcode::QueryInterface, true),
    OpcodeSpec::variable::<QueryProps, TxProp>(
        Opcode::QueryIntfTxProps,
        offset_of!(QueryProps, num_props),
        PROPS,
        true,
    ),
    OpcodeSpec::variable::<QueryProps, RxProp>(
        Opcode::QueryIntfRxProps,
        offset_of!(QueryProps, num_props),
        PROPS,
        true,
    ),
    OpcodeSpec::variable::<QueryProps, ExtProp>(
        Opcode::QueryIntfExtProps,
        offset_of!(QueryProps, num_props),
        PROPS,
        true,
    ),
    OpcodeSpec::fixed::<GetHeader>(Opcode::GetHeader, true),
    OpcodeSpec::scalar(Opcode::PutHeader),
    OpcodeSpec::fixed::<NatAllocMem>(Opcode::AllocNatMem, true),
    OpcodeSpec::fixed::<NatInit>(Opcode::V4InitNat, false),
    OpcodeSpec::variable::<NatDma, NatDmaEntry>(
        Opcode::NatDma,
        offset_of!(NatDma, entries),
        BATCH,
        false,
    ),
    OpcodeSpec::fixed::<NatDel>(Opcode::V4DelNat, false),
    OpcodeSpec::scalar(Opcode::SetFlt),
    OpcodeSpec::variable::<MsgMeta, u8>(
        Opcode::PullMessage,
        offset_of!(MsgMeta, msg_len),
        Some(MAX_MSG_LEN),
        true,
    ),
    OpcodeSpec::fixed::<RmDependency>(Opcode::RmAddDependency, false),
    OpcodeSpec::fixed::<RmDependency>(Opcode::RmDelDependency, false),
    OpcodeSpec::fixed::<GenerateFilterEq>(Opcode::GenerateFltEq, true),
    OpcodeSpec::scalar(Opcode::QueryEpMapping),
    OpcodeSpec::fixed::<RouteTableIndex>(Opcode::QueryRtTableIndex, true),
    OpcodeSpec::fixed::<WriteQmapId>(Opcode::WriteQmapId, true),
];

const_assert!(size_of::<GenerateFilterEq>() <= MAX_HEADER_LEN);
const_assert!(size_of::<CopyHeader>() <= MAX_HEADER_LEN);

// =============================================================================
// LOOKUP AND SIZING
// =============================================================================

/// Find the catalogue entry for a raw command word.
///
/// The word must carry the driver's magic, a number below
/// [`Opcode::COUNT`], and exactly the direction and size of the entry.
pub fn lookup(raw: u32) -> Result<&'static OpcodeSpec> {
    let cmd = Command::from_raw(raw);
    if cmd.magic() != super::command::IOC_MAGIC || cmd.nr() >= Opcode::COUNT {
        return Err(Error::UnknownCommand);
    }

    let spec = &CATALOG[cmd.nr() as usize];
    if spec.command() != cmd {
        return Err(Error::UnknownCommand);
    }
    Ok(spec)
}

/// Total payload length for `count` elements after a header.
///
/// Fails with `InvalidArgument` if the length does not fit the platform's
/// size type.
pub fn payload_len(header: usize, count: u64, element: usize) -> Result<usize> {
    let count = usize::try_from(count).map_err(|_| Error::InvalidArgument)?;
    count
        .checked_mul(element)
        .and_then(|tail| tail.checked_add(header))
        .ok_or(Error::InvalidArgument)
}
