//! # Command Words
//!
//! Control requests are identified by a 32-bit command word in the usual
//! ioctl encoding:
//!
//! ```text
//!  31  30 29                       16 15          8 7           0
//! ┌──────┬───────────────────────────┬─────────────┬─────────────┐
//! │ dir  │           size            │    magic    │   number    │
//! └──────┴───────────────────────────┴─────────────┴─────────────┘
//! ```
//!
//! Buffer-style commands carry the caller's pointer width in `size`,
//! which is the only thing distinguishing a narrow-pointer caller's
//! command from the native one.

use bitflags::bitflags;
use core::fmt;

/// Magic byte of every IPA command
pub const IOC_MAGIC: u8 = 0xCF;

/// Pointer width of a native caller
pub const NATIVE_PTR_SIZE: u16 = core::mem::size_of::<usize>() as u16;

/// Pointer width of a 32-bit caller
pub const COMPAT_PTR_SIZE: u16 = 4;

const NR_SHIFT: u32 = 0;
const MAGIC_SHIFT: u32 = 8;
const SIZE_SHIFT: u32 = 16;
const DIR_SHIFT: u32 = 30;
const SIZE_MASK: u32 = (1 << 14) - 1;

bitflags! {
    /// Transfer direction, from the caller's point of view
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Direction: u32 {
        /// Caller writes, driver reads
        const WRITE = 1;
        /// Driver writes, caller reads
        const READ  = 2;
    }
}

/// A decoded command word
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Command(u32);

impl Command {
    /// Command with no argument buffer
    pub const fn none(nr: u8) -> Self {
        Self::encode(Direction::empty(), nr, 0)
    }

    /// Read/write command with an argument of `size` bytes
    pub const fn read_write(nr: u8, size: u16) -> Self {
        Self::encode(Direction::READ.union(Direction::WRITE), nr, size)
    }

    const fn encode(dir: Direction, nr: u8, size: u16) -> Self {
        Self(
            (dir.bits() << DIR_SHIFT)
                | (((size as u32) & SIZE_MASK) << SIZE_SHIFT)
                | ((IOC_MAGIC as u32) << MAGIC_SHIFT)
                | ((nr as u32) << NR_SHIFT),
        )
    }

    /// Wrap a raw command word
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw command word
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Command number
    pub const fn nr(self) -> u8 {
        (self.0 >> NR_SHIFT) as u8
    }

    /// Magic byte
    pub const fn magic(self) -> u8 {
        (self.0 >> MAGIC_SHIFT) as u8
    }

    /// Argument size field
    pub const fn size(self) -> u16 {
        ((self.0 >> SIZE_SHIFT) & SIZE_MASK) as u16
    }

    /// Transfer direction
    pub const fn direction(self) -> Direction {
        Direction::from_bits_truncate(self.0 >> DIR_SHIFT)
    }

    /// Same command with a different argument size
    pub const fn with_size(self, size: u16) -> Self {
        Self::encode(self.direction(), self.nr(), size)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Command({:#010x}: nr={} magic={:#x} size={} dir={:?})",
            self.0,
            self.nr(),
            self.magic(),
            self.size(),
            self.direction()
        )
    }
}
