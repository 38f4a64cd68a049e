//! # Register Windows
//!
//! Mapped register windows with 32-bit accessors. Offsets are in bytes
//! from the window base; the window owner checks bounds.

use alloc::sync::Arc;

use ipa_core::Result;

/// A mapped register window
pub trait RegisterWindow: Send + Sync {
    /// Physical base this window maps
    fn base(&self) -> u64;

    /// Size of the window in bytes
    fn size(&self) -> u64;

    /// Read a 32-bit register
    fn read32(&self, offset: u32) -> u32;

    /// Write a 32-bit register
    fn write32(&self, offset: u32, value: u32);
}

/// Maps physical register ranges
pub trait IoMapper: Send + Sync {
    /// Map `size` bytes at physical `base`
    fn map(&self, base: u64, size: u64) -> Result<Arc<dyn RegisterWindow>>;

    /// Unmap a window returned by `map`
    fn unmap(&self, window: Arc<dyn RegisterWindow>);
}
