//! # Caller Memory
//!
//! The caller's argument, as seen from the driver. Copies are bounded:
//! a copy either moves every requested byte or fails with
//! `TransferFault`, and a fault is an ordinary error return.

use ipa_core::{Error, Result};

/// The argument of one control call
pub trait UserMemory {
    /// The argument as a plain value, for scalar commands
    fn value(&self) -> usize;

    /// Copy `dst.len()` bytes from the start of the caller's buffer
    fn copy_in(&self, dst: &mut [u8]) -> Result<()>;

    /// Copy `src` to the start of the caller's buffer
    fn copy_out(&mut self, src: &[u8]) -> Result<()>;
}

/// Caller memory backed by a byte slice
#[derive(Debug)]
pub struct UserSlice<'a> {
    bytes: &'a mut [u8],
}

impl<'a> UserSlice<'a> {
    /// Wrap a buffer
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Self { bytes }
    }
}

impl UserMemory for UserSlice<'_> {
    fn value(&self) -> usize {
        self.bytes.as_ptr() as usize
    }

    fn copy_in(&self, dst: &mut [u8]) -> Result<()> {
        let src = self.bytes.get(..dst.len()).ok_or(Error::TransferFault)?;
        dst.copy_from_slice(src);
        Ok(())
    }

    fn copy_out(&mut self, src: &[u8]) -> Result<()> {
        let dst = self.bytes.get_mut(..src.len()).ok_or(Error::TransferFault)?;
        dst.copy_from_slice(src);
        Ok(())
    }
}

/// A plain value argument; any copy through it faults
#[derive(Debug, Clone, Copy)]
pub struct UserValue(pub usize);

impl UserMemory for UserValue {
    fn value(&self) -> usize {
        self.0
    }

    fn copy_in(&self, _dst: &mut [u8]) -> Result<()> {
        Err(Error::TransferFault)
    }

    fn copy_out(&mut self, _src: &[u8]) -> Result<()> {
        Err(Error::TransferFault)
    }
}
