//! # Decoded Payload
//!
//! Typed access to a request's bytes. Accessors copy through
//! `pod_read_unaligned`, so the byte buffer needs no particular
//! alignment.

use bytemuck::Pod;
use core::mem::size_of;

use ipa_core::{Error, Result};

use super::layout::Opcode;

/// A request's argument bytes, as handed to a handler
#[derive(Debug)]
pub struct Payload<'a> {
    opcode: Opcode,
    bytes: &'a mut [u8],
    header_len: usize,
    element_len: usize,
    count: usize,
}

impl<'a> Payload<'a> {
    /// Payload with no variable tail
    pub(crate) fn fixed(opcode: Opcode, bytes: &'a mut [u8]) -> Self {
        let header_len = bytes.len();
        Self {
            opcode,
            bytes,
            header_len,
            element_len: 0,
            count: 0,
        }
    }

    /// Payload of a header followed by `count` elements
    pub(crate) fn variable(
        opcode: Opcode,
        bytes: &'a mut [u8],
        header_len: usize,
        element_len: usize,
        count: usize,
    ) -> Self {
        Self {
            opcode,
            bytes,
            header_len,
            element_len,
            count,
        }
    }

    /// Request opcode
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Number of elements after the header
    pub fn count(&self) -> usize {
        self.count
    }

    /// All bytes
    pub fn as_bytes(&self) -> &[u8] {
        self.bytes
    }

    /// All bytes, mutable
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        self.bytes
    }

    /// Bytes after the header
    pub fn tail(&self) -> &[u8] {
        &self.bytes[self.header_len..]
    }

    /// Bytes after the header, mutable
    pub fn tail_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[self.header_len..]
    }

    /// Read the header as `H`
    pub fn header<H: Pod>(&self) -> Result<H> {
        self.read(0, self.header_len)
    }

    /// Overwrite the header with `header`
    pub fn set_header<H: Pod>(&mut self, header: &H) -> Result<()> {
        self.write(0, self.header_len, header)
    }

    /// Read element `index` as `E`
    pub fn element<E: Pod>(&self, index: usize) -> Result<E> {
        let offset = self.element_offset(index)?;
        self.read(offset, self.element_len)
    }

    /// Overwrite element `index`
    pub fn set_element<E: Pod>(&mut self, index: usize, element: &E) -> Result<()> {
        let offset = self.element_offset(index)?;
        self.write(offset, self.element_len, element)
    }

    fn element_offset(&self, index: usize) -> Result<usize> {
        if index >= self.count {
            return Err(Error::InvalidArgument);
        }
        Ok(self.header_len + index * self.element_len)
    }

    fn read<T: Pod>(&self, offset: usize, len: usize) -> Result<T> {
        if size_of::<T>() != len {
            return Err(Error::InvalidArgument);
        }
        Ok(bytemuck::pod_read_unaligned(&self.bytes[offset..offset + len]))
    }

    fn write<T: Pod>(&mut self, offset: usize, len: usize, value: &T) -> Result<()> {
        if size_of::<T>() != len {
            return Err(Error::InvalidArgument);
        }
        self.bytes[offset..offset + len].copy_from_slice(bytemuck::bytes_of(value));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::abi::{DelHeaders, HandleDelete};

    #[test]
    fn test_typed_access_unaligned() {
        // Offset by one so the struct view is misaligned
        let mut backing = [0u8; 1 + 8 + 2 * 8];
        let bytes = &mut backing[1..];
        let mut payload = Payload::variable(Opcode::DelHeader, bytes, 8, 8, 2);

        payload
            .set_header(&DelHeaders {
                commit: 1,
                num_hdls: 2,
            })
            .unwrap();
        payload
            .set_element(1, &HandleDelete { hdl: 0x42, status: -1 })
            .unwrap();

        assert_eq!(payload.header::<DelHeaders>().unwrap().num_hdls, 2);
        assert_eq!(payload.element::<HandleDelete>(1).unwrap().hdl, 0x42);
        assert_eq!(payload.element::<HandleDelete>(0).unwrap().hdl, 0);
    }

    #[test]
    fn test_bounds_and_size_checked() {
        let mut bytes = [0u8; 8 + 8];
        let payload = Payload::variable(Opcode::DelHeader, &mut bytes, 8, 8, 1);

        assert_eq!(payload.element::<HandleDelete>(1).map(|_| ()), Err(Error::InvalidArgument));
        assert_eq!(payload.header::<u32>(), Err(Error::InvalidArgument));
        assert_eq!(payload.tail().len(), 8);
    }
}
