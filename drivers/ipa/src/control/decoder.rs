//! # Control Request Decoder
//!
//! Two-phase decode of one control request:
//!
//! ```text
//!   lookup ──▶ hold gate ──▶ read header ──▶ size check ──▶ allocate
//!                                                              │
//!   write back ◀── handler ◀── count unchanged? ◀── read all ◀─┘
//! ```
//!
//! The count embedded in the header is validated before its size is
//! trusted for the second read. The payload buffer and the gate hold are
//! dropped on every exit path.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

use ipa_core::{Error, Result};
use ipa_power::PowerGate;

use super::handler::ControlHandler;
use super::layout::{self, Layout, OpcodeSpec, MAX_HEADER_LEN};
use super::payload::Payload;
use super::user::UserMemory;

/// Decoder counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecoderStats {
    /// Requests seen, accepted or not
    pub requests: u64,
    /// Requests rejected before or during decode
    pub rejected: u64,
    /// Payload buffers allocated
    pub payload_allocations: u64,
    /// Copies to or from the caller that faulted
    pub transfer_faults: u64,
    /// Requests the handler failed
    pub handler_failures: u64,
}

/// Decoder for control requests on one device
pub struct ControlDecoder {
    gate: Arc<PowerGate>,
    handler: Arc<dyn ControlHandler>,
    requests: AtomicU64,
    rejected: AtomicU64,
    payload_allocations: AtomicU64,
    transfer_faults: AtomicU64,
    handler_failures: AtomicU64,
}

impl ControlDecoder {
    /// Create a decoder over a power gate and a handler
    pub fn new(gate: Arc<PowerGate>, handler: Arc<dyn ControlHandler>) -> Self {
        Self {
            gate,
            handler,
            requests: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            payload_allocations: AtomicU64::new(0),
            transfer_faults: AtomicU64::new(0),
            handler_failures: AtomicU64::new(0),
        }
    }

    /// Decode and run one request.
    ///
    /// Returns the handler's value for scalar commands and 0 for buffer
    /// commands.
    pub fn dispatch(&self, raw: u32, arg: &mut dyn UserMemory) -> Result<u32> {
        self.requests.fetch_add(1, Ordering::Relaxed);

        let result = self.run(raw, arg);
        if let Err(e) = result {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            if e == Error::TransferFault {
                self.transfer_faults.fetch_add(1, Ordering::Relaxed);
            }
            log::debug!("IPA: request {:#010x} failed: {}", raw, e);
        }
        result
    }

    /// Counters
    pub fn stats(&self) -> DecoderStats {
        DecoderStats {
            requests: self.requests.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            payload_allocations: self.payload_allocations.load(Ordering::Relaxed),
            transfer_faults: self.transfer_faults.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
        }
    }

    fn run(&self, raw: u32, arg: &mut dyn UserMemory) -> Result<u32> {
        // No side effects before the command is known
        let spec = layout::lookup(raw)?;
        let _hold = self.gate.hold()?;

        match spec.layout {
            Layout::Scalar => self.call_value(spec, arg.value()),
            Layout::Fixed { size } => {
                let mut header = [0u8; MAX_HEADER_LEN];
                let header = &mut header[..size];
                arg.copy_in(header)?;

                let mut payload = Payload::fixed(spec.opcode, header);
                self.call(&mut payload)?;
                if spec.writeback {
                    arg.copy_out(payload.as_bytes())?;
                }
                Ok(0)
            },
            Layout::Variable {
                header,
                count_offset,
                element,
                max_count,
            } => {
                let mut local = [0u8; MAX_HEADER_LEN];
                arg.copy_in(&mut local[..header])?;

                let count = read_count(&local, count_offset);
                if let Some(max) = max_count {
                    if count > max {
                        log::warn!(
                            "IPA: {:?} count {} exceeds {}",
                            spec.opcode,
                            count,
                            max
                        );
                        return Err(Error::InvalidArgument);
                    }
                }
                let len = layout::payload_len(header, u64::from(count), element)?;

                let mut buf = self.allocate(len)?;
                arg.copy_in(&mut buf)?;

                // The caller may have changed the header between the reads
                if read_count(&buf, count_offset) != count {
                    log::warn!("IPA: {:?} count changed between reads", spec.opcode);
                    return Err(Error::InvalidArgument);
                }

                let mut payload =
                    Payload::variable(spec.opcode, &mut buf, header, element, count as usize);
                self.call(&mut payload)?;
                if spec.writeback {
                    arg.copy_out(payload.as_bytes())?;
                }
                Ok(0)
            },
        }
    }

    fn allocate(&self, len: usize) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(len).map_err(|_| Error::OutOfMemory)?;
        buf.resize(len, 0);
        self.payload_allocations.fetch_add(1, Ordering::Relaxed);
        Ok(buf)
    }

    fn call(&self, payload: &mut Payload<'_>) -> Result<()> {
        let opcode = payload.opcode();
        self.handler
            .handle(payload)
            .map_err(|e| self.handler_failed(opcode, e))
    }

    fn call_value(&self, spec: &OpcodeSpec, arg: usize) -> Result<u32> {
        self.handler
            .handle_value(spec.opcode, arg)
            .map_err(|e| self.handler_failed(spec.opcode, e))
    }

    fn handler_failed(&self, opcode: layout::Opcode, e: Error) -> Error {
        self.handler_failures.fetch_add(1, Ordering::Relaxed);
        log::error!("IPA: {:?} handler failed: {}", opcode, e);
        Error::OperationFailed
    }
}

impl fmt::Debug for ControlDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlDecoder")
            .field("gate", &self.gate)
            .field("stats", &self.stats())
            .finish()
    }
}

fn read_count(header: &[u8], offset: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&header[offset..offset + 4]);
    u32::from_ne_bytes(word)
}
