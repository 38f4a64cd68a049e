//! # Control Requests
//!
//! Everything between the device node's `ioctl` entry and the handlers:
//! command words, the opcode catalogue, wire structs, caller memory, and
//! the decoder itself.

pub mod abi;
pub mod command;
#[cfg(feature = "compat")]
pub mod compat;
pub mod decoder;
pub mod handler;
pub mod layout;
pub mod payload;
pub mod user;

pub use command::{Command, Direction, IOC_MAGIC};
pub use decoder::{ControlDecoder, DecoderStats};
pub use handler::ControlHandler;
pub use layout::{lookup, Layout, Opcode, OpcodeSpec, CATALOG};
pub use payload::Payload;
pub use user::{UserMemory, UserSlice, UserValue};
