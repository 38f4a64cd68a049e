//! Handler seam between the decoder and the rule, table and NAT managers.

use ipa_core::Result;

use super::layout::Opcode;
use super::payload::Payload;

/// Consumer of decoded control requests.
///
/// Buffer requests arrive as a [`Payload`] the handler may rewrite in
/// place; the decoder copies it back for opcodes that return data.
/// Scalar requests arrive as the raw argument value, and the returned
/// value becomes the call's result.
pub trait ControlHandler: Send + Sync {
    /// Handle a buffer request
    fn handle(&self, payload: &mut Payload<'_>) -> Result<()>;

    /// Handle a scalar request
    fn handle_value(&self, opcode: Opcode, arg: usize) -> Result<u32>;
}
