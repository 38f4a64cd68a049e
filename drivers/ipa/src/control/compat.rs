//! # Narrow-Pointer Callers
//!
//! A 32-bit caller on a 64-bit kernel encodes a 4-byte pointer size in
//! its buffer commands. Those are mapped to the native command before
//! dispatch; the argument layouts themselves are width-independent.

use ipa_core::{Error, Result};

use super::command::Command;
use super::layout::{Layout, Opcode, OpcodeSpec};

/// Native command word for a compat caller's `raw` command.
///
/// Scalar commands pass through. A buffer command must carry the
/// compat pointer size; anything else fails with `NoCompatCommand`.
pub fn translate(raw: u32) -> Result<u32> {
    let cmd = Command::from_raw(raw);
    let opcode = match Opcode::from_nr(cmd.nr()) {
        Some(opcode) if cmd.magic() == super::command::IOC_MAGIC => opcode,
        _ => return Err(Error::NoCompatCommand),
    };

    let spec = opcode.spec();
    if spec.layout == Layout::Scalar && spec.command() == cmd {
        return Ok(raw);
    }

    match widen(spec, cmd) {
        Some(native) => {
            log::trace!("IPA: compat {:?} -> {:?}", opcode, native);
            Ok(native.raw())
        },
        None => Err(Error::NoCompatCommand),
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_pointer_width = "64")] {
        fn widen(spec: &OpcodeSpec, cmd: Command) -> Option<Command> {
            (spec.compat_command() == cmd).then(|| spec.command())
        }
    } else {
        // Pointer widths agree; only native commands are valid
        fn widen(spec: &OpcodeSpec, cmd: Command) -> Option<Command> {
            (spec.command() == cmd).then_some(cmd)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::layout::CATALOG;

    #[test]
    fn test_scalar_passes_through() {
        let raw = Opcode::CommitRt.command().raw();
        assert_eq!(translate(raw), Ok(raw));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_compat_buffer_commands_map_to_native() {
        for spec in CATALOG.iter() {
            let native = spec.command().raw();
            assert_eq!(translate(spec.compat_command().raw()), Ok(native));
            if spec.layout != Layout::Scalar {
                // A native-width word is not a compat command
                assert_eq!(translate(native), Err(Error::NoCompatCommand));
            }
        }
    }

    #[test]
    fn test_foreign_commands_rejected() {
        let foreign = Opcode::Dump.command().raw() & !0xff00;
        assert_eq!(translate(foreign), Err(Error::NoCompatCommand));

        let out_of_range = Command::none(Opcode::COUNT).raw();
        assert_eq!(translate(out_of_range), Err(Error::NoCompatCommand));

        let odd_size = Opcode::AddHeader.command().with_size(12).raw();
        assert_eq!(translate(odd_size), Err(Error::NoCompatCommand));
    }
}
