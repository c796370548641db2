use crate::command::{result, CommandFlags, ParamBlock};

/// Forwarding seam for commands addressed to devices the emulator does not
/// own, and for command strings it does not recognize. The core never
/// inspects the relay's answer beyond returning it verbatim.
pub trait CommandRelay: Send + Sync {
    fn send_command(
        &self,
        device_id: u32,
        code: u32,
        flags: CommandFlags,
        params: &mut ParamBlock,
    ) -> u32;

    fn send_string(&self, command: &str, answer: &mut String) -> u32;
}

/// Relay used when no underlying subsystem exists; everything forwarded
/// here comes back as unrecognized.
pub struct NullRelay;

impl CommandRelay for NullRelay {
    fn send_command(
        &self,
        _device_id: u32,
        _code: u32,
        _flags: CommandFlags,
        _params: &mut ParamBlock,
    ) -> u32 {
        result::UNRECOGNIZED_COMMAND
    }

    fn send_string(&self, _command: &str, _answer: &mut String) -> u32 {
        result::UNRECOGNIZED_COMMAND
    }
}
