use crate::command::{CommandBase, CommandId, CommandRequest};
use cookie_factory as cf;
use zw_core::encoding::encoders::empty;
use zw_core::prelude::*;

/// Restarts the Z-Wave module. Fire-and-forget: no response, no callback.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SoftResetRequest {}

impl CommandId for SoftResetRequest {
    fn command_type(&self) -> CommandType {
        CommandType::Request
    }

    fn function(&self) -> u8 {
        FunctionType::SoftReset as u8
    }
}

impl CommandBase for SoftResetRequest {}

impl CommandRequest for SoftResetRequest {}

impl Serializable for SoftResetRequest {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        empty()
    }
}
