use crate::command::{CommandBase, CommandId, CommandRequest};
use cookie_factory as cf;
use zw_core::encoding::encoders::empty;
use zw_core::parse::{Input, Parsable, ParseResult};
use zw_core::prelude::*;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct GetControllerCapabilitiesRequest {}

impl CommandId for GetControllerCapabilitiesRequest {
    fn command_type(&self) -> CommandType {
        CommandType::Request
    }

    fn function(&self) -> u8 {
        FunctionType::GetControllerCapabilities as u8
    }
}

impl CommandBase for GetControllerCapabilitiesRequest {}

impl CommandRequest for GetControllerCapabilitiesRequest {
    fn expects_response(&self) -> bool {
        true
    }
}

impl Serializable for GetControllerCapabilitiesRequest {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetControllerCapabilitiesResponse {
    pub capabilities: ControllerCapabilities,
}

impl CommandId for GetControllerCapabilitiesResponse {
    fn command_type(&self) -> CommandType {
        CommandType::Response
    }

    fn function(&self) -> u8 {
        FunctionType::GetControllerCapabilities as u8
    }
}

impl CommandBase for GetControllerCapabilitiesResponse {}

impl Parsable for GetControllerCapabilitiesResponse {
    fn parse(i: Input) -> ParseResult<Self> {
        let (i, capabilities) = ControllerCapabilities::parse(i)?;
        Ok((i, Self { capabilities }))
    }
}

impl Serializable for GetControllerCapabilitiesResponse {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        let mut flags = 0u8;
        if self.capabilities.secondary {
            flags |= 0x01;
        }
        if self.capabilities.on_other_network {
            flags |= 0x02;
        }
        if self.capabilities.sis_present {
            flags |= 0x04;
        }
        if self.capabilities.real_primary {
            flags |= 0x08;
        }
        if self.capabilities.suc {
            flags |= 0x10;
        }
        cf::bytes::be_u8(flags)
    }
}
