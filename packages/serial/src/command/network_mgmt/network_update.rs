use crate::command::{CommandBase, CommandId, CommandRequest};
use cookie_factory as cf;
use nom::{error::context, number::complete::be_u8};
use zw_core::parse::{Input, Parsable, ParseResult};
use zw_core::prelude::*;

pub const NETWORK_UPDATE_DONE: u8 = 0x00;
pub const NETWORK_UPDATE_ABORT: u8 = 0x01;
pub const NETWORK_UPDATE_WAIT: u8 = 0x02;
pub const NETWORK_UPDATE_DISABLED: u8 = 0x03;
pub const NETWORK_UPDATE_OVERFLOW: u8 = 0x04;

/// Requests a network topology update from the SUC
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RequestNetworkUpdateRequest {
    pub callback_id: Option<u8>,
}

impl CommandId for RequestNetworkUpdateRequest {
    fn command_type(&self) -> CommandType {
        CommandType::Request
    }

    fn function(&self) -> u8 {
        FunctionType::RequestNetworkUpdate as u8
    }
}

impl CommandBase for RequestNetworkUpdateRequest {
    fn callback_id(&self) -> Option<u8> {
        self.callback_id
    }
}

impl CommandRequest for RequestNetworkUpdateRequest {
    fn expects_response(&self) -> bool {
        true
    }

    fn expects_callback(&self) -> bool {
        true
    }

    fn needs_callback_id(&self) -> bool {
        true
    }

    fn set_callback_id(&mut self, callback_id: Option<u8>) {
        self.callback_id = callback_id;
    }
}

impl Serializable for RequestNetworkUpdateRequest {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        cf::bytes::be_u8(self.callback_id.unwrap_or(0))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestNetworkUpdateResponse {
    pub started: bool,
}

impl CommandId for RequestNetworkUpdateResponse {
    fn command_type(&self) -> CommandType {
        CommandType::Response
    }

    fn function(&self) -> u8 {
        FunctionType::RequestNetworkUpdate as u8
    }
}

impl CommandBase for RequestNetworkUpdateResponse {
    fn is_ok(&self) -> bool {
        self.started
    }
}

impl Parsable for RequestNetworkUpdateResponse {
    fn parse(i: Input) -> ParseResult<Self> {
        let (i, started) = context("RequestNetworkUpdate", be_u8)(i)?;
        Ok((
            i,
            Self {
                started: started != 0,
            },
        ))
    }
}

impl Serializable for RequestNetworkUpdateResponse {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        cf::bytes::be_u8(self.started as u8)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestNetworkUpdateCallback {
    pub callback_id: u8,
    pub status: u8,
}

impl CommandId for RequestNetworkUpdateCallback {
    fn command_type(&self) -> CommandType {
        CommandType::Request
    }

    fn function(&self) -> u8 {
        FunctionType::RequestNetworkUpdate as u8
    }
}

impl CommandBase for RequestNetworkUpdateCallback {
    fn is_ok(&self) -> bool {
        self.status == NETWORK_UPDATE_DONE
    }

    fn callback_id(&self) -> Option<u8> {
        Some(self.callback_id)
    }
}

impl Parsable for RequestNetworkUpdateCallback {
    fn parse(i: Input) -> ParseResult<Self> {
        let (i, callback_id) = context("RequestNetworkUpdate callback", be_u8)(i)?;
        let (i, status) = be_u8(i)?;
        Ok((
            i,
            Self {
                callback_id,
                status,
            },
        ))
    }
}

impl Serializable for RequestNetworkUpdateCallback {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        use cf::{bytes::be_u8, sequence::tuple};
        move |out| tuple((be_u8(self.callback_id), be_u8(self.status)))(out)
    }
}
