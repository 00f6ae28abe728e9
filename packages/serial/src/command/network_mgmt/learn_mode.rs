use crate::command::{CommandBase, CommandId, CommandRequest};
use cookie_factory as cf;
use nom::{error::context, number::complete::be_u8};
use zw_core::parse::{Input, Parsable, ParseResult};
use zw_core::prelude::*;

pub const LEARN_MODE_STARTED: u8 = 0x01;
pub const LEARN_MODE_DONE: u8 = 0x06;
pub const LEARN_MODE_FAILED: u8 = 0x07;

/// Puts the controller into learn mode so another controller can include
/// it and replicate the network (or exclude it again).
#[derive(Debug, Clone, PartialEq)]
pub struct SetLearnModeRequest {
    pub enable: bool,
    pub callback_id: Option<u8>,
}

impl SetLearnModeRequest {
    pub fn new(enable: bool) -> Self {
        Self {
            enable,
            callback_id: None,
        }
    }
}

impl CommandId for SetLearnModeRequest {
    fn command_type(&self) -> CommandType {
        CommandType::Request
    }

    fn function(&self) -> u8 {
        FunctionType::SetLearnMode as u8
    }
}

impl CommandBase for SetLearnModeRequest {
    fn callback_id(&self) -> Option<u8> {
        self.callback_id
    }
}

impl CommandRequest for SetLearnModeRequest {
    fn expects_response(&self) -> bool {
        true
    }

    fn expects_callback(&self) -> bool {
        self.enable
    }

    fn needs_callback_id(&self) -> bool {
        true
    }

    fn set_callback_id(&mut self, callback_id: Option<u8>) {
        self.callback_id = callback_id;
    }
}

impl Serializable for SetLearnModeRequest {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        use cf::{bytes::be_u8, sequence::tuple};
        move |out| {
            tuple((
                be_u8(self.enable as u8),
                be_u8(self.callback_id.unwrap_or(0)),
            ))(out)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetLearnModeResponse {
    pub started: bool,
}

impl CommandId for SetLearnModeResponse {
    fn command_type(&self) -> CommandType {
        CommandType::Response
    }

    fn function(&self) -> u8 {
        FunctionType::SetLearnMode as u8
    }
}

impl CommandBase for SetLearnModeResponse {
    fn is_ok(&self) -> bool {
        self.started
    }
}

impl Parsable for SetLearnModeResponse {
    fn parse(i: Input) -> ParseResult<Self> {
        let (i, started) = context("SetLearnMode", be_u8)(i)?;
        Ok((
            i,
            Self {
                started: started != 0,
            },
        ))
    }
}

impl Serializable for SetLearnModeResponse {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        cf::bytes::be_u8(self.started as u8)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetLearnModeCallback {
    pub callback_id: u8,
    pub status: u8,
    pub node_id: NodeId,
}

impl CommandId for SetLearnModeCallback {
    fn command_type(&self) -> CommandType {
        CommandType::Request
    }

    fn function(&self) -> u8 {
        FunctionType::SetLearnMode as u8
    }
}

impl CommandBase for SetLearnModeCallback {
    fn is_ok(&self) -> bool {
        self.status != LEARN_MODE_FAILED
    }

    fn callback_id(&self) -> Option<u8> {
        Some(self.callback_id)
    }
}

impl Parsable for SetLearnModeCallback {
    fn parse(i: Input) -> ParseResult<Self> {
        let (i, callback_id) = context("SetLearnMode callback", be_u8)(i)?;
        let (i, status) = be_u8(i)?;
        let (i, node_id) = NodeId::parse(i)?;
        Ok((
            i,
            Self {
                callback_id,
                status,
                node_id,
            },
        ))
    }
}

impl Serializable for SetLearnModeCallback {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        use cf::{bytes::be_u8, sequence::tuple};
        move |out| {
            tuple((
                be_u8(self.callback_id),
                be_u8(self.status),
                self.node_id.serialize(),
            ))(out)
        }
    }
}
