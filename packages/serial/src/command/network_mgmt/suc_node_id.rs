use crate::command::{CommandBase, CommandId, CommandRequest};
use cookie_factory as cf;
use nom::{error::context, number::complete::be_u8};
use zw_core::encoding::encoders::empty;
use zw_core::parse::{Input, Parsable, ParseResult};
use zw_core::prelude::*;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct GetSucNodeIdRequest {}

impl CommandId for GetSucNodeIdRequest {
    fn command_type(&self) -> CommandType {
        CommandType::Request
    }

    fn function(&self) -> u8 {
        FunctionType::GetSucNodeId as u8
    }
}

impl CommandBase for GetSucNodeIdRequest {}

impl CommandRequest for GetSucNodeIdRequest {
    fn expects_response(&self) -> bool {
        true
    }
}

impl Serializable for GetSucNodeIdRequest {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetSucNodeIdResponse {
    /// None if no SUC is present on the network
    pub suc_node_id: Option<NodeId>,
}

impl CommandId for GetSucNodeIdResponse {
    fn command_type(&self) -> CommandType {
        CommandType::Response
    }

    fn function(&self) -> u8 {
        FunctionType::GetSucNodeId as u8
    }
}

impl CommandBase for GetSucNodeIdResponse {}

impl Parsable for GetSucNodeIdResponse {
    fn parse(i: Input) -> ParseResult<Self> {
        let (i, node_id) = context("GetSucNodeId", be_u8)(i)?;
        Ok((
            i,
            Self {
                suc_node_id: (node_id != 0).then(|| NodeId::new(node_id)),
            },
        ))
    }
}

impl Serializable for GetSucNodeIdResponse {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        cf::bytes::be_u8(self.suc_node_id.map(u8::from).unwrap_or(0))
    }
}

/// Makes the given node the SUC/SIS for the network
#[derive(Debug, Clone, PartialEq)]
pub struct SetSucNodeIdRequest {
    pub node_id: NodeId,
    pub enable: bool,
    /// 0x01 requests SIS functionality on top of SUC
    pub capabilities: u8,
    pub callback_id: Option<u8>,
}

impl SetSucNodeIdRequest {
    pub fn new(node_id: NodeId, enable: bool) -> Self {
        Self {
            node_id,
            enable,
            capabilities: 0x01,
            callback_id: None,
        }
    }
}

impl CommandId for SetSucNodeIdRequest {
    fn command_type(&self) -> CommandType {
        CommandType::Request
    }

    fn function(&self) -> u8 {
        FunctionType::SetSucNodeId as u8
    }
}

impl CommandBase for SetSucNodeIdRequest {
    fn callback_id(&self) -> Option<u8> {
        self.callback_id
    }
}

impl CommandRequest for SetSucNodeIdRequest {
    fn expects_response(&self) -> bool {
        true
    }

    fn needs_callback_id(&self) -> bool {
        true
    }

    fn set_callback_id(&mut self, callback_id: Option<u8>) {
        self.callback_id = callback_id;
    }
}

impl Serializable for SetSucNodeIdRequest {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        use cf::{bytes::be_u8, sequence::tuple};
        move |out| {
            tuple((
                self.node_id.serialize(),
                be_u8(self.enable as u8),
                be_u8(TRANSMIT_OPTION_ACK | TRANSMIT_OPTION_AUTO_ROUTE),
                be_u8(self.capabilities),
                be_u8(self.callback_id.unwrap_or(0)),
            ))(out)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetSucNodeIdResponse {
    pub success: bool,
}

impl CommandId for SetSucNodeIdResponse {
    fn command_type(&self) -> CommandType {
        CommandType::Response
    }

    fn function(&self) -> u8 {
        FunctionType::SetSucNodeId as u8
    }
}

impl CommandBase for SetSucNodeIdResponse {
    fn is_ok(&self) -> bool {
        self.success
    }
}

impl Parsable for SetSucNodeIdResponse {
    fn parse(i: Input) -> ParseResult<Self> {
        let (i, success) = context("SetSucNodeId", be_u8)(i)?;
        Ok((
            i,
            Self {
                success: success != 0,
            },
        ))
    }
}

impl Serializable for SetSucNodeIdResponse {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        cf::bytes::be_u8(self.success as u8)
    }
}
