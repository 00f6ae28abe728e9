use crate::command::{CommandBase, CommandId, CommandRequest};
use cookie_factory as cf;
use nom::{error::context, number::complete::be_u8};
use zw_core::parse::{Input, Parsable, ParseResult};
use zw_core::prelude::*;

/// Asks a node to send its node information frame. The NIF itself arrives
/// later as an `ApplicationUpdate` request, not as a callback.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestNodeInfoRequest {
    pub node_id: NodeId,
}

impl CommandId for RequestNodeInfoRequest {
    fn command_type(&self) -> CommandType {
        CommandType::Request
    }

    fn function(&self) -> u8 {
        FunctionType::RequestNodeInfo as u8
    }
}

impl CommandBase for RequestNodeInfoRequest {}

impl CommandRequest for RequestNodeInfoRequest {
    fn expects_response(&self) -> bool {
        true
    }
}

impl Serializable for RequestNodeInfoRequest {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        self.node_id.serialize()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestNodeInfoResponse {
    pub started: bool,
}

impl CommandId for RequestNodeInfoResponse {
    fn command_type(&self) -> CommandType {
        CommandType::Response
    }

    fn function(&self) -> u8 {
        FunctionType::RequestNodeInfo as u8
    }
}

impl CommandBase for RequestNodeInfoResponse {
    fn is_ok(&self) -> bool {
        self.started
    }
}

impl Parsable for RequestNodeInfoResponse {
    fn parse(i: Input) -> ParseResult<Self> {
        let (i, started) = context("RequestNodeInfo", be_u8)(i)?;
        Ok((
            i,
            Self {
                started: started != 0,
            },
        ))
    }
}

impl Serializable for RequestNodeInfoResponse {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        cf::bytes::be_u8(self.started as u8)
    }
}
