use crate::command::{CommandBase, CommandId, CommandRequest};
use cookie_factory as cf;
use nom::{error::context, number::complete::be_u8};
use zw_core::parse::{Input, Parsable, ParseResult};
use zw_core::prelude::*;

pub const NEIGHBOR_UPDATE_STARTED: u8 = 0x21;
pub const NEIGHBOR_UPDATE_DONE: u8 = 0x22;
pub const NEIGHBOR_UPDATE_FAILED: u8 = 0x23;

/// Asks a node to rediscover its neighbors. No response; progress comes in
/// via callbacks.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestNodeNeighborUpdateRequest {
    pub node_id: NodeId,
    pub callback_id: Option<u8>,
}

impl RequestNodeNeighborUpdateRequest {
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            callback_id: None,
        }
    }
}

impl CommandId for RequestNodeNeighborUpdateRequest {
    fn command_type(&self) -> CommandType {
        CommandType::Request
    }

    fn function(&self) -> u8 {
        FunctionType::RequestNodeNeighborUpdate as u8
    }
}

impl CommandBase for RequestNodeNeighborUpdateRequest {
    fn callback_id(&self) -> Option<u8> {
        self.callback_id
    }
}

impl CommandRequest for RequestNodeNeighborUpdateRequest {
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

impl Serializable for RequestNodeNeighborUpdateRequest {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        use cf::{bytes::be_u8, sequence::tuple};
        move |out| {
            tuple((
                self.node_id.serialize(),
                be_u8(self.callback_id.unwrap_or(0)),
            ))(out)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestNodeNeighborUpdateCallback {
    pub callback_id: u8,
    pub status: u8,
}

impl RequestNodeNeighborUpdateCallback {
    pub fn is_final(&self) -> bool {
        self.status != NEIGHBOR_UPDATE_STARTED
    }
}

impl CommandId for RequestNodeNeighborUpdateCallback {
    fn command_type(&self) -> CommandType {
        CommandType::Request
    }

    fn function(&self) -> u8 {
        FunctionType::RequestNodeNeighborUpdate as u8
    }
}

impl CommandBase for RequestNodeNeighborUpdateCallback {
    fn is_ok(&self) -> bool {
        self.status != NEIGHBOR_UPDATE_FAILED
    }

    fn callback_id(&self) -> Option<u8> {
        Some(self.callback_id)
    }
}

impl Parsable for RequestNodeNeighborUpdateCallback {
    fn parse(i: Input) -> ParseResult<Self> {
        let (i, callback_id) = context("RequestNodeNeighborUpdate callback", be_u8)(i)?;
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

impl Serializable for RequestNodeNeighborUpdateCallback {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        use cf::{bytes::be_u8, sequence::tuple};
        move |out| tuple((be_u8(self.callback_id), be_u8(self.status)))(out)
    }
}
