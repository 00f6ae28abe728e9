use crate::command::{CommandBase, CommandId, CommandRequest, NifData, wire};
use cookie_factory as cf;
use derive_try_from_primitive::TryFromPrimitive;
use nom::{combinator::map_res, error::context, number::complete::be_u8};
use zw_core::parse::{Input, Parsable, ParseResult};
use zw_core::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveNodeMode {
    Any = 0x01,
    Controller = 0x02,
    Slave = 0x03,
    Stop = 0x05,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum RemoveNodeStatus {
    LearnReady = 0x01,
    NodeFound = 0x02,
    RemovingSlave = 0x03,
    RemovingController = 0x04,
    Done = 0x06,
    Failed = 0x07,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoveNodeFromNetworkRequest {
    pub mode: RemoveNodeMode,
    pub callback_id: Option<u8>,
}

impl RemoveNodeFromNetworkRequest {
    pub fn new(mode: RemoveNodeMode) -> Self {
        Self {
            mode,
            callback_id: None,
        }
    }

    pub fn stop() -> Self {
        Self::new(RemoveNodeMode::Stop)
    }
}

impl CommandId for RemoveNodeFromNetworkRequest {
    fn command_type(&self) -> CommandType {
        CommandType::Request
    }

    fn function(&self) -> u8 {
        FunctionType::RemoveNodeFromNetwork as u8
    }
}

impl CommandBase for RemoveNodeFromNetworkRequest {
    fn callback_id(&self) -> Option<u8> {
        self.callback_id
    }
}

impl CommandRequest for RemoveNodeFromNetworkRequest {
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

impl Serializable for RemoveNodeFromNetworkRequest {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        use cf::{bytes::be_u8, sequence::tuple};
        move |out| {
            tuple((
                be_u8(self.mode as u8),
                be_u8(self.callback_id.unwrap_or(0)),
            ))(out)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoveNodeFromNetworkCallback {
    pub callback_id: u8,
    pub status: RemoveNodeStatus,
    pub node_id: NodeId,
    pub node_info: Option<NifData>,
}

impl CommandId for RemoveNodeFromNetworkCallback {
    fn command_type(&self) -> CommandType {
        CommandType::Request
    }

    fn function(&self) -> u8 {
        FunctionType::RemoveNodeFromNetwork as u8
    }
}

impl CommandBase for RemoveNodeFromNetworkCallback {
    fn is_ok(&self) -> bool {
        self.status != RemoveNodeStatus::Failed
    }

    fn callback_id(&self) -> Option<u8> {
        Some(self.callback_id)
    }
}

impl Parsable for RemoveNodeFromNetworkCallback {
    fn parse(i: Input) -> ParseResult<Self> {
        let (i, callback_id) = context("RemoveNodeFromNetwork callback", be_u8)(i)?;
        let (i, status) = map_res(be_u8, RemoveNodeStatus::try_from)(i)?;
        let (i, node_id) = NodeId::parse(i)?;
        let (i, node_info) = wire::node_info_body(i)?;

        Ok((
            i,
            Self {
                callback_id,
                status,
                node_id,
                node_info,
            },
        ))
    }
}

impl Serializable for RemoveNodeFromNetworkCallback {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        use cf::{bytes::be_u8, sequence::tuple};
        move |out| {
            tuple((
                be_u8(self.callback_id),
                be_u8(self.status as u8),
                self.node_id.serialize(),
                be_u8(0),
            ))(out)
        }
    }
}
