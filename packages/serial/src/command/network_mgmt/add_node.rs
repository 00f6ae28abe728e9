use crate::command::{CommandBase, CommandId, CommandRequest, NifData, wire};
use cookie_factory as cf;
use derive_try_from_primitive::TryFromPrimitive;
use nom::{combinator::map_res, error::context, number::complete::be_u8};
use zw_core::parse::{Input, Parsable, ParseResult};
use zw_core::prelude::*;

const OPTION_HIGH_POWER: u8 = 0x80;
const OPTION_NETWORK_WIDE: u8 = 0x40;

/// What kind of device the controller should accept into the network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddNodeMode {
    Any = 0x01,
    Controller = 0x02,
    Slave = 0x03,
    Existing = 0x04,
    /// Leaves inclusion mode
    Stop = 0x05,
    /// Leaves inclusion mode without a callback
    StopFailed = 0x06,
}

/// Status codes the module reports while inclusion runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum AddNodeStatus {
    LearnReady = 0x01,
    NodeFound = 0x02,
    AddingSlave = 0x03,
    AddingController = 0x04,
    ProtocolDone = 0x05,
    Done = 0x06,
    Failed = 0x07,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddNodeToNetworkRequest {
    pub mode: AddNodeMode,
    pub high_power: bool,
    pub network_wide: bool,
    pub callback_id: Option<u8>,
}

impl AddNodeToNetworkRequest {
    pub fn new(mode: AddNodeMode) -> Self {
        Self {
            mode,
            high_power: true,
            network_wide: true,
            callback_id: None,
        }
    }

    pub fn stop() -> Self {
        Self {
            mode: AddNodeMode::Stop,
            high_power: false,
            network_wide: false,
            callback_id: None,
        }
    }
}

impl CommandId for AddNodeToNetworkRequest {
    fn command_type(&self) -> CommandType {
        CommandType::Request
    }

    fn function(&self) -> u8 {
        FunctionType::AddNodeToNetwork as u8
    }
}

impl CommandBase for AddNodeToNetworkRequest {
    fn callback_id(&self) -> Option<u8> {
        self.callback_id
    }
}

impl CommandRequest for AddNodeToNetworkRequest {
    // No response; progress arrives via a series of callbacks
    fn expects_callback(&self) -> bool {
        !matches!(self.mode, AddNodeMode::StopFailed)
    }

    fn needs_callback_id(&self) -> bool {
        self.expects_callback()
    }

    fn set_callback_id(&mut self, callback_id: Option<u8>) {
        self.callback_id = callback_id;
    }
}

impl Serializable for AddNodeToNetworkRequest {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        use cf::{bytes::be_u8, sequence::tuple};

        let mut mode = self.mode as u8;
        if self.high_power {
            mode |= OPTION_HIGH_POWER;
        }
        if self.network_wide {
            mode |= OPTION_NETWORK_WIDE;
        }

        move |out| tuple((be_u8(mode), be_u8(self.callback_id.unwrap_or(0))))(out)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddNodeToNetworkCallback {
    pub callback_id: u8,
    pub status: AddNodeStatus,
    pub node_id: NodeId,
    /// Present in the AddingSlave/AddingController stages
    pub node_info: Option<NifData>,
}

impl CommandId for AddNodeToNetworkCallback {
    fn command_type(&self) -> CommandType {
        CommandType::Request
    }

    fn function(&self) -> u8 {
        FunctionType::AddNodeToNetwork as u8
    }
}

impl CommandBase for AddNodeToNetworkCallback {
    fn is_ok(&self) -> bool {
        self.status != AddNodeStatus::Failed
    }

    fn callback_id(&self) -> Option<u8> {
        Some(self.callback_id)
    }
}

impl Parsable for AddNodeToNetworkCallback {
    fn parse(i: Input) -> ParseResult<Self> {
        let (i, callback_id) = context("AddNodeToNetwork callback", be_u8)(i)?;
        let (i, status) = map_res(be_u8, AddNodeStatus::try_from)(i)?;
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

impl Serializable for AddNodeToNetworkCallback {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        use cf::{bytes::be_u8, combinator::slice, sequence::tuple};

        let nif_body: Vec<u8> = match &self.node_info {
            Some(nif) => {
                let mut body = vec![nif.basic, nif.generic, nif.specific];
                body.extend_from_slice(&nif.supported_command_classes);
                if !nif.controlled_command_classes.is_empty() {
                    body.push(COMMAND_CLASS_MARK);
                    body.extend_from_slice(&nif.controlled_command_classes);
                }
                body
            }
            None => Vec::new(),
        };

        move |out| {
            tuple((
                be_u8(self.callback_id),
                be_u8(self.status as u8),
                self.node_id.serialize(),
                be_u8(nif_body.len() as u8),
                slice(&nif_body),
            ))(out)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use zw_core::encoding::IntoEncodingResult;

    #[test]
    fn test_callback_roundtrip() {
        let callback = AddNodeToNetworkCallback {
            callback_id: 0x0b,
            status: AddNodeStatus::AddingSlave,
            node_id: NodeId::new(9),
            node_info: Some(NifData {
                basic: 0x04,
                generic: 0x10,
                specific: 0x01,
                supported_command_classes: vec![0x25, 0x86],
                controlled_command_classes: vec![0x20],
            }),
        };
        let bytes = serialize_to_vec(&callback).unwrap();
        let parsed = AddNodeToNetworkCallback::parse(&bytes)
            .into_encoding_result()
            .unwrap();
        assert_eq!(parsed, callback);
    }

    #[test]
    fn test_callback_without_nif() {
        // cb id 0x0b, LearnReady, no node, empty body
        let payload = hex::decode("0b010000").unwrap();
        let parsed = AddNodeToNetworkCallback::parse(&payload)
            .into_encoding_result()
            .unwrap();
        assert_eq!(parsed.status, AddNodeStatus::LearnReady);
        assert_eq!(parsed.node_info, None);
    }
}
