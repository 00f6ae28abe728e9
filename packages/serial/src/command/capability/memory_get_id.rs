use crate::command::{CommandBase, CommandId, CommandRequest};
use cookie_factory as cf;
use nom::{error::context, number::complete::be_u32};
use zw_core::encoding::encoders::empty;
use zw_core::parse::{Input, Parsable, ParseResult};
use zw_core::prelude::*;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct MemoryGetIdRequest {}

impl CommandId for MemoryGetIdRequest {
    fn command_type(&self) -> CommandType {
        CommandType::Request
    }

    fn function(&self) -> u8 {
        FunctionType::MemoryGetId as u8
    }
}

impl CommandBase for MemoryGetIdRequest {}

impl CommandRequest for MemoryGetIdRequest {
    fn expects_response(&self) -> bool {
        true
    }
}

impl Serializable for MemoryGetIdRequest {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        empty()
    }
}

/// Reports the network's home id and the controller's own node id
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryGetIdResponse {
    pub home_id: HomeId,
    pub own_node_id: NodeId,
}

impl CommandId for MemoryGetIdResponse {
    fn command_type(&self) -> CommandType {
        CommandType::Response
    }

    fn function(&self) -> u8 {
        FunctionType::MemoryGetId as u8
    }
}

impl CommandBase for MemoryGetIdResponse {}

impl Parsable for MemoryGetIdResponse {
    fn parse(i: Input) -> ParseResult<Self> {
        let (i, home_id) = context("MemoryGetId", be_u32)(i)?;
        let (i, own_node_id) = NodeId::parse(i)?;
        Ok((
            i,
            Self {
                home_id: HomeId::new(home_id),
                own_node_id,
            },
        ))
    }
}

impl Serializable for MemoryGetIdResponse {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        use cf::{bytes::be_u32, sequence::tuple};
        move |out| {
            tuple((
                be_u32(u32::from(self.home_id)),
                self.own_node_id.serialize(),
            ))(out)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use zw_core::encoding::IntoEncodingResult;

    #[test]
    fn test_roundtrip() {
        let response = MemoryGetIdResponse {
            home_id: HomeId::new(0xcafe_babe),
            own_node_id: NodeId::new(1),
        };
        let bytes = serialize_to_vec(&response).unwrap();
        assert_eq!(bytes, hex::decode("cafebabe01").unwrap());
        let parsed = MemoryGetIdResponse::parse(&bytes)
            .into_encoding_result()
            .unwrap();
        assert_eq!(parsed, response);
    }
}
