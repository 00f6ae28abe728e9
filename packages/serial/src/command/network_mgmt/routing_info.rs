use crate::command::{CommandBase, CommandId, CommandRequest, wire};
use cookie_factory as cf;
use nom::error::context;
use zw_core::parse::{Input, Parsable, ParseResult};
use zw_core::prelude::*;

const ROUTING_BITMASK_LENGTH: usize = 29;

/// Reads the controller's routing table row for a node: the set of nodes
/// it can reach directly.
#[derive(Debug, Clone, PartialEq)]
pub struct GetRoutingInfoRequest {
    pub node_id: NodeId,
    pub remove_bad: bool,
    pub remove_non_repeaters: bool,
}

impl GetRoutingInfoRequest {
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            remove_bad: false,
            remove_non_repeaters: false,
        }
    }
}

impl CommandId for GetRoutingInfoRequest {
    fn command_type(&self) -> CommandType {
        CommandType::Request
    }

    fn function(&self) -> u8 {
        FunctionType::GetRoutingInfo as u8
    }
}

impl CommandBase for GetRoutingInfoRequest {}

impl CommandRequest for GetRoutingInfoRequest {
    fn expects_response(&self) -> bool {
        true
    }
}

impl Serializable for GetRoutingInfoRequest {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        use cf::{bytes::be_u8, sequence::tuple};
        move |out| {
            tuple((
                self.node_id.serialize(),
                be_u8(self.remove_bad as u8),
                be_u8(self.remove_non_repeaters as u8),
                // func id, unused
                be_u8(0),
            ))(out)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetRoutingInfoResponse {
    pub neighbors: Vec<NodeId>,
}

impl CommandId for GetRoutingInfoResponse {
    fn command_type(&self) -> CommandType {
        CommandType::Response
    }

    fn function(&self) -> u8 {
        FunctionType::GetRoutingInfo as u8
    }
}

impl CommandBase for GetRoutingInfoResponse {}

impl Parsable for GetRoutingInfoResponse {
    fn parse(i: Input) -> ParseResult<Self> {
        let (i, neighbors) = context("GetRoutingInfo", |i| {
            wire::node_bitmask(i, ROUTING_BITMASK_LENGTH)
        })(i)?;
        Ok((i, Self { neighbors }))
    }
}

impl Serializable for GetRoutingInfoResponse {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        let mut bitmask = [0u8; ROUTING_BITMASK_LENGTH];
        for node_id in &self.neighbors {
            let bit = u8::from(*node_id) as usize - 1;
            bitmask[bit / 8] |= 1 << (bit % 8);
        }
        cf::combinator::slice(bitmask.to_vec())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use zw_core::encoding::IntoEncodingResult;

    #[test]
    fn test_roundtrip() {
        let response = GetRoutingInfoResponse {
            neighbors: vec![NodeId::new(2), NodeId::new(7), NodeId::new(200)],
        };
        let bytes = serialize_to_vec(&response).unwrap();
        assert_eq!(bytes.len(), ROUTING_BITMASK_LENGTH);
        let parsed = GetRoutingInfoResponse::parse(&bytes)
            .into_encoding_result()
            .unwrap();
        assert_eq!(parsed, response);
    }
}
