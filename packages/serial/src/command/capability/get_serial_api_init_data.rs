use crate::command::{CommandBase, CommandId, CommandRequest, wire};
use cookie_factory as cf;
use nom::{error::context, number::complete::be_u8};
use zw_core::encoding::encoders::empty;
use zw_core::parse::{Input, Parsable, ParseResult, validate};
use zw_core::prelude::*;

const NODE_BITMASK_LENGTH: usize = 29;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct GetSerialApiInitDataRequest {}

impl CommandId for GetSerialApiInitDataRequest {
    fn command_type(&self) -> CommandType {
        CommandType::Request
    }

    fn function(&self) -> u8 {
        FunctionType::GetSerialApiInitData as u8
    }
}

impl CommandBase for GetSerialApiInitDataRequest {}

impl CommandRequest for GetSerialApiInitDataRequest {
    fn expects_response(&self) -> bool {
        true
    }
}

impl Serializable for GetSerialApiInitDataRequest {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        empty()
    }
}

/// Reports the serial API version, the controller's role and the set of
/// nodes stored in the module.
#[derive(Debug, Clone, PartialEq)]
pub struct GetSerialApiInitDataResponse {
    pub api_version: u8,
    pub is_secondary: bool,
    pub is_suc: bool,
    pub node_ids: Vec<NodeId>,
    pub chip_type: u8,
    pub chip_version: u8,
}

impl CommandId for GetSerialApiInitDataResponse {
    fn command_type(&self) -> CommandType {
        CommandType::Response
    }

    fn function(&self) -> u8 {
        FunctionType::GetSerialApiInitData as u8
    }
}

impl CommandBase for GetSerialApiInitDataResponse {}

impl Parsable for GetSerialApiInitDataResponse {
    fn parse(i: Input) -> ParseResult<Self> {
        let (i, api_version) = context("GetSerialApiInitData", be_u8)(i)?;
        let (i, capabilities) = be_u8(i)?;
        let (i, bitmask_len) = be_u8(i)?;
        let (i, _) = validate(
            i,
            bitmask_len as usize == NODE_BITMASK_LENGTH,
            format!("unexpected node bitmask length {}", bitmask_len),
        )?;
        let (i, node_ids) = wire::node_bitmask(i, NODE_BITMASK_LENGTH)?;
        let (i, chip_type) = be_u8(i)?;
        let (i, chip_version) = be_u8(i)?;

        Ok((
            i,
            Self {
                api_version,
                is_secondary: capabilities & 0x04 != 0,
                is_suc: capabilities & 0x08 != 0,
                node_ids,
                chip_type,
                chip_version,
            },
        ))
    }
}

impl Serializable for GetSerialApiInitDataResponse {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        use cf::{bytes::be_u8, combinator::slice, sequence::tuple};

        let mut capabilities = 0u8;
        if self.is_secondary {
            capabilities |= 0x04;
        }
        if self.is_suc {
            capabilities |= 0x08;
        }

        let mut bitmask = [0u8; NODE_BITMASK_LENGTH];
        for node_id in &self.node_ids {
            let bit = u8::from(*node_id) as usize - 1;
            bitmask[bit / 8] |= 1 << (bit % 8);
        }

        move |out| {
            tuple((
                be_u8(self.api_version),
                be_u8(capabilities),
                be_u8(NODE_BITMASK_LENGTH as u8),
                slice(bitmask),
                be_u8(self.chip_type),
                be_u8(self.chip_version),
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
        let response = GetSerialApiInitDataResponse {
            api_version: 5,
            is_secondary: false,
            is_suc: true,
            node_ids: vec![NodeId::new(1), NodeId::new(5), NodeId::new(9)],
            chip_type: 5,
            chip_version: 0,
        };
        let bytes = serialize_to_vec(&response).unwrap();
        let parsed = GetSerialApiInitDataResponse::parse(&bytes)
            .into_encoding_result()
            .unwrap();
        assert_eq!(parsed, response);
    }

    #[test]
    fn test_node_bitmask_decoding() {
        // Node 1 = bit 0 of the first byte, node 9 = bit 0 of the second
        let mut payload = vec![0x05, 0x00, 29];
        let mut mask = [0u8; 29];
        mask[0] = 0b0000_0001;
        mask[1] = 0b0000_0001;
        payload.extend_from_slice(&mask);
        payload.extend_from_slice(&[5, 0]);

        let parsed = GetSerialApiInitDataResponse::parse(&payload)
            .into_encoding_result()
            .unwrap();
        assert_eq!(parsed.node_ids, vec![NodeId::new(1), NodeId::new(9)]);
    }
}
