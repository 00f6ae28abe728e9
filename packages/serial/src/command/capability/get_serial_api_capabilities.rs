use crate::command::{CommandBase, CommandId, CommandRequest, wire};
use cookie_factory as cf;
use nom::{error::context, number::complete::{be_u8, be_u16}};
use zw_core::encoding::encoders::empty;
use zw_core::parse::{Input, Parsable, ParseResult};
use zw_core::prelude::*;

const FUNCTION_BITMASK_LENGTH: usize = 32;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct GetSerialApiCapabilitiesRequest {}

impl CommandId for GetSerialApiCapabilitiesRequest {
    fn command_type(&self) -> CommandType {
        CommandType::Request
    }

    fn function(&self) -> u8 {
        FunctionType::GetSerialApiCapabilities as u8
    }
}

impl CommandBase for GetSerialApiCapabilitiesRequest {}

impl CommandRequest for GetSerialApiCapabilitiesRequest {
    fn expects_response(&self) -> bool {
        true
    }
}

impl Serializable for GetSerialApiCapabilitiesRequest {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetSerialApiCapabilitiesResponse {
    pub serial_api_version: String,
    pub manufacturer_id: u16,
    pub product_type: u16,
    pub product_id: u16,
    /// The function ids the module supports, decoded from the 256-bit mask
    pub supported_functions: Vec<u8>,
}

impl CommandId for GetSerialApiCapabilitiesResponse {
    fn command_type(&self) -> CommandType {
        CommandType::Response
    }

    fn function(&self) -> u8 {
        FunctionType::GetSerialApiCapabilities as u8
    }
}

impl CommandBase for GetSerialApiCapabilitiesResponse {}

impl Parsable for GetSerialApiCapabilitiesResponse {
    fn parse(i: Input) -> ParseResult<Self> {
        let (i, version_major) = context("GetSerialApiCapabilities", be_u8)(i)?;
        let (i, version_minor) = be_u8(i)?;
        let (i, manufacturer_id) = be_u16(i)?;
        let (i, product_type) = be_u16(i)?;
        let (i, product_id) = be_u16(i)?;
        let (i, functions) = wire::node_bitmask(i, FUNCTION_BITMASK_LENGTH)?;

        Ok((
            i,
            Self {
                serial_api_version: format!("{}.{}", version_major, version_minor),
                manufacturer_id,
                product_type,
                product_id,
                // The bitmask is 1-based like the node bitmask
                supported_functions: functions.into_iter().map(u8::from).collect(),
            },
        ))
    }
}

impl Serializable for GetSerialApiCapabilitiesResponse {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        use cf::{bytes::be_u8, bytes::be_u16, combinator::slice, sequence::tuple};

        let (major, minor) = self
            .serial_api_version
            .split_once('.')
            .map(|(maj, min)| {
                (
                    maj.parse::<u8>().unwrap_or_default(),
                    min.parse::<u8>().unwrap_or_default(),
                )
            })
            .unwrap_or_default();

        let mut bitmask = [0u8; FUNCTION_BITMASK_LENGTH];
        for function in &self.supported_functions {
            let bit = *function as usize - 1;
            bitmask[bit / 8] |= 1 << (bit % 8);
        }

        move |out| {
            tuple((
                be_u8(major),
                be_u8(minor),
                be_u16(self.manufacturer_id),
                be_u16(self.product_type),
                be_u16(self.product_id),
                slice(bitmask),
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
        let response = GetSerialApiCapabilitiesResponse {
            serial_api_version: "1.2".into(),
            manufacturer_id: 0x0086,
            product_type: 0x0001,
            product_id: 0x005a,
            supported_functions: vec![0x02, 0x04, 0x13, 0x20],
        };
        let bytes = serialize_to_vec(&response).unwrap();
        let parsed = GetSerialApiCapabilitiesResponse::parse(&bytes)
            .into_encoding_result()
            .unwrap();
        assert_eq!(parsed, response);
    }
}
