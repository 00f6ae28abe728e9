use crate::command::{CommandBase, CommandId, CommandRequest};
use cookie_factory as cf;
use zw_core::parse::{Input, Parsable, ParseResult};
use zw_core::prelude::*;

#[derive(Debug, Clone, PartialEq)]
pub struct GetNodeProtocolInfoRequest {
    pub node_id: NodeId,
}

impl CommandId for GetNodeProtocolInfoRequest {
    fn command_type(&self) -> CommandType {
        CommandType::Request
    }

    fn function(&self) -> u8 {
        FunctionType::GetNodeProtocolInfo as u8
    }
}

impl CommandBase for GetNodeProtocolInfoRequest {}

impl CommandRequest for GetNodeProtocolInfoRequest {
    fn expects_response(&self) -> bool {
        true
    }
}

impl Serializable for GetNodeProtocolInfoRequest {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        self.node_id.serialize()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetNodeProtocolInfoResponse {
    pub protocol_info: NodeProtocolInfo,
}

impl CommandId for GetNodeProtocolInfoResponse {
    fn command_type(&self) -> CommandType {
        CommandType::Response
    }

    fn function(&self) -> u8 {
        FunctionType::GetNodeProtocolInfo as u8
    }
}

impl CommandBase for GetNodeProtocolInfoResponse {}

impl Parsable for GetNodeProtocolInfoResponse {
    fn parse(i: Input) -> ParseResult<Self> {
        let (i, protocol_info) = NodeProtocolInfo::parse(i)?;
        Ok((i, Self { protocol_info }))
    }
}

impl Serializable for GetNodeProtocolInfoResponse {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        use cf::{bytes::be_u8, sequence::tuple};

        let info = &self.protocol_info;
        let mut capability = (info.version - 1) & 0x07;
        if info.listening {
            capability |= 0x80;
        }
        if info.routing {
            capability |= 0x40;
        }
        if info.max_baud_rate == 40_000 {
            capability |= 0x10;
        }
        let mut security_flags = 0u8;
        if info.security {
            security_flags |= 0x01;
        }
        if info.beaming {
            security_flags |= 0x10;
        }

        move |out| {
            tuple((
                be_u8(capability),
                be_u8(security_flags),
                be_u8(0),
                be_u8(info.device_classes.basic),
                be_u8(info.device_classes.generic),
                be_u8(info.device_classes.specific),
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
        let response = GetNodeProtocolInfoResponse {
            protocol_info: NodeProtocolInfo {
                listening: true,
                routing: true,
                max_baud_rate: 40_000,
                version: 4,
                security: false,
                beaming: true,
                device_classes: DeviceClasses {
                    basic: 0x04,
                    generic: 0x10,
                    specific: 0x01,
                },
            },
        };
        let bytes = serialize_to_vec(&response).unwrap();
        let parsed = GetNodeProtocolInfoResponse::parse(&bytes)
            .into_encoding_result()
            .unwrap();
        assert_eq!(parsed, response);
    }
}
