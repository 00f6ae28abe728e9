use crate::command::{CommandBase, CommandId, NifData, wire};
use cookie_factory as cf;
use nom::error::context;
use zw_core::parse::{Input, Parsable, ParseResult};
use zw_core::prelude::*;

/// Notifies the host about protocol-level node events, most importantly
/// the arrival of a node information frame after `RequestNodeInfo`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationUpdateRequest {
    pub state: UpdateState,
    pub node_id: NodeId,
    /// Present when the state is NodeInfoReceived
    pub node_info: Option<NifData>,
}

impl CommandId for ApplicationUpdateRequest {
    fn command_type(&self) -> CommandType {
        CommandType::Request
    }

    fn function(&self) -> u8 {
        FunctionType::ApplicationUpdate as u8
    }
}

impl CommandBase for ApplicationUpdateRequest {
    fn is_ok(&self) -> bool {
        self.state != UpdateState::NodeInfoReqFailed
    }
}

impl Parsable for ApplicationUpdateRequest {
    fn parse(i: Input) -> ParseResult<Self> {
        let (i, state) = context("ApplicationUpdate", UpdateState::parse)(i)?;
        let (i, node_id) = NodeId::parse(i)?;
        let (i, node_info) = wire::node_info_body(i)?;

        Ok((
            i,
            Self {
                state,
                node_id,
                node_info,
            },
        ))
    }
}

impl Serializable for ApplicationUpdateRequest {
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
                be_u8(self.state as u8),
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
    fn test_nif_roundtrip() {
        let update = ApplicationUpdateRequest {
            state: UpdateState::NodeInfoReceived,
            node_id: NodeId::new(7),
            node_info: Some(NifData {
                basic: 0x04,
                generic: 0x21,
                specific: 0x01,
                supported_command_classes: vec![0x31, 0x84, 0x86, 0x72],
                controlled_command_classes: vec![],
            }),
        };
        let bytes = serialize_to_vec(&update).unwrap();
        let parsed = ApplicationUpdateRequest::parse(&bytes)
            .into_encoding_result()
            .unwrap();
        assert_eq!(parsed, update);
    }

    #[test]
    fn test_nif_with_mark() {
        // supported: 0x25, 0x86 / controlled: 0x20
        let payload = hex::decode("840707041001 2586ef20".replace(' ', "")).unwrap();
        let parsed = ApplicationUpdateRequest::parse(&payload)
            .into_encoding_result()
            .unwrap();
        let nif = parsed.node_info.unwrap();
        assert_eq!(nif.supported_command_classes, vec![0x25, 0x86]);
        assert_eq!(nif.controlled_command_classes, vec![0x20]);
    }

    #[test]
    fn test_request_failed_has_no_nif() {
        let payload = hex::decode("810000").unwrap();
        let parsed = ApplicationUpdateRequest::parse(&payload)
            .into_encoding_result()
            .unwrap();
        assert_eq!(parsed.state, UpdateState::NodeInfoReqFailed);
        assert_eq!(parsed.node_info, None);
    }
}
