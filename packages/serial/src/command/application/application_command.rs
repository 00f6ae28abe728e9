use crate::command::{CommandBase, CommandId};
use cookie_factory as cf;
use nom::{bytes::complete::take, error::context, number::complete::be_u8};
use zw_core::parse::{Input, Parsable, ParseResult, validate};
use zw_core::prelude::*;

/// An unsolicited application frame from another node: the carrier for
/// every inbound command class. The first payload byte is the class id,
/// the second the command within the class.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationCommandRequest {
    pub rx_status: u8,
    pub source_node_id: NodeId,
    pub cc_bytes: Vec<u8>,
}

impl ApplicationCommandRequest {
    /// Whether the frame was addressed to every node at once
    pub fn is_broadcast(&self) -> bool {
        // RECEIVE_STATUS_TYPE_BROAD
        self.rx_status & 0x04 != 0
    }
}

impl CommandId for ApplicationCommandRequest {
    fn command_type(&self) -> CommandType {
        CommandType::Request
    }

    fn function(&self) -> u8 {
        FunctionType::ApplicationCommand as u8
    }
}

impl CommandBase for ApplicationCommandRequest {}

impl Parsable for ApplicationCommandRequest {
    fn parse(i: Input) -> ParseResult<Self> {
        let (i, rx_status) = context("ApplicationCommand", be_u8)(i)?;
        let (i, source_node_id) = NodeId::parse(i)?;
        let (i, cc_len) = be_u8(i)?;
        let (i, _) = validate(
            i,
            cc_len as usize <= i.len(),
            format!("command length {} exceeds frame", cc_len),
        )?;
        let (i, cc_bytes) = take(cc_len)(i)?;

        Ok((
            i,
            Self {
                rx_status,
                source_node_id,
                cc_bytes: cc_bytes.to_vec(),
            },
        ))
    }
}

impl Serializable for ApplicationCommandRequest {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        use cf::{bytes::be_u8, combinator::slice, sequence::tuple};
        move |out| {
            tuple((
                be_u8(self.rx_status),
                self.source_node_id.serialize(),
                be_u8(self.cc_bytes.len() as u8),
                slice(&self.cc_bytes),
            ))(out)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use zw_core::encoding::IntoEncodingResult;

    #[test]
    fn test_parse_sensor_report() {
        // A SensorMultilevel report from node 5:
        // rx status, source node, length, then the CC bytes
        let payload = hex::decode("000506310501 2a015c".replace(' ', "")).unwrap();
        let parsed = ApplicationCommandRequest::parse(&payload)
            .into_encoding_result()
            .unwrap();
        assert_eq!(parsed.source_node_id, NodeId::new(5));
        assert_eq!(parsed.cc_bytes, hex::decode("3105012a015c").unwrap());
    }

    #[test]
    fn test_parse_truncated_cc_rejected() {
        // Declared length 10, only 3 bytes follow
        let payload = hex::decode("00050a310501").unwrap();
        assert!(
            ApplicationCommandRequest::parse(&payload)
                .into_encoding_result()
                .is_err()
        );
    }
}
