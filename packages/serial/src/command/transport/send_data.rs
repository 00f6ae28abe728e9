use crate::command::{CommandBase, CommandId, CommandRequest};
use cookie_factory as cf;
use nom::{
    bytes::complete::take,
    error::context,
    number::complete::be_u8,
};
use zw_core::encoding::encoders::empty;
use zw_core::parse::{Input, Parsable, ParseResult};
use zw_core::prelude::*;

/// Sends an application payload (a serialized command class) to a node.
/// The response confirms the module queued the frame; the callback reports
/// the delivery result from the radio.
#[derive(Debug, Clone, PartialEq)]
pub struct SendDataRequest {
    pub node_id: NodeId,
    pub payload: Vec<u8>,
    pub transmit_options: TransmitOptions,
    pub callback_id: Option<u8>,
}

impl SendDataRequest {
    pub fn new(node_id: NodeId, payload: Vec<u8>) -> Self {
        let transmit_options = if node_id.is_broadcast() {
            TransmitOptions::default_for_broadcast()
        } else {
            TransmitOptions::default_for_singlecast()
        };
        Self {
            node_id,
            payload,
            transmit_options,
            callback_id: None,
        }
    }
}

impl CommandId for SendDataRequest {
    fn command_type(&self) -> CommandType {
        CommandType::Request
    }

    fn function(&self) -> u8 {
        FunctionType::SendData as u8
    }
}

impl CommandBase for SendDataRequest {
    fn callback_id(&self) -> Option<u8> {
        self.callback_id
    }
}

impl CommandRequest for SendDataRequest {
    fn expects_response(&self) -> bool {
        true
    }

    fn expects_callback(&self) -> bool {
        // Broadcasts are not acknowledged, so no delivery callback either
        !self.node_id.is_broadcast()
    }

    fn needs_callback_id(&self) -> bool {
        self.expects_callback()
    }

    fn set_callback_id(&mut self, callback_id: Option<u8>) {
        self.callback_id = callback_id;
    }
}

impl Serializable for SendDataRequest {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        use cf::{bytes::be_u8, combinator::slice, sequence::tuple};
        move |out| {
            tuple((
                self.node_id.serialize(),
                be_u8(self.payload.len() as u8),
                slice(&self.payload),
                self.transmit_options.serialize(),
                be_u8(self.callback_id.unwrap_or(0)),
            ))(out)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SendDataResponse {
    /// Whether the module accepted the frame into its transmit queue
    pub accepted: bool,
}

impl CommandId for SendDataResponse {
    fn command_type(&self) -> CommandType {
        CommandType::Response
    }

    fn function(&self) -> u8 {
        FunctionType::SendData as u8
    }
}

impl CommandBase for SendDataResponse {
    fn is_ok(&self) -> bool {
        self.accepted
    }
}

impl Parsable for SendDataResponse {
    fn parse(i: Input) -> ParseResult<Self> {
        let (i, accepted) = context("SendData response", be_u8)(i)?;
        Ok((
            i,
            Self {
                accepted: accepted != 0,
            },
        ))
    }
}

impl Serializable for SendDataResponse {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        cf::bytes::be_u8(self.accepted as u8)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SendDataCallback {
    pub callback_id: u8,
    pub transmit_status: TransmitStatus,
}

impl CommandId for SendDataCallback {
    fn command_type(&self) -> CommandType {
        CommandType::Request
    }

    fn function(&self) -> u8 {
        FunctionType::SendData as u8
    }
}

impl CommandBase for SendDataCallback {
    fn is_ok(&self) -> bool {
        self.transmit_status.is_ok()
    }

    fn callback_id(&self) -> Option<u8> {
        Some(self.callback_id)
    }
}

impl Parsable for SendDataCallback {
    fn parse(i: Input) -> ParseResult<Self> {
        let (i, callback_id) = context("SendData callback", be_u8)(i)?;
        let (i, transmit_status) = TransmitStatus::parse(i)?;
        // Newer modules append transmit statistics; not interpreted here
        let (i, _) = take(i.len())(i)?;
        Ok((
            i,
            Self {
                callback_id,
                transmit_status,
            },
        ))
    }
}

impl Serializable for SendDataCallback {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        use cf::{bytes::be_u8, sequence::tuple};
        move |out| {
            tuple((
                be_u8(self.callback_id),
                be_u8(self.transmit_status as u8),
            ))(out)
        }
    }
}

/// Aborts an in-flight `SendData`, e.g. after a response timeout
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SendDataAbortRequest {}

impl CommandId for SendDataAbortRequest {
    fn command_type(&self) -> CommandType {
        CommandType::Request
    }

    fn function(&self) -> u8 {
        FunctionType::SendDataAbort as u8
    }
}

impl CommandBase for SendDataAbortRequest {}

impl CommandRequest for SendDataAbortRequest {}

impl Serializable for SendDataAbortRequest {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::command::{Command, CommandRequest};
    use zw_core::encoding::IntoEncodingResult;

    #[test]
    fn test_serialize_request() {
        // The SendData frame from the poll scenario:
        // node 5, payload 31 04 (SensorMultilevel Get), tx options 0x25, cb 0x0a
        let mut request = SendDataRequest::new(NodeId::new(5), vec![0x31, 0x04]);
        request.transmit_options = TransmitOptions::new(0x25);
        request.set_callback_id(Some(0x0a));

        let payload = serialize_to_vec(&request).unwrap();
        assert_eq!(payload, hex::decode("05023104250a").unwrap());
    }

    #[test]
    fn test_callback_matching() {
        let mut request = SendDataRequest::new(NodeId::new(5), vec![0x31, 0x04]);
        request.set_callback_id(Some(0x0a));

        let matching: Command = SendDataCallback {
            callback_id: 0x0a,
            transmit_status: TransmitStatus::Ok,
        }
        .into();
        let wrong_id: Command = SendDataCallback {
            callback_id: 0x0b,
            transmit_status: TransmitStatus::Ok,
        }
        .into();

        assert!(request.test_callback(&matching));
        assert!(!request.test_callback(&wrong_id));
    }

    #[test]
    fn test_broadcast_expects_no_callback() {
        let request = SendDataRequest::new(NodeId::broadcast(), vec![0x20, 0x01, 0xff]);
        assert!(!request.expects_callback());
        assert!(!request.needs_callback_id());
        assert_eq!(
            request.transmit_options,
            TransmitOptions::default_for_broadcast()
        );
    }

    #[test]
    fn test_callback_parse_with_stats() {
        // Status byte followed by transmit statistics, which are skipped
        let payload = hex::decode("0a000002c07f7f7f7f").unwrap();
        let parsed = SendDataCallback::parse(&payload)
            .into_encoding_result()
            .unwrap();
        assert_eq!(parsed.callback_id, 0x0a);
        assert_eq!(parsed.transmit_status, TransmitStatus::Ok);
    }
}
