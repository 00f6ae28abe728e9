use crate::frame::{RawSerialFrame, SerialControlByte};
use cookie_factory as cf;
use nom::{
    bytes::complete::{tag, take},
    combinator::peek,
    error::context,
    number::complete::be_u8,
    sequence::tuple,
};
use std::fmt::Debug;
use zw_core::checksum::xor_sum;
use zw_core::parse::{Input, Parsable, ParseResult, validate};
use zw_core::prelude::*;

/// A decoded data frame: SOF | LEN | TYPE | FUNC | payload... | CKSUM, with
/// the checksum already verified. The function id is kept raw so frames
/// with unknown ids survive decoding.
#[derive(Clone, PartialEq)]
pub struct CommandRaw {
    pub command_type: CommandType,
    pub function: u8,
    pub payload: Vec<u8>,
    pub checksum: u8,
}

impl Debug for CommandRaw {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRaw")
            .field("command_type", &self.command_type)
            .field("function", &format_args!("{:#04x}", &self.function))
            .field("payload", &format_args!("0x{}", hex::encode(&self.payload)))
            .field("checksum", &format_args!("{:#04x}", &self.checksum))
            .finish()
    }
}

fn command_checksum(cmd_buffer: &[u8]) -> u8 {
    xor_sum(&cmd_buffer[1..cmd_buffer.len() - 1])
}

impl CommandRaw {
    pub fn new(command_type: CommandType, function: u8, payload: Vec<u8>) -> Self {
        Self {
            command_type,
            function,
            payload,
            checksum: 0,
        }
    }

    pub fn function_type(&self) -> Option<FunctionType> {
        FunctionType::try_from(self.function).ok()
    }
}

impl Parsable for CommandRaw {
    fn parse(i: Input) -> ParseResult<Self> {
        // Ensure the buffer contains a full frame and remember it for the checksum
        peek(take(5usize))(i)?;
        let (_, (_, len)) = peek(tuple((tag([SerialControlByte::SOF as u8]), be_u8)))(i)?;
        let (_, raw_data) = peek(take(len + 2))(i)?;
        let raw_data = raw_data.to_vec();

        // Skip the SOF and length bytes
        let (i, _) = take(2usize)(i)?;

        let (i, command_type) = CommandType::parse(i)?;
        let (i, function) = context("function id", be_u8)(i)?;
        let (i, payload) = take(len - 3)(i)?;
        let (i, checksum) = be_u8(i)?;

        let expected_checksum = command_checksum(&raw_data);
        let (i, _) = validate(
            i,
            checksum == expected_checksum,
            format!(
                "checksum mismatch: expected {:#04x}, got {:#04x}",
                expected_checksum, checksum
            ),
        )?;

        Ok((
            i,
            Self {
                command_type,
                function,
                payload: payload.to_vec(),
                checksum,
            },
        ))
    }
}

impl Serializable for CommandRaw {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        use cf::{bytes::be_u8, combinator::slice, sequence::tuple};

        move |out| {
            // Serialize with a placeholder checksum first, then patch it in
            let buf = cf::gen_simple(
                tuple((
                    be_u8(SerialControlByte::SOF as u8),
                    be_u8(self.payload.len() as u8 + 3),
                    self.command_type.serialize(),
                    be_u8(self.function),
                    slice(&self.payload),
                    be_u8(0),
                )),
                Vec::new(),
            )?;

            let mut buf = buf;
            let len = buf.len();
            buf[len - 1] = command_checksum(&buf);

            slice(buf)(out)
        }
    }
}

impl From<CommandRaw> for RawSerialFrame {
    fn from(val: CommandRaw) -> Self {
        // The serializer writing into a Vec cannot fail
        let data = serialize_to_vec(&val).expect("serializing a command frame cannot fail");
        RawSerialFrame::Data(data)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use zw_core::encoding::IntoEncodingResult;

    #[test]
    fn test_parse() {
        // GetSerialApiInitData request with a correct checksum
        let input = hex::decode("01030002fe").unwrap();
        let cmd = CommandRaw::parse(&input).into_encoding_result().unwrap();
        assert_eq!(cmd.command_type, CommandType::Request);
        assert_eq!(cmd.function_type(), Some(FunctionType::GetSerialApiInitData));
        assert!(cmd.payload.is_empty());
        assert_eq!(cmd.checksum, 0xfe);
    }

    #[test]
    fn test_parse_invalid_checksum() {
        let input = hex::decode("01030002ff").unwrap();
        let result = CommandRaw::parse(&input).into_encoding_result();
        match result {
            Err(EncodingError::Parse(Some(reason))) => {
                assert!(reason.contains("checksum mismatch"))
            }
            other => panic!("expected a checksum error, got {:?}", other),
        }
    }

    #[test]
    fn test_serialize() {
        let cmd = CommandRaw::new(
            CommandType::Request,
            FunctionType::GetSerialApiInitData as u8,
            vec![],
        );
        let expected = hex::decode("01030002fe").unwrap();
        assert_eq!(serialize_to_vec(&cmd).unwrap(), expected);
    }

    #[test]
    fn test_roundtrip() {
        let cmd = CommandRaw::new(
            CommandType::Request,
            FunctionType::SendData as u8,
            hex::decode("05022502250a").unwrap(),
        );
        let bytes = serialize_to_vec(&cmd).unwrap();
        let parsed = CommandRaw::parse(&bytes).into_encoding_result().unwrap();
        assert_eq!(parsed.command_type, cmd.command_type);
        assert_eq!(parsed.function, cmd.function);
        assert_eq!(parsed.payload, cmd.payload);
    }
}
