use derive_try_from_primitive::TryFromPrimitive;
use nom::{
    branch::alt,
    bytes::streaming::{tag, take, take_till1},
    combinator::{map, peek, value},
    error::context,
    number::streaming::be_u8,
    sequence::tuple,
};
use zw_core::parse::{Input, ParseResult};

pub const ACK_BUFFER: [u8; 1] = [SerialControlByte::ACK as u8];
pub const NAK_BUFFER: [u8; 1] = [SerialControlByte::NAK as u8];
pub const CAN_BUFFER: [u8; 1] = [SerialControlByte::CAN as u8];

#[derive(Debug, TryFromPrimitive)]
#[repr(u8)]
pub enum SerialControlByte {
    SOF = 0x01,
    ACK = 0x06,
    NAK = 0x15,
    CAN = 0x18,
}

/// The single-byte flow-control frames of the serial protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFlow {
    ACK = 0x06,
    NAK = 0x15,
    CAN = 0x18,
}

/// One unit read from or written to the serial port: a flow-control byte,
/// a complete SOF-delimited data frame, or bytes that belong to neither.
#[derive(Clone, Debug, PartialEq)]
pub enum RawSerialFrame {
    ControlFlow(ControlFlow),
    Data(Vec<u8>),
    Garbage(Vec<u8>),
}

fn consume_garbage(i: Input) -> ParseResult<RawSerialFrame> {
    map(
        take_till1(|b| SerialControlByte::try_from(b).is_ok()),
        |g: &[u8]| RawSerialFrame::Garbage(g.to_vec()),
    )(i)
}

fn parse_control(i: Input) -> ParseResult<RawSerialFrame> {
    alt((
        value(RawSerialFrame::ControlFlow(ControlFlow::ACK), tag(&ACK_BUFFER)),
        value(RawSerialFrame::ControlFlow(ControlFlow::NAK), tag(&NAK_BUFFER)),
        value(RawSerialFrame::ControlFlow(ControlFlow::CAN), tag(&CAN_BUFFER)),
    ))(i)
}

fn parse_data(i: Input) -> ParseResult<RawSerialFrame> {
    // Ensure that the buffer contains at least 5 bytes
    peek(take(5usize))(i)?;

    // Ensure that it starts with a SOF byte and extract the length of the rest of the frame
    let (_, (_, len)) = peek(tuple((tag([SerialControlByte::SOF as u8]), be_u8)))(i)?;

    // Take the whole frame
    let (i, data) = take(len + 2)(i)?;

    Ok((i, RawSerialFrame::Data(data.to_vec())))
}

impl RawSerialFrame {
    /// Extracts the next frame from the byte stream. Returns `Incomplete`
    /// while a data frame has not fully arrived yet; the caller keeps
    /// buffering until it has.
    pub fn parse(i: Input) -> ParseResult<Self> {
        // A serial frame is either a control byte, data starting with SOF, or skipped garbage
        context(
            "Serial Frame",
            alt((consume_garbage, parse_control, parse_data)),
        )(i)
    }
}

impl AsRef<[u8]> for RawSerialFrame {
    fn as_ref(&self) -> &[u8] {
        match &self {
            RawSerialFrame::ControlFlow(ControlFlow::ACK) => &ACK_BUFFER,
            RawSerialFrame::ControlFlow(ControlFlow::NAK) => &NAK_BUFFER,
            RawSerialFrame::ControlFlow(ControlFlow::CAN) => &CAN_BUFFER,
            RawSerialFrame::Data(data) => data,
            RawSerialFrame::Garbage(data) => data,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_garbage() {
        let data = hex::decode("07080901").unwrap();
        let expected = hex::decode("070809").unwrap();
        let remaining = hex::decode("01").unwrap();
        assert_eq!(
            consume_garbage(&data),
            Ok((remaining.as_slice(), RawSerialFrame::Garbage(expected)))
        );
    }

    #[test]
    fn test_control() {
        let data = hex::decode("0606151801").unwrap();
        let remaining = hex::decode("01").unwrap();
        assert_eq!(
            nom::multi::many0(parse_control)(&data),
            Ok((
                remaining.as_slice(),
                vec![
                    RawSerialFrame::ControlFlow(ControlFlow::ACK),
                    RawSerialFrame::ControlFlow(ControlFlow::ACK),
                    RawSerialFrame::ControlFlow(ControlFlow::NAK),
                    RawSerialFrame::ControlFlow(ControlFlow::CAN),
                ]
            )),
        );
    }

    #[test]
    fn test_data() {
        let data = hex::decode("01030008f406").unwrap();
        let expected = hex::decode("01030008f4").unwrap();
        let remaining = hex::decode("06").unwrap();
        assert_eq!(
            parse_data(&data),
            Ok((remaining.as_slice(), RawSerialFrame::Data(expected)))
        );
    }

    #[test]
    fn test_data_incomplete() {
        // A partial data frame must not be consumed
        let data = hex::decode("010300").unwrap();
        assert!(matches!(
            RawSerialFrame::parse(&data),
            Err(nom::Err::Incomplete(_))
        ));
    }

    #[test]
    fn test_many() {
        let data = hex::decode("01030008f406180000000801").unwrap();
        let expected = hex::decode("01030008f4").unwrap();
        let garbage = hex::decode("00000008").unwrap();

        let mut results: Vec<RawSerialFrame> = Vec::new();
        let mut input = data.as_slice();
        while let Ok((remaining, frame)) = RawSerialFrame::parse(input) {
            results.push(frame);
            input = remaining;
        }
        assert_eq!(input, vec![0x01]);
        assert_eq!(
            results,
            vec![
                RawSerialFrame::Data(expected),
                RawSerialFrame::ControlFlow(ControlFlow::ACK),
                RawSerialFrame::ControlFlow(ControlFlow::CAN),
                RawSerialFrame::Garbage(garbage),
            ]
        );
    }
}
