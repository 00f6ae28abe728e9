use crate::frame::RawSerialFrame;
use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Turns the serial byte stream into [RawSerialFrame]s and back. Data
/// frames are only emitted once complete; partial frames stay buffered.
pub struct SerialFrameCodec;

impl Decoder for SerialFrameCodec {
    type Item = RawSerialFrame;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> std::io::Result<Option<Self::Item>> {
        if src.is_empty() {
            return Ok(None);
        }
        match RawSerialFrame::parse(src) {
            Ok((remaining, frame)) => {
                let consumed = src.len() - remaining.len();
                src.advance(consumed);
                Ok(Some(frame))
            }
            Err(nom::Err::Incomplete(needed)) => {
                if let nom::Needed::Size(n) = needed {
                    src.reserve(n.get());
                }
                Ok(None)
            }
            Err(_) => {
                // The stream cannot fail to parse - unparseable bytes come
                // out as Garbage - but don't let a surprise stall the port
                src.advance(1);
                Ok(None)
            }
        }
    }
}

impl Encoder<RawSerialFrame> for SerialFrameCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: RawSerialFrame, dst: &mut BytesMut) -> std::io::Result<()> {
        dst.extend_from_slice(item.as_ref());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::frame::ControlFlow;

    #[test]
    fn test_decode_incremental() {
        let mut codec = SerialFrameCodec;
        let mut buf = BytesMut::new();

        // Feed a data frame in two pieces
        buf.extend_from_slice(&hex::decode("010300").unwrap());
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(&hex::decode("08f406").unwrap());
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(RawSerialFrame::Data(hex::decode("01030008f4").unwrap()))
        );
        // The trailing ACK is still there
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(RawSerialFrame::ControlFlow(ControlFlow::ACK))
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_encode() {
        let mut codec = SerialFrameCodec;
        let mut buf = BytesMut::new();
        codec
            .encode(RawSerialFrame::ControlFlow(ControlFlow::NAK), &mut buf)
            .unwrap();
        assert_eq!(&buf[..], &[0x15]);
    }
}
