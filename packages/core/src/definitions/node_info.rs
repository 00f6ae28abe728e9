use crate::parse::{Parsable, ParseResult};
use nom::{error::context, number::complete::be_u8, sequence::tuple};
use serde::{Deserialize, Serialize};

/// The three device-class codes a node advertises
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceClasses {
    pub basic: u8,
    pub generic: u8,
    pub specific: u8,
}

/// Protocol-level information about a node, as returned by
/// `GetNodeProtocolInfo`: capability flags, the negotiated data rate and
/// the device class triple.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeProtocolInfo {
    /// Whether the node is always listening or sleeps between wakeups
    pub listening: bool,
    /// Whether the node can route messages for others
    pub routing: bool,
    /// Maximum baud rate the node supports on the air
    pub max_baud_rate: u32,
    /// Z-Wave protocol version (1-based)
    pub version: u8,
    /// Whether the node supports the Security command class
    pub security: bool,
    /// Whether the node can be woken by a beam
    pub beaming: bool,
    pub device_classes: DeviceClasses,
}

impl Parsable for NodeProtocolInfo {
    fn parse(i: &[u8]) -> ParseResult<Self> {
        let (i, (capability, security_flags, _reserved, basic, generic, specific)) = context(
            "NodeProtocolInfo",
            tuple((be_u8, be_u8, be_u8, be_u8, be_u8, be_u8)),
        )(i)?;

        let listening = capability & 0x80 != 0;
        let routing = capability & 0x40 != 0;
        let max_baud_rate = if capability & 0x38 == 0x10 {
            40_000
        } else {
            9_600
        };
        let version = (capability & 0x07) + 1;
        let security = security_flags & 0x01 != 0;
        let beaming = security_flags & 0x10 != 0;

        Ok((
            i,
            Self {
                listening,
                routing,
                max_baud_rate,
                version,
                security,
                beaming,
                device_classes: DeviceClasses {
                    basic,
                    generic,
                    specific,
                },
            },
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::encoding::IntoEncodingResult;

    #[test]
    fn test_parse_listening_node() {
        // capability 0xd3: listening, routing, 40k, version 4
        let payload = hex::decode("d3010004100100").unwrap();
        let info = NodeProtocolInfo::parse(&payload)
            .into_encoding_result()
            .unwrap();
        assert!(info.listening);
        assert!(info.routing);
        assert_eq!(info.max_baud_rate, 40_000);
        assert_eq!(info.version, 4);
        assert!(info.security);
        assert_eq!(info.device_classes.basic, 0x04);
        assert_eq!(info.device_classes.generic, 0x10);
        assert_eq!(info.device_classes.specific, 0x01);
    }

    #[test]
    fn test_parse_sleeping_node() {
        // capability 0x53: not listening
        let payload = hex::decode("53000003070100").unwrap();
        let info = NodeProtocolInfo::parse(&payload)
            .into_encoding_result()
            .unwrap();
        assert!(!info.listening);
        assert!(!info.security);
        assert_eq!(info.max_baud_rate, 40_000);
    }
}
