use crate::parse::{Parsable, ParseResult};
use cookie_factory as cf;
use derive_try_from_primitive::TryFromPrimitive;
use nom::{combinator::map_res, error::context, number::complete::be_u8};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// The marker byte in a node information frame. Command classes listed
/// after it are controlled by the node, not supported.
pub const COMMAND_CLASS_MARK: u8 = 0xef;

/// The command class IDs this library knows about. Classes outside this
/// list are tracked by their raw ID and handled generically.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    TryFromPrimitive,
    Serialize,
    Deserialize,
)]
#[repr(u8)]
pub enum CommandClasses {
    NoOperation = 0x00,
    Basic = 0x20,
    BinarySwitch = 0x25,
    MultilevelSwitch = 0x26,
    SwitchAll = 0x27,
    SceneActivation = 0x2b,
    BinarySensor = 0x30,
    MultilevelSensor = 0x31,
    Meter = 0x32,
    ThermostatSetpoint = 0x43,
    Crc16Encap = 0x56,
    AssociationGroupInfo = 0x59,
    DeviceResetLocally = 0x5a,
    CentralScene = 0x5b,
    ZWavePlusInfo = 0x5e,
    MultiInstance = 0x60,
    Configuration = 0x70,
    Notification = 0x71,
    ManufacturerSpecific = 0x72,
    Powerlevel = 0x73,
    Battery = 0x80,
    Hail = 0x82,
    WakeUp = 0x84,
    Association = 0x85,
    Version = 0x86,
    MultiCmd = 0x8f,
    Security = 0x98,
    Mark = 0xef,
}

impl CommandClasses {
    /// Parses the class list of a node information frame into supported and
    /// controlled raw IDs, split at the mark byte.
    pub fn split_nif(class_list: &[u8]) -> (Vec<u8>, Vec<u8>) {
        match class_list.iter().position(|&b| b == COMMAND_CLASS_MARK) {
            Some(mark) => (
                class_list[..mark].to_vec(),
                class_list[mark + 1..].to_vec(),
            ),
            None => (class_list.to_vec(), Vec::new()),
        }
    }
}

impl Display for CommandClasses {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl Parsable for CommandClasses {
    fn parse(i: &[u8]) -> ParseResult<Self> {
        context("CommandClasses", map_res(be_u8, CommandClasses::try_from))(i)
    }
}

impl crate::encoding::Serializable for CommandClasses {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        cf::bytes::be_u8(*self as u8)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_split_nif() {
        let nif = [0x25, 0x86, 0x72, 0xef, 0x20];
        let (supported, controlled) = CommandClasses::split_nif(&nif);
        assert_eq!(supported, vec![0x25, 0x86, 0x72]);
        assert_eq!(controlled, vec![0x20]);
    }

    #[test]
    fn test_split_nif_no_mark() {
        let nif = [0x25, 0x86];
        let (supported, controlled) = CommandClasses::split_nif(&nif);
        assert_eq!(supported, vec![0x25, 0x86]);
        assert!(controlled.is_empty());
    }
}
