use crate::parse::{Parsable, ParseResult};
use derive_try_from_primitive::TryFromPrimitive;
use nom::{combinator::map_res, error::context, number::complete::be_u8};

/// Role flags reported by `GetControllerCapabilities`
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ControllerCapabilities {
    pub secondary: bool,
    pub on_other_network: bool,
    pub sis_present: bool,
    pub real_primary: bool,
    pub suc: bool,
}

impl Parsable for ControllerCapabilities {
    fn parse(i: &[u8]) -> ParseResult<Self> {
        let (i, flags) = context("ControllerCapabilities", be_u8)(i)?;
        Ok((
            i,
            Self {
                secondary: flags & 0x01 != 0,
                on_other_network: flags & 0x02 != 0,
                sis_present: flags & 0x04 != 0,
                real_primary: flags & 0x08 != 0,
                suc: flags & 0x10 != 0,
            },
        ))
    }
}

/// The kind of protocol library running on the controller, reported by
/// `GetControllerVersion`
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum LibraryType {
    StaticController = 0x01,
    Controller = 0x02,
    EnhancedSlave = 0x03,
    Slave = 0x04,
    Installer = 0x05,
    RoutingSlave = 0x06,
    BridgeController = 0x07,
    DeviceUnderTest = 0x08,
}

impl Parsable for LibraryType {
    fn parse(i: &[u8]) -> ParseResult<Self> {
        context("LibraryType", map_res(be_u8, LibraryType::try_from))(i)
    }
}
