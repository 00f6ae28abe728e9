use crate::parse::{Parsable, ParseResult};
use cookie_factory as cf;
use derive_try_from_primitive::TryFromPrimitive;
use nom::{combinator::map_res, error::context, number::complete::be_u8};

/// Options for `SendData`, ORed together on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransmitOptions(u8);

pub const TRANSMIT_OPTION_ACK: u8 = 0x01;
pub const TRANSMIT_OPTION_LOW_POWER: u8 = 0x02;
pub const TRANSMIT_OPTION_AUTO_ROUTE: u8 = 0x04;
pub const TRANSMIT_OPTION_NO_ROUTE: u8 = 0x10;
pub const TRANSMIT_OPTION_EXPLORE: u8 = 0x20;

impl TransmitOptions {
    pub fn new(bits: u8) -> Self {
        Self(bits)
    }

    /// The options used for regular application commands
    pub fn default_for_singlecast() -> Self {
        Self(TRANSMIT_OPTION_ACK | TRANSMIT_OPTION_AUTO_ROUTE | TRANSMIT_OPTION_EXPLORE)
    }

    /// Broadcasts cannot be acknowledged
    pub fn default_for_broadcast() -> Self {
        Self(TRANSMIT_OPTION_AUTO_ROUTE)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }
}

impl Default for TransmitOptions {
    fn default() -> Self {
        Self::default_for_singlecast()
    }
}

impl crate::encoding::Serializable for TransmitOptions {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        cf::bytes::be_u8(self.0)
    }
}

/// The delivery status reported by a `SendData` callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum TransmitStatus {
    Ok = 0x00,
    NoAck = 0x01,
    Fail = 0x02,
    NotIdle = 0x03,
    NoRoute = 0x04,
}

impl TransmitStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, TransmitStatus::Ok)
    }
}

impl Parsable for TransmitStatus {
    fn parse(i: &[u8]) -> ParseResult<Self> {
        context("TransmitStatus", map_res(be_u8, TransmitStatus::try_from))(i)
    }
}
