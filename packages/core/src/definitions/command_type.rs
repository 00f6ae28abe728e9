use crate::parse::{Parsable, ParseResult};
use cookie_factory as cf;
use derive_try_from_primitive::TryFromPrimitive;
use nom::{
    combinator::map_res,
    error::context,
    number::complete::be_u8,
};

/// Whether a Serial API frame carries a host-initiated request or the
/// module's immediate answer to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum CommandType {
    Request = 0x00,
    Response = 0x01,
}

impl Parsable for CommandType {
    fn parse(i: &[u8]) -> ParseResult<Self> {
        context("CommandType", map_res(be_u8, CommandType::try_from))(i)
    }
}

impl crate::encoding::Serializable for CommandType {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        cf::bytes::be_u8(*self as u8)
    }
}
