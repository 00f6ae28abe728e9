use crate::parse::{Parsable, ParseResult};
use derive_try_from_primitive::TryFromPrimitive;
use nom::{combinator::map_res, error::context, number::complete::be_u8};

/// The event code of an `ApplicationUpdate` request
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum UpdateState {
    SucIdChanged = 0x10,
    DeleteDone = 0x20,
    NewIdAssigned = 0x40,
    RoutingPending = 0x80,
    NodeInfoReqFailed = 0x81,
    NodeInfoReqDone = 0x82,
    NodeInfoReceived = 0x84,
}

impl Parsable for UpdateState {
    fn parse(i: &[u8]) -> ParseResult<Self> {
        context("UpdateState", map_res(be_u8, UpdateState::try_from))(i)
    }
}
