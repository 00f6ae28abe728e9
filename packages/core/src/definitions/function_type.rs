use crate::parse::{Parsable, ParseResult};
use cookie_factory as cf;
use derive_try_from_primitive::TryFromPrimitive;
use nom::{combinator::map_res, error::context, number::complete::be_u8};

/// Function IDs of the Serial API commands this library produces and
/// consumes. The wire allows more; unknown IDs are carried through as
/// raw frames so embedders can extend the set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u8)]
pub enum FunctionType {
    GetSerialApiInitData = 0x02,
    ApplicationCommand = 0x04,
    GetControllerCapabilities = 0x05,
    SetSerialApiTimeouts = 0x06,
    GetSerialApiCapabilities = 0x07,
    SoftReset = 0x08,

    SendNodeInformation = 0x12,
    SendData = 0x13,
    SendDataMulticast = 0x14,
    GetControllerVersion = 0x15,
    SendDataAbort = 0x16,

    MemoryGetId = 0x20,

    GetNodeProtocolInfo = 0x41,
    SetDefault = 0x42,

    ReplicationCommandComplete = 0x44,
    ReplicationSendData = 0x45,
    AssignReturnRoute = 0x46,
    DeleteReturnRoute = 0x47,
    RequestNodeNeighborUpdate = 0x48,
    ApplicationUpdate = 0x49,

    AddNodeToNetwork = 0x4a,
    RemoveNodeFromNetwork = 0x4b,
    CreateNewPrimary = 0x4c,
    ControllerChange = 0x4d,

    SetLearnMode = 0x50,
    AssignSucReturnRoute = 0x51,
    RequestNetworkUpdate = 0x53,
    SetSucNodeId = 0x54,
    DeleteSucReturnRoute = 0x55,
    GetSucNodeId = 0x56,

    RequestNodeInfo = 0x60,
    RemoveFailedNode = 0x61,
    IsFailedNode = 0x62,
    ReplaceFailedNode = 0x63,

    GetRoutingInfo = 0x80,
}

impl Parsable for FunctionType {
    fn parse(i: &[u8]) -> ParseResult<Self> {
        context("FunctionType", map_res(be_u8, FunctionType::try_from))(i)
    }
}

impl crate::encoding::Serializable for FunctionType {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        cf::bytes::be_u8(*self as u8)
    }
}
