use crate::command_raw::CommandRaw;
use std::fmt::Debug;
use zw_core::encoding::IntoEncodingResult;
use zw_core::prelude::*;

mod application;
mod capability;
mod misc;
mod network_mgmt;
mod transport;

pub use application::*;
pub use capability::*;
pub use misc::*;
pub use network_mgmt::*;
pub use transport::*;

/// Identifies a command on the wire
pub trait CommandId {
    fn command_type(&self) -> CommandType;
    /// The raw function id. Known ids map onto [FunctionType].
    fn function(&self) -> u8;

    fn function_type(&self) -> Option<FunctionType> {
        FunctionType::try_from(self.function()).ok()
    }
}

/// Functionality shared by all commands
pub trait CommandBase: CommandId + Debug {
    /// Whether a response or callback indicates success. Commands without
    /// a success flag are always ok.
    fn is_ok(&self) -> bool {
        true
    }

    /// The callback id carried by this command, if any
    fn callback_id(&self) -> Option<u8> {
        None
    }
}

/// Functionality for commands the host sends to the module
pub trait CommandRequest: CommandBase + Serializable {
    fn expects_response(&self) -> bool {
        false
    }

    /// Whether the given command is the response this request waits for
    fn test_response(&self, response: &Command) -> bool {
        self.expects_response()
            && response.command_type() == CommandType::Response
            && response.function() == self.function()
    }

    fn expects_callback(&self) -> bool {
        false
    }

    /// Whether the given command is the callback this request waits for.
    /// Callbacks arrive as requests with a matching callback id.
    fn test_callback(&self, callback: &Command) -> bool {
        self.expects_callback()
            && callback.command_type() == CommandType::Request
            && callback.function() == self.function()
            && match (self.callback_id(), callback.callback_id()) {
                (Some(expected), Some(actual)) => expected == actual,
                // A request without a callback id accepts any callback
                // for its function
                (None, _) => true,
                _ => false,
            }
    }

    /// Whether this command needs a callback id assigned before sending
    fn needs_callback_id(&self) -> bool {
        false
    }

    fn set_callback_id(&mut self, _callback_id: Option<u8>) {}
}

/// A well-formed frame with a function id this library does not interpret.
/// It is surfaced to the embedder instead of being dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct NotImplemented {
    pub command_type: CommandType,
    pub function: u8,
    pub payload: Vec<u8>,
}

impl CommandId for NotImplemented {
    fn command_type(&self) -> CommandType {
        self.command_type
    }

    fn function(&self) -> u8 {
        self.function
    }
}

impl CommandBase for NotImplemented {}

impl Serializable for NotImplemented {
    fn serialize<'a, W: std::io::Write + 'a>(
        &'a self,
    ) -> impl cookie_factory::SerializeFn<W> + 'a {
        cookie_factory::combinator::slice(&self.payload)
    }
}

macro_rules! command_enum {
    ( $( $variant:ident ),+ $(,)? ) => {
        /// Every typed command this library can produce or consume
        #[derive(Debug, Clone, PartialEq)]
        pub enum Command {
            $( $variant($variant), )+
        }

        impl CommandId for Command {
            fn command_type(&self) -> CommandType {
                match self { $( Command::$variant(c) => c.command_type(), )+ }
            }

            fn function(&self) -> u8 {
                match self { $( Command::$variant(c) => c.function(), )+ }
            }
        }

        impl CommandBase for Command {
            fn is_ok(&self) -> bool {
                match self { $( Command::$variant(c) => c.is_ok(), )+ }
            }

            fn callback_id(&self) -> Option<u8> {
                match self { $( Command::$variant(c) => c.callback_id(), )+ }
            }
        }

        impl Serializable for Command {
            fn serialize<'a, W: std::io::Write + 'a>(
                &'a self,
            ) -> impl cookie_factory::SerializeFn<W> + 'a {
                move |out| match self {
                    $( Command::$variant(c) => c.serialize()(out), )+
                }
            }
        }

        $(
            impl From<$variant> for Command {
                fn from(val: $variant) -> Self {
                    Self::$variant(val)
                }
            }
        )+
    };
}

command_enum!(
    // Capability queries
    GetSerialApiInitDataRequest,
    GetSerialApiInitDataResponse,
    GetSerialApiCapabilitiesRequest,
    GetSerialApiCapabilitiesResponse,
    GetControllerCapabilitiesRequest,
    GetControllerCapabilitiesResponse,
    GetControllerVersionRequest,
    GetControllerVersionResponse,
    MemoryGetIdRequest,
    MemoryGetIdResponse,
    // Misc
    SoftResetRequest,
    // Network management
    GetNodeProtocolInfoRequest,
    GetNodeProtocolInfoResponse,
    GetSucNodeIdRequest,
    GetSucNodeIdResponse,
    SetSucNodeIdRequest,
    SetSucNodeIdResponse,
    RequestNodeInfoRequest,
    RequestNodeInfoResponse,
    AddNodeToNetworkRequest,
    AddNodeToNetworkCallback,
    RemoveNodeFromNetworkRequest,
    RemoveNodeFromNetworkCallback,
    IsFailedNodeRequest,
    IsFailedNodeResponse,
    RemoveFailedNodeRequest,
    RemoveFailedNodeResponse,
    RemoveFailedNodeCallback,
    ReplaceFailedNodeRequest,
    ReplaceFailedNodeResponse,
    ReplaceFailedNodeCallback,
    RequestNodeNeighborUpdateRequest,
    RequestNodeNeighborUpdateCallback,
    RequestNetworkUpdateRequest,
    RequestNetworkUpdateResponse,
    RequestNetworkUpdateCallback,
    SetLearnModeRequest,
    SetLearnModeResponse,
    SetLearnModeCallback,
    GetRoutingInfoRequest,
    GetRoutingInfoResponse,
    // Transport
    SendDataRequest,
    SendDataResponse,
    SendDataCallback,
    SendDataAbortRequest,
    // Application
    ApplicationCommandRequest,
    ApplicationUpdateRequest,
    // Fallback
    NotImplemented,
);

// The variants the host can send. Request-only functionality on the enum
// delegates to these; all other variants use the defaults.
macro_rules! delegate_to_requests {
    ($self:ident, |$c:ident| $body:expr, $fallback:expr) => {
        match $self {
            Command::GetSerialApiInitDataRequest($c) => $body,
            Command::GetSerialApiCapabilitiesRequest($c) => $body,
            Command::GetControllerCapabilitiesRequest($c) => $body,
            Command::GetControllerVersionRequest($c) => $body,
            Command::MemoryGetIdRequest($c) => $body,
            Command::SoftResetRequest($c) => $body,
            Command::GetNodeProtocolInfoRequest($c) => $body,
            Command::GetSucNodeIdRequest($c) => $body,
            Command::SetSucNodeIdRequest($c) => $body,
            Command::RequestNodeInfoRequest($c) => $body,
            Command::AddNodeToNetworkRequest($c) => $body,
            Command::RemoveNodeFromNetworkRequest($c) => $body,
            Command::IsFailedNodeRequest($c) => $body,
            Command::RemoveFailedNodeRequest($c) => $body,
            Command::ReplaceFailedNodeRequest($c) => $body,
            Command::RequestNodeNeighborUpdateRequest($c) => $body,
            Command::RequestNetworkUpdateRequest($c) => $body,
            Command::SetLearnModeRequest($c) => $body,
            Command::GetRoutingInfoRequest($c) => $body,
            Command::SendDataRequest($c) => $body,
            Command::SendDataAbortRequest($c) => $body,
            _ => $fallback,
        }
    };
}

impl CommandRequest for Command {
    fn expects_response(&self) -> bool {
        delegate_to_requests!(self, |c| c.expects_response(), false)
    }

    fn test_response(&self, response: &Command) -> bool {
        delegate_to_requests!(self, |c| c.test_response(response), false)
    }

    fn expects_callback(&self) -> bool {
        delegate_to_requests!(self, |c| c.expects_callback(), false)
    }

    fn test_callback(&self, callback: &Command) -> bool {
        delegate_to_requests!(self, |c| c.test_callback(callback), false)
    }

    fn needs_callback_id(&self) -> bool {
        delegate_to_requests!(self, |c| c.needs_callback_id(), false)
    }

    fn set_callback_id(&mut self, callback_id: Option<u8>) {
        delegate_to_requests!(self, |c| c.set_callback_id(callback_id), ())
    }
}

impl Command {
    /// Decodes a checked raw frame into a typed command. Frames with
    /// unknown function ids become [NotImplemented].
    pub fn try_from_raw(raw: &CommandRaw) -> EncodingResult<Self> {
        use CommandType as T;
        use FunctionType as F;

        let i = raw.payload.as_slice();
        let cmd: Command = match (raw.function_type(), raw.command_type) {
            (Some(F::GetSerialApiInitData), T::Response) => {
                GetSerialApiInitDataResponse::parse(i)
                    .into_encoding_result()?
                    .into()
            }
            (Some(F::GetSerialApiCapabilities), T::Response) => {
                GetSerialApiCapabilitiesResponse::parse(i)
                    .into_encoding_result()?
                    .into()
            }
            (Some(F::GetControllerCapabilities), T::Response) => {
                GetControllerCapabilitiesResponse::parse(i)
                    .into_encoding_result()?
                    .into()
            }
            (Some(F::GetControllerVersion), T::Response) => {
                GetControllerVersionResponse::parse(i)
                    .into_encoding_result()?
                    .into()
            }
            (Some(F::MemoryGetId), T::Response) => {
                MemoryGetIdResponse::parse(i).into_encoding_result()?.into()
            }
            (Some(F::GetNodeProtocolInfo), T::Response) => {
                GetNodeProtocolInfoResponse::parse(i)
                    .into_encoding_result()?
                    .into()
            }
            (Some(F::GetSucNodeId), T::Response) => {
                GetSucNodeIdResponse::parse(i).into_encoding_result()?.into()
            }
            (Some(F::SetSucNodeId), T::Response) => {
                SetSucNodeIdResponse::parse(i).into_encoding_result()?.into()
            }
            (Some(F::RequestNodeInfo), T::Response) => {
                RequestNodeInfoResponse::parse(i)
                    .into_encoding_result()?
                    .into()
            }
            (Some(F::AddNodeToNetwork), T::Request) => {
                AddNodeToNetworkCallback::parse(i)
                    .into_encoding_result()?
                    .into()
            }
            (Some(F::RemoveNodeFromNetwork), T::Request) => {
                RemoveNodeFromNetworkCallback::parse(i)
                    .into_encoding_result()?
                    .into()
            }
            (Some(F::IsFailedNode), T::Response) => {
                IsFailedNodeResponse::parse(i).into_encoding_result()?.into()
            }
            (Some(F::RemoveFailedNode), T::Response) => {
                RemoveFailedNodeResponse::parse(i)
                    .into_encoding_result()?
                    .into()
            }
            (Some(F::RemoveFailedNode), T::Request) => {
                RemoveFailedNodeCallback::parse(i)
                    .into_encoding_result()?
                    .into()
            }
            (Some(F::ReplaceFailedNode), T::Response) => {
                ReplaceFailedNodeResponse::parse(i)
                    .into_encoding_result()?
                    .into()
            }
            (Some(F::ReplaceFailedNode), T::Request) => {
                ReplaceFailedNodeCallback::parse(i)
                    .into_encoding_result()?
                    .into()
            }
            (Some(F::RequestNodeNeighborUpdate), T::Request) => {
                RequestNodeNeighborUpdateCallback::parse(i)
                    .into_encoding_result()?
                    .into()
            }
            (Some(F::RequestNetworkUpdate), T::Response) => {
                RequestNetworkUpdateResponse::parse(i)
                    .into_encoding_result()?
                    .into()
            }
            (Some(F::RequestNetworkUpdate), T::Request) => {
                RequestNetworkUpdateCallback::parse(i)
                    .into_encoding_result()?
                    .into()
            }
            (Some(F::SetLearnMode), T::Response) => {
                SetLearnModeResponse::parse(i).into_encoding_result()?.into()
            }
            (Some(F::SetLearnMode), T::Request) => {
                SetLearnModeCallback::parse(i).into_encoding_result()?.into()
            }
            (Some(F::GetRoutingInfo), T::Response) => {
                GetRoutingInfoResponse::parse(i)
                    .into_encoding_result()?
                    .into()
            }
            (Some(F::SendData), T::Response) => {
                SendDataResponse::parse(i).into_encoding_result()?.into()
            }
            (Some(F::SendData), T::Request) => {
                SendDataCallback::parse(i).into_encoding_result()?.into()
            }
            (Some(F::ApplicationCommand), T::Request) => {
                ApplicationCommandRequest::parse(i)
                    .into_encoding_result()?
                    .into()
            }
            (Some(F::ApplicationUpdate), T::Request) => {
                ApplicationUpdateRequest::parse(i)
                    .into_encoding_result()?
                    .into()
            }
            _ => NotImplemented {
                command_type: raw.command_type,
                function: raw.function,
                payload: raw.payload.clone(),
            }
            .into(),
        };
        Ok(cmd)
    }

    /// Encodes this command into a raw frame ready for the wire
    pub fn as_raw(&self) -> EncodingResult<CommandRaw> {
        let payload = cookie_factory::gen_simple(self.serialize(), Vec::new())
            .into_encoding_result()?;
        Ok(CommandRaw::new(self.command_type(), self.function(), payload))
    }
}

pub(crate) mod wire {
    //! Small parsers/encoders shared by several commands

    use nom::bytes::complete::take;
    use nom::number::complete::be_u8;
    use zw_core::parse::{Input, ParseResult};
    use zw_core::prelude::*;

    /// Parses a node bitmask (bit 0 of byte 0 = node 1) into node ids
    pub fn node_bitmask(i: Input, num_bytes: usize) -> ParseResult<Vec<NodeId>> {
        let (i, mask) = take(num_bytes)(i)?;
        let mut nodes = Vec::new();
        for (byte_idx, byte) in mask.iter().enumerate() {
            for bit in 0..8 {
                if byte & (1 << bit) != 0 {
                    nodes.push(NodeId::new((byte_idx * 8 + bit + 1) as u8));
                }
            }
        }
        Ok((i, nodes))
    }

    /// Parses a length-prefixed node information frame body:
    /// basic, generic, specific followed by the command class list
    pub fn node_info_body(i: Input) -> ParseResult<Option<super::NifData>> {
        let (i, len) = be_u8(i)?;
        if len < 3 {
            return Ok((i, None));
        }
        let (i, body) = take(len)(i)?;
        let (supported, controlled) = CommandClasses::split_nif(&body[3..]);
        Ok((
            i,
            Some(super::NifData {
                basic: body[0],
                generic: body[1],
                specific: body[2],
                supported_command_classes: supported,
                controlled_command_classes: controlled,
            }),
        ))
    }
}

/// The decoded body of a node information frame
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NifData {
    pub basic: u8,
    pub generic: u8,
    pub specific: u8,
    pub supported_command_classes: Vec<u8>,
    pub controlled_command_classes: Vec<u8>,
}

#[cfg(test)]
mod test {
    use super::*;
    use zw_core::parse::Parsable;

    #[test]
    fn test_unknown_function_becomes_not_implemented() {
        // Function 0x3b is not in the typed set
        let frame = hex::decode("0104013b27e6").unwrap();
        let raw = CommandRaw::parse(&frame).into_encoding_result().unwrap();
        let cmd = Command::try_from_raw(&raw).unwrap();
        match cmd {
            Command::NotImplemented(ni) => {
                assert_eq!(ni.function, 0x3b);
                assert_eq!(ni.payload, vec![0x27]);
            }
            other => panic!("expected NotImplemented, got {:?}", other),
        }
    }
}
