use crate::command::{CommandBase, CommandId, CommandRequest};
use cookie_factory as cf;
use nom::{error::context, number::complete::be_u8};
use zw_core::parse::{Input, Parsable, ParseResult};
use zw_core::prelude::*;

/// Callback status: the failed node was removed from the routing table
pub const FAILED_NODE_REMOVED: u8 = 0x01;
/// Callback status: the node responded and is not failed after all
pub const FAILED_NODE_NOT_REMOVED: u8 = 0x02;
/// Callback status: replace is waiting for the new node to be included
pub const FAILED_NODE_REPLACE_WAITING: u8 = 0x03;
/// Callback status: the failed node was replaced
pub const FAILED_NODE_REPLACE_DONE: u8 = 0x04;
/// Callback status: replacing the failed node failed
pub const FAILED_NODE_REPLACE_FAILED: u8 = 0x05;

/// Asks the module whether it considers a node failed
#[derive(Debug, Clone, PartialEq)]
pub struct IsFailedNodeRequest {
    pub node_id: NodeId,
}

impl CommandId for IsFailedNodeRequest {
    fn command_type(&self) -> CommandType {
        CommandType::Request
    }

    fn function(&self) -> u8 {
        FunctionType::IsFailedNode as u8
    }
}

impl CommandBase for IsFailedNodeRequest {}

impl CommandRequest for IsFailedNodeRequest {
    fn expects_response(&self) -> bool {
        true
    }
}

impl Serializable for IsFailedNodeRequest {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        self.node_id.serialize()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IsFailedNodeResponse {
    pub failed: bool,
}

impl CommandId for IsFailedNodeResponse {
    fn command_type(&self) -> CommandType {
        CommandType::Response
    }

    fn function(&self) -> u8 {
        FunctionType::IsFailedNode as u8
    }
}

impl CommandBase for IsFailedNodeResponse {}

impl Parsable for IsFailedNodeResponse {
    fn parse(i: Input) -> ParseResult<Self> {
        let (i, failed) = context("IsFailedNode", be_u8)(i)?;
        Ok((i, Self { failed: failed != 0 }))
    }
}

impl Serializable for IsFailedNodeResponse {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        cf::bytes::be_u8(self.failed as u8)
    }
}

macro_rules! failed_node_command {
    ($request:ident, $response:ident, $callback:ident, $function:expr) => {
        #[derive(Debug, Clone, PartialEq)]
        pub struct $request {
            pub node_id: NodeId,
            pub callback_id: Option<u8>,
        }

        impl $request {
            pub fn new(node_id: NodeId) -> Self {
                Self {
                    node_id,
                    callback_id: None,
                }
            }
        }

        impl CommandId for $request {
            fn command_type(&self) -> CommandType {
                CommandType::Request
            }

            fn function(&self) -> u8 {
                $function as u8
            }
        }

        impl CommandBase for $request {
            fn callback_id(&self) -> Option<u8> {
                self.callback_id
            }
        }

        impl CommandRequest for $request {
            fn expects_response(&self) -> bool {
                true
            }

            fn expects_callback(&self) -> bool {
                true
            }

            fn needs_callback_id(&self) -> bool {
                true
            }

            fn set_callback_id(&mut self, callback_id: Option<u8>) {
                self.callback_id = callback_id;
            }
        }

        impl Serializable for $request {
            fn serialize<'a, W: std::io::Write + 'a>(
                &'a self,
            ) -> impl cf::SerializeFn<W> + 'a {
                use cf::{bytes::be_u8, sequence::tuple};
                move |out| {
                    tuple((
                        self.node_id.serialize(),
                        be_u8(self.callback_id.unwrap_or(0)),
                    ))(out)
                }
            }
        }

        /// The response's status byte is zero when the operation started
        #[derive(Debug, Clone, PartialEq)]
        pub struct $response {
            pub status: u8,
        }

        impl CommandId for $response {
            fn command_type(&self) -> CommandType {
                CommandType::Response
            }

            fn function(&self) -> u8 {
                $function as u8
            }
        }

        impl CommandBase for $response {
            fn is_ok(&self) -> bool {
                self.status == 0
            }
        }

        impl Parsable for $response {
            fn parse(i: Input) -> ParseResult<Self> {
                let (i, status) = context(stringify!($response), be_u8)(i)?;
                Ok((i, Self { status }))
            }
        }

        impl Serializable for $response {
            fn serialize<'a, W: std::io::Write + 'a>(
                &'a self,
            ) -> impl cf::SerializeFn<W> + 'a {
                cf::bytes::be_u8(self.status)
            }
        }

        #[derive(Debug, Clone, PartialEq)]
        pub struct $callback {
            pub callback_id: u8,
            pub status: u8,
        }

        impl CommandId for $callback {
            fn command_type(&self) -> CommandType {
                CommandType::Request
            }

            fn function(&self) -> u8 {
                $function as u8
            }
        }

        impl CommandBase for $callback {
            fn callback_id(&self) -> Option<u8> {
                Some(self.callback_id)
            }
        }

        impl Parsable for $callback {
            fn parse(i: Input) -> ParseResult<Self> {
                let (i, callback_id) = context(stringify!($callback), be_u8)(i)?;
                let (i, status) = be_u8(i)?;
                Ok((
                    i,
                    Self {
                        callback_id,
                        status,
                    },
                ))
            }
        }

        impl Serializable for $callback {
            fn serialize<'a, W: std::io::Write + 'a>(
                &'a self,
            ) -> impl cf::SerializeFn<W> + 'a {
                use cf::{bytes::be_u8, sequence::tuple};
                move |out| tuple((be_u8(self.callback_id), be_u8(self.status)))(out)
            }
        }
    };
}

failed_node_command!(
    RemoveFailedNodeRequest,
    RemoveFailedNodeResponse,
    RemoveFailedNodeCallback,
    FunctionType::RemoveFailedNode
);

failed_node_command!(
    ReplaceFailedNodeRequest,
    ReplaceFailedNodeResponse,
    ReplaceFailedNodeCallback,
    FunctionType::ReplaceFailedNode
);

#[cfg(test)]
mod test {
    use super::*;
    use zw_core::encoding::IntoEncodingResult;

    #[test]
    fn test_remove_failed_callback() {
        let payload = hex::decode("0a01").unwrap();
        let parsed = RemoveFailedNodeCallback::parse(&payload)
            .into_encoding_result()
            .unwrap();
        assert_eq!(parsed.callback_id, 0x0a);
        assert_eq!(parsed.status, FAILED_NODE_REMOVED);
    }
}
