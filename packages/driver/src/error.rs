use thiserror::Error;
use zw_core::definitions::NodeId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("The driver is not ready")]
    NotReady,
    #[error(transparent)]
    SerialPort(#[from] zw_serial::error::Error),
    #[error(transparent)]
    Encoding(#[from] zw_core::encoding::EncodingError),
    #[error("node {0} is unknown")]
    UnknownNode(NodeId),
    #[error("value does not exist")]
    UnknownValue,
    #[error("invalid value: {0}")]
    InvalidValue(String),
    #[error("node {0} did not respond")]
    NodeUnreachable(NodeId),
    #[error("security handshake failed: {0}")]
    SecurityFailure(String),
    #[error("persisted state incompatible: {0}")]
    Config(String),
    #[error("operation timed out")]
    Timeout,
    #[error("the driver shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, Error>;
