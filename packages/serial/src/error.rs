#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Serialport(#[from] tokio_serial::Error),
    #[error(transparent)]
    Io(#[from] tokio::io::Error),
    #[error(transparent)]
    Encoding(#[from] zw_core::encoding::EncodingError),
}

pub type Result<T> = std::result::Result<T, Error>;
