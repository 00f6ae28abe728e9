//! cookie-factory scaffolding shared by all wire serializers, plus the
//! result type parsers and serializers convert into at crate boundaries.

use cookie_factory::GenError;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum EncodingError {
    #[error("Parse error: {}", .0.as_deref().unwrap_or("malformed data"))]
    Parse(Option<String>),
    #[error("Serialization error: {0}")]
    Serialize(String),
}

pub type EncodingResult<T> = Result<T, EncodingError>;

pub trait Serializable {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cookie_factory::SerializeFn<W> + 'a;
}

/// Serializes the given value into a freshly allocated buffer
pub fn serialize_to_vec<T: Serializable>(value: &T) -> EncodingResult<Vec<u8>> {
    cookie_factory::gen_simple(value.serialize(), Vec::new()).into_encoding_result()
}

pub mod encoders {
    use cookie_factory as cf;

    /// A serializer that outputs nothing. Needed where a combinator expects
    /// a serializer for an empty payload.
    pub fn empty<W: std::io::Write>() -> impl cf::SerializeFn<W> {
        move |out: cf::WriteContext<W>| Ok(out)
    }
}

/// Provides a way to convert foreign results into this library's result type
/// without breaking the orphan rule
pub trait IntoEncodingResult {
    type Output;
    fn into_encoding_result(self) -> EncodingResult<Self::Output>;
}

impl<T> IntoEncodingResult for crate::parse::ParseResult<'_, T> {
    type Output = T;

    fn into_encoding_result(self) -> EncodingResult<Self::Output> {
        let reason = match self {
            Ok((_, output)) => return Ok(output),
            Err(nom::Err::Incomplete(_)) | Err(nom::Err::Error(_)) => None,
            Err(nom::Err::Failure(e)) => e.validation_reason().map(ToOwned::to_owned),
        };
        Err(EncodingError::Parse(reason))
    }
}

impl<T> IntoEncodingResult for Result<T, GenError> {
    type Output = T;

    fn into_encoding_result(self) -> EncodingResult<Self::Output> {
        self.map_err(|e| EncodingError::Serialize(format!("{:?}", e)))
    }
}
