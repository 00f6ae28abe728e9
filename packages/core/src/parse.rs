//! nom scaffolding shared by all wire parsers: a custom error type that can
//! carry validation messages and parser context alongside nom's own error
//! kinds.

use nom::error::{
    ContextError as NomContextError, ErrorKind as NomErrorKind, ParseError as NomParseError,
};
use std::fmt;

#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    Nom(NomErrorKind),
    Context(&'static str),
    Validation(String),
}

#[derive(PartialEq)]
pub struct NomError<I> {
    pub errors: Vec<(I, ErrorKind)>,
}

impl<I> NomError<I> {
    pub fn validation_failure(input: I, reason: String) -> Self {
        let errors = vec![(input, ErrorKind::Validation(reason))];
        Self { errors }
    }

    /// Extracts the first validation message, if any
    pub fn validation_reason(&self) -> Option<&str> {
        self.errors.iter().find_map(|(_, kind)| match kind {
            ErrorKind::Validation(reason) => Some(reason.as_str()),
            _ => None,
        })
    }
}

/// Validates that the given condition is satisfied, otherwise results in a
/// nom Failure with the given error message.
pub fn validate(input: Input, condition: bool, message: impl Into<String>) -> ParseResult<()> {
    match condition {
        true => Ok((input, ())),
        false => Err(nom::Err::Failure(NomError::validation_failure(
            input,
            message.into(),
        ))),
    }
}

impl<I> NomParseError<I> for NomError<I> {
    fn from_error_kind(input: I, kind: NomErrorKind) -> Self {
        let errors = vec![(input, ErrorKind::Nom(kind))];
        Self { errors }
    }

    fn append(input: I, kind: NomErrorKind, mut other: Self) -> Self {
        other.errors.push((input, ErrorKind::Nom(kind)));
        other
    }
}

impl<I> NomContextError<I> for NomError<I> {
    fn add_context(input: I, ctx: &'static str, mut other: Self) -> Self {
        other.errors.push((input, ErrorKind::Context(ctx)));
        other
    }
}

impl<I, E> nom::error::FromExternalError<I, E> for NomError<I> {
    fn from_external_error(input: I, kind: NomErrorKind, _e: E) -> Self {
        let errors = vec![(input, ErrorKind::Nom(kind))];
        Self { errors }
    }
}

impl fmt::Debug for NomError<&[u8]> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "parsing error")?;
        for (input, kind) in self.errors.iter().rev() {
            let prefix = match kind {
                ErrorKind::Context(ctx) => format!("...in {}", ctx),
                ErrorKind::Nom(err) => format!("nom error {:?}", err),
                ErrorKind::Validation(reason) => format!("validation error: {}", reason),
            };
            writeln!(f, "{}", prefix)?;
            writeln!(f, "    {}", hex::encode(&input[..input.len().min(32)]))?;
        }
        Ok(())
    }
}

pub type Input<'a> = &'a [u8];
pub type ParseResult<'a, T> = nom::IResult<Input<'a>, T, NomError<Input<'a>>>;

pub trait Parsable
where
    Self: Sized,
{
    fn parse(i: Input) -> ParseResult<Self>;
}

/// Runs a [Parsable] over a complete buffer, converting the nom result into
/// the library result type. Trailing bytes are not an error; payload parsers
/// decide themselves whether to consume the rest.
pub fn parse_complete<T: Parsable>(i: &[u8]) -> crate::encoding::EncodingResult<T> {
    use crate::encoding::IntoEncodingResult;
    T::parse(i).into_encoding_result()
}
