use crate::command::{CommandBase, CommandId, CommandRequest};
use cookie_factory as cf;
use nom::{bytes::complete::take_till, combinator::opt, error::context, number::complete::be_u8};
use zw_core::encoding::encoders::empty;
use zw_core::parse::{Input, Parsable, ParseResult};
use zw_core::prelude::*;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct GetControllerVersionRequest {}

impl CommandId for GetControllerVersionRequest {
    fn command_type(&self) -> CommandType {
        CommandType::Request
    }

    fn function(&self) -> u8 {
        FunctionType::GetControllerVersion as u8
    }
}

impl CommandBase for GetControllerVersionRequest {}

impl CommandRequest for GetControllerVersionRequest {
    fn expects_response(&self) -> bool {
        true
    }
}

impl Serializable for GetControllerVersionRequest {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetControllerVersionResponse {
    /// Zero-terminated version string, e.g. "Z-Wave 3.99"
    pub library_version: String,
    pub library_type: Option<LibraryType>,
}

impl CommandId for GetControllerVersionResponse {
    fn command_type(&self) -> CommandType {
        CommandType::Response
    }

    fn function(&self) -> u8 {
        FunctionType::GetControllerVersion as u8
    }
}

impl CommandBase for GetControllerVersionResponse {}

impl Parsable for GetControllerVersionResponse {
    fn parse(i: Input) -> ParseResult<Self> {
        let (i, version) = context("GetControllerVersion", take_till(|b| b == 0))(i)?;
        let (i, _) = be_u8(i)?; // terminator
        let (i, library_type) = opt(LibraryType::parse)(i)?;

        Ok((
            i,
            Self {
                library_version: String::from_utf8_lossy(version).into_owned(),
                library_type,
            },
        ))
    }
}

impl Serializable for GetControllerVersionResponse {
    fn serialize<'a, W: std::io::Write + 'a>(&'a self) -> impl cf::SerializeFn<W> + 'a {
        use cf::{bytes::be_u8, combinator::string, sequence::tuple};
        move |out| {
            tuple((
                string(&self.library_version),
                be_u8(0),
                be_u8(self.library_type.map(|t| t as u8).unwrap_or_default()),
            ))(out)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use zw_core::encoding::IntoEncodingResult;

    #[test]
    fn test_parse() {
        let mut payload = b"Z-Wave 3.99".to_vec();
        payload.push(0);
        payload.push(LibraryType::StaticController as u8);

        let parsed = GetControllerVersionResponse::parse(&payload)
            .into_encoding_result()
            .unwrap();
        assert_eq!(parsed.library_version, "Z-Wave 3.99");
        assert_eq!(parsed.library_type, Some(LibraryType::StaticController));
    }
}
