//! Envelope of the ADB host protocol: `<4 hex digit length><command>` requests
//! answered by `OKAY` or `FAIL<4 hex digit length><message>`.

use crate::error::ErrorKind;
use crate::Result;
use bstr::BStr;
use bytes::Bytes;
use std::str::FromStr;
use strum::{AsRefStr, EnumString};

pub const STATUS_LENGTH: usize = 4;
pub const LENGTH_PREFIX: usize = 4;
pub const MAX_REQUEST: usize = 0xffff;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Status {
    Okay,
    Fail,
}

impl Status {
    pub fn parse(word: &[u8]) -> Result<Self> {
        if word.len() < STATUS_LENGTH {
            Err(ErrorKind::protocol("unexpected end of stream"))?;
        }

        std::str::from_utf8(word)
            .ok()
            .and_then(|s| Status::from_str(s).ok())
            .ok_or_else(|| {
                ErrorKind::protocol(format!("unknown response '{}'", BStr::new(word))).into()
            })
    }

    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Status::Okay => b"OKAY",
            Status::Fail => b"FAIL",
        }
    }
}

fn length_prefix(len: usize) -> Result<String> {
    if len > MAX_REQUEST {
        Err(ErrorKind::protocol(format!("payload too long: {len} bytes")))?;
    }
    Ok(format!("{len:04X}"))
}

/// Frames `cmd` as a single length-prefixed request.
pub fn encode_request(cmd: &str) -> Result<Bytes> {
    Ok((length_prefix(cmd.len())? + cmd).into())
}

/// Encodes a `FAIL` response the way an ADB server sends it.
pub fn encode_fail(message: &str) -> Result<Bytes> {
    let mut out = Status::Fail.as_ref().to_string();
    out += &length_prefix(message.len())?;
    out += message;
    Ok(out.into())
}

/// Parses a 4 hex digit length field.
pub fn parse_length(field: &[u8]) -> Result<usize> {
    if field.len() < LENGTH_PREFIX {
        Err(ErrorKind::protocol("unexpected end of stream"))?;
    }

    std::str::from_utf8(field)
        .ok()
        .and_then(|s| usize::from_str_radix(s, 16).ok())
        .ok_or_else(|| ErrorKind::protocol(format!("invalid length '{}'", BStr::new(field))).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_length_is_uppercase_hex() {
        assert_eq!(encode_request("host:version").unwrap(), "000Chost:version");
        assert_eq!(
            encode_request("host:transport:emulator-5554").unwrap(),
            "001Chost:transport:emulator-5554"
        );
        assert_eq!(encode_request("").unwrap(), "0000");
    }

    #[test]
    fn request_too_long_is_rejected() {
        let cmd = "x".repeat(MAX_REQUEST + 1);
        let err = encode_request(&cmd).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Protocol(_)));

        assert!(encode_request(&cmd[1..]).is_ok());
    }

    #[test]
    fn status_words() {
        assert_eq!(Status::parse(b"OKAY").unwrap(), Status::Okay);
        assert_eq!(Status::parse(b"FAIL").unwrap(), Status::Fail);
        assert_eq!(Status::Okay.as_ref(), "OKAY");

        let err = Status::parse(b"WHAT").unwrap_err();
        assert_eq!(err.to_string(), "unknown response 'WHAT'");

        let err = Status::parse(b"OK").unwrap_err();
        assert_eq!(err.kind, ErrorKind::protocol("unexpected end of stream"));

        assert!(Status::parse(b"okay").is_err());
    }

    #[test]
    fn fail_response() {
        assert_eq!(encode_fail("permission denied").unwrap(), "FAIL0011permission denied");
    }

    #[test]
    fn length_field() {
        assert_eq!(parse_length(b"0011").unwrap(), 17);
        assert_eq!(parse_length(b"00ff").unwrap(), 255);
        assert!(parse_length(b"00zz").is_err());
        assert!(parse_length(b"01").is_err());
    }
}
