use base64::prelude::*;

use crate::resp::ParseError;

// The envelope has no trailing CRLF after the payload, unlike every other
// frame in this protocol, so it gets its own encoder instead of reusing the
// bulk-string one.
const EMPTY_RDB_BASE64: &str =
    "UkVESVMwMDEx+glyZWRpcy12ZXIFNy4yLjD6CnJlZGlzLWJpdHPAQPoFY3RpbWXCbQi8ZfoIdXNlZC1tZW3CsMQQAPoIYW9mLWJhc2XAAP/wbjv+wP9aog==";

pub fn empty_snapshot() -> Vec<u8> {
    BASE64_STANDARD
        .decode(EMPTY_RDB_BASE64)
        .expect("embedded empty RDB blob must be valid base64")
}

pub fn encode_envelope(payload: &[u8]) -> Vec<u8> {
    let mut out = format!("${}\r\n", payload.len()).into_bytes();
    out.extend_from_slice(payload);
    out
}

pub fn parse_envelope(buf: &[u8]) -> Result<(Vec<u8>, usize), ParseError> {
    if buf.first() != Some(&b'$') {
        return match buf.first() {
            Some(_) => Err(ParseError::Invalid("snapshot envelope must start with '$'".into())),
            None => Err(ParseError::Incomplete),
        };
    }
    let crlf = buf
        .windows(2)
        .position(|w| w == [b'\r', b'\n'])
        .ok_or(ParseError::Incomplete)?;
    let len: usize = std::str::from_utf8(&buf[1..crlf])?
        .parse()
        .map_err(|_| ParseError::Invalid("invalid snapshot length prefix".into()))?;
    let payload_start = crlf + 2;
    if buf.len() < payload_start + len {
        return Err(ParseError::Incomplete);
    }
    Ok((buf[payload_start..payload_start + len].to_vec(), payload_start + len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips_without_trailing_crlf() {
        let payload = empty_snapshot();
        let encoded = encode_envelope(&payload);
        assert!(!encoded.ends_with(b"\r\n"));

        let (decoded, consumed) = parse_envelope(&encoded).unwrap();
        assert_eq!(decoded, payload);
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn incomplete_payload_reports_incomplete() {
        let encoded = encode_envelope(&empty_snapshot());
        let short = &encoded[..encoded.len() - 5];
        assert!(matches!(parse_envelope(short), Err(ParseError::Incomplete)));
    }
}
