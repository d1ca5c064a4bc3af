use std::num::ParseIntError;
use std::str::Utf8Error;

use thiserror::Error;

const CRLF: &[u8] = b"\r\n";

// Only the first five variants appear in replies and command frames; the
// rest are recognized on decode so the parser never chokes on them.
#[derive(Debug, PartialEq, Clone)]
pub enum Value {
    SimpleString(String),
    SimpleError(String),
    Integer(i64),
    BulkString(Vec<u8>),
    NullBulkString,
    Array(Vec<Value>),
    NullArray,
    Null,
    Boolean(bool),
    Double(f64),
    BigNumber(String),
    BulkError(Vec<u8>),
    Verbatim(String, Vec<u8>),
    Map(Vec<(Value, Value)>),
    Set(Vec<Value>),
    Push(Vec<Value>),
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("need more data to decode a complete frame")]
    Incomplete,
    #[error("malformed RESP frame: {0}")]
    Invalid(String),
}

impl From<ParseIntError> for ParseError {
    fn from(e: ParseIntError) -> Self {
        ParseError::Invalid(e.to_string())
    }
}

impl From<Utf8Error> for ParseError {
    fn from(e: Utf8Error) -> Self {
        ParseError::Invalid(e.to_string())
    }
}

impl Value {
    pub fn ok() -> Value {
        Value::SimpleString("OK".to_string())
    }

    pub fn error(msg: impl Into<String>) -> Value {
        Value::SimpleError(msg.into())
    }

    pub fn bulk(bytes: impl Into<Vec<u8>>) -> Value {
        Value::BulkString(bytes.into())
    }

    pub fn command(parts: &[&[u8]]) -> Value {
        Value::Array(parts.iter().map(|p| Value::BulkString(p.to_vec())).collect())
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Value::SimpleString(s) => simple(b'+', s.as_bytes()),
            Value::SimpleError(s) => simple(b'-', s.as_bytes()),
            Value::Integer(n) => simple(b':', n.to_string().as_bytes()),
            Value::BulkString(bytes) => bulk(bytes),
            Value::NullBulkString => b"$-1\r\n".to_vec(),
            Value::Array(items) => {
                let mut out = format!("*{}\r\n", items.len()).into_bytes();
                for item in items {
                    out.extend(item.encode());
                }
                out
            }
            Value::NullArray => b"*-1\r\n".to_vec(),
            Value::Null => b"_\r\n".to_vec(),
            Value::Boolean(b) => simple(b'#', if *b { b"t" } else { b"f" }),
            Value::Double(d) => simple(b',', d.to_string().as_bytes()),
            Value::BigNumber(s) => simple(b'(', s.as_bytes()),
            Value::BulkError(bytes) => {
                let mut out = format!("!{}\r\n", bytes.len()).into_bytes();
                out.extend_from_slice(bytes);
                out.extend_from_slice(CRLF);
                out
            }
            Value::Verbatim(fmt, bytes) => {
                let payload_len = fmt.len() + 1 + bytes.len();
                let mut out = format!("={}\r\n{}:", payload_len, fmt).into_bytes();
                out.extend_from_slice(bytes);
                out.extend_from_slice(CRLF);
                out
            }
            Value::Map(pairs) => {
                let mut out = format!("%{}\r\n", pairs.len()).into_bytes();
                for (k, v) in pairs {
                    out.extend(k.encode());
                    out.extend(v.encode());
                }
                out
            }
            Value::Set(items) => {
                let mut out = format!("~{}\r\n", items.len()).into_bytes();
                for item in items {
                    out.extend(item.encode());
                }
                out
            }
            Value::Push(items) => {
                let mut out = format!(">{}\r\n", items.len()).into_bytes();
                for item in items {
                    out.extend(item.encode());
                }
                out
            }
        }
    }
}

fn simple(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 3);
    out.push(tag);
    out.extend_from_slice(body);
    out.extend_from_slice(CRLF);
    out
}

fn bulk(bytes: &[u8]) -> Vec<u8> {
    let mut out = format!("${}\r\n", bytes.len()).into_bytes();
    out.extend_from_slice(bytes);
    out.extend_from_slice(CRLF);
    out
}
