use super::value::{ParseError, Value};
use super::Result;

const CR: u8 = b'\r';
const LF: u8 = b'\n';

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == [CR, LF])
}

fn parse_line(buf: &[u8]) -> Result<(&[u8], usize)> {
    let end = find_crlf(buf).ok_or(ParseError::Incomplete)?;
    Ok((&buf[..end], end + 2))
}

fn parse_signed(line: &[u8]) -> Result<i64> {
    std::str::from_utf8(line)?
        .parse::<i64>()
        .map_err(|_| ParseError::Invalid(format!("expected integer, got {:?}", line)))
}

// Stateless between frames; a fresh Decoder is constructed per read attempt.
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Decoder { buf, pos: 0 }
    }

    pub fn consumed(&self) -> usize {
        self.pos
    }

    fn remaining(&self) -> &[u8] {
        &self.buf[self.pos..]
    }

    fn advance(&mut self, n: usize) {
        self.pos += n;
    }

    fn expect_tag(&mut self, tag: u8) -> Result<()> {
        match self.remaining().first() {
            Some(b) if *b == tag => {
                self.advance(1);
                Ok(())
            }
            Some(b) => Err(ParseError::Invalid(format!(
                "expected type byte {:?}, got {:?}",
                tag as char, *b as char
            ))),
            None => Err(ParseError::Incomplete),
        }
    }

    fn take_line(&mut self) -> Result<&'a [u8]> {
        let (line, consumed) = parse_line(self.remaining())?;
        // Reborrow against the original buffer lifetime, not `&mut self`.
        let start = self.pos;
        self.advance(consumed);
        Ok(&self.buf[start..start + line.len()])
    }

    fn take_exact(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining().len() < len + 2 {
            return Err(ParseError::Incomplete);
        }
        if &self.remaining()[len..len + 2] != [CR, LF] {
            return Err(ParseError::Invalid("bulk payload missing terminating CRLF".into()));
        }
        let start = self.pos;
        self.advance(len + 2);
        Ok(&self.buf[start..start + len])
    }

    pub fn next_array_header(&mut self) -> Result<Option<i64>> {
        self.expect_tag(b'*')?;
        let line = self.take_line()?;
        let n = parse_signed(line)?;
        Ok(if n < 0 { None } else { Some(n) })
    }

    pub fn next_bulk_string(&mut self) -> Result<Option<Vec<u8>>> {
        self.expect_tag(b'$')?;
        let line = self.take_line()?;
        let len = parse_signed(line)?;
        if len < 0 {
            return Ok(None);
        }
        let data = self.take_exact(len as usize)?;
        Ok(Some(data.to_vec()))
    }

    pub fn next_simple_string(&mut self) -> Result<String> {
        self.expect_tag(b'+')?;
        let line = self.take_line()?;
        Ok(std::str::from_utf8(line)?.to_string())
    }

    pub fn next_simple_error(&mut self) -> Result<String> {
        self.expect_tag(b'-')?;
        let line = self.take_line()?;
        Ok(std::str::from_utf8(line)?.to_string())
    }

    pub fn next_integer(&mut self) -> Result<i64> {
        self.expect_tag(b':')?;
        let line = self.take_line()?;
        parse_signed(line)
    }

    pub fn next_value(&mut self) -> Result<Value> {
        match self.remaining().first() {
            Some(b'+') => Ok(Value::SimpleString(self.next_simple_string()?)),
            Some(b'-') => Ok(Value::SimpleError(self.next_simple_error()?)),
            Some(b':') => Ok(Value::Integer(self.next_integer()?)),
            Some(b'$') => Ok(match self.next_bulk_string()? {
                Some(bytes) => Value::BulkString(bytes),
                None => Value::NullBulkString,
            }),
            Some(b'*') => {
                let len = self.next_array_header()?;
                match len {
                    None => Ok(Value::NullArray),
                    Some(n) => {
                        let mut items = Vec::with_capacity(n as usize);
                        for _ in 0..n {
                            items.push(self.next_value()?);
                        }
                        Ok(Value::Array(items))
                    }
                }
            }
            Some(b'_') => {
                self.advance(1);
                self.take_line()?;
                Ok(Value::Null)
            }
            Some(b'#') => {
                self.expect_tag(b'#')?;
                let line = self.take_line()?;
                match line {
                    b"t" => Ok(Value::Boolean(true)),
                    b"f" => Ok(Value::Boolean(false)),
                    other => Err(ParseError::Invalid(format!("invalid boolean {:?}", other))),
                }
            }
            Some(b',') => {
                self.expect_tag(b',')?;
                let line = self.take_line()?;
                let n = std::str::from_utf8(line)?
                    .parse::<f64>()
                    .map_err(|_| ParseError::Invalid(format!("invalid double {:?}", line)))?;
                Ok(Value::Double(n))
            }
            Some(b'(') => {
                self.expect_tag(b'(')?;
                let line = self.take_line()?;
                Ok(Value::BigNumber(std::str::from_utf8(line)?.to_string()))
            }
            Some(b'!') => {
                self.expect_tag(b'!')?;
                let line = self.take_line()?;
                let len = parse_signed(line)? as usize;
                let data = self.take_exact(len)?;
                Ok(Value::BulkError(data.to_vec()))
            }
            Some(b'=') => {
                self.expect_tag(b'=')?;
                let line = self.take_line()?;
                let len = parse_signed(line)? as usize;
                let data = self.take_exact(len)?;
                let fmt = std::str::from_utf8(&data[..3.min(data.len())])?.to_string();
                let rest = if data.len() > 4 { &data[4..] } else { &[] };
                Ok(Value::Verbatim(fmt, rest.to_vec()))
            }
            Some(b'%') => {
                self.expect_tag(b'%')?;
                let line = self.take_line()?;
                let n = parse_signed(line)?;
                let mut pairs = Vec::with_capacity(n as usize);
                for _ in 0..n {
                    let k = self.next_value()?;
                    let v = self.next_value()?;
                    pairs.push((k, v));
                }
                Ok(Value::Map(pairs))
            }
            Some(b'~') => {
                self.expect_tag(b'~')?;
                let line = self.take_line()?;
                let n = parse_signed(line)?;
                let mut items = Vec::with_capacity(n as usize);
                for _ in 0..n {
                    items.push(self.next_value()?);
                }
                Ok(Value::Set(items))
            }
            Some(b'>') => {
                self.expect_tag(b'>')?;
                let line = self.take_line()?;
                let n = parse_signed(line)?;
                let mut items = Vec::with_capacity(n as usize);
                for _ in 0..n {
                    items.push(self.next_value()?);
                }
                Ok(Value::Push(items))
            }
            Some(other) => Err(ParseError::Invalid(format!(
                "unrecognized type byte {:?}",
                *other as char
            ))),
            None => Err(ParseError::Incomplete),
        }
    }
}

pub fn parse_command(buf: &[u8]) -> Result<(Vec<Vec<u8>>, usize)> {
    let mut decoder = Decoder::new(buf);
    let value = decoder.next_value()?;
    let parts = match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::BulkString(bytes) => Ok(bytes),
                other => Err(ParseError::Invalid(format!(
                    "expected bulk string command part, got {:?}",
                    other
                ))),
            })
            .collect::<Result<Vec<_>>>()?,
        other => {
            return Err(ParseError::Invalid(format!(
                "expected array command frame, got {:?}",
                other
            )))
        }
    };
    if parts.is_empty() {
        return Err(ParseError::Invalid("empty command array".into()));
    }
    Ok((parts, decoder.consumed()))
}
