use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};

use thiserror::Error;

use crate::replication::snapshot;
use crate::resp::{self, ParseError, Value};

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Parse(#[from] ParseError),
}

pub type Result<T> = std::result::Result<T, ConnectionError>;

const INITIAL_CAPACITY: usize = 4096;

pub struct Connection {
    stream: TcpStream,
    buf: Vec<u8>,
    filled: usize,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        Connection {
            stream,
            buf: vec![0; INITIAL_CAPACITY],
            filled: 0,
        }
    }

    pub fn peer_addr(&self) -> std::io::Result<SocketAddr> {
        self.stream.peer_addr()
    }

    pub fn try_clone(&self) -> std::io::Result<TcpStream> {
        self.stream.try_clone()
    }

    fn fill_more(&mut self) -> Result<()> {
        if self.filled == self.buf.len() {
            self.buf.resize(self.buf.len() * 2, 0);
        }
        let n = self.stream.read(&mut self.buf[self.filled..])?;
        if n == 0 {
            return Err(ConnectionError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed by peer",
            )));
        }
        self.filled += n;
        Ok(())
    }

    fn consume(&mut self, n: usize) {
        self.buf.copy_within(n..self.filled, 0);
        self.filled -= n;
    }

    // Ok(None) means a clean peer-initiated close before any new bytes arrived.
    pub fn read_command(&mut self) -> Result<Option<Vec<Vec<u8>>>> {
        loop {
            match resp::parse_command(&self.buf[..self.filled]) {
                Ok((parts, len)) => {
                    self.consume(len);
                    return Ok(Some(parts));
                }
                Err(ParseError::Incomplete) => match self.fill_more() {
                    Ok(()) => continue,
                    Err(ConnectionError::Io(e))
                        if e.kind() == std::io::ErrorKind::UnexpectedEof && self.filled == 0 =>
                    {
                        return Ok(None)
                    }
                    Err(e) => return Err(e),
                },
                Err(e) => return Err(ConnectionError::Parse(e)),
            }
        }
    }

    pub fn read_snapshot(&mut self) -> Result<Vec<u8>> {
        loop {
            match snapshot::parse_envelope(&self.buf[..self.filled]) {
                Ok((payload, len)) => {
                    self.consume(len);
                    return Ok(payload);
                }
                Err(ParseError::Incomplete) => self.fill_more()?,
                Err(e) => return Err(ConnectionError::Parse(e)),
            }
        }
    }

    pub fn read_value(&mut self) -> Result<Value> {
        loop {
            let mut decoder = resp::Decoder::new(&self.buf[..self.filled]);
            match decoder.next_value() {
                Ok(value) => {
                    let len = decoder.consumed();
                    self.consume(len);
                    return Ok(value);
                }
                Err(ParseError::Incomplete) => self.fill_more()?,
                Err(e) => return Err(ConnectionError::Parse(e)),
            }
        }
    }

    pub fn write_value(&mut self, value: &Value) -> Result<()> {
        self.stream.write_all(&value.encode())?;
        Ok(())
    }

    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes)?;
        Ok(())
    }
}
