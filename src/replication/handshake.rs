use std::net::TcpStream;
use std::sync::Arc;
use std::thread;

use thiserror::Error;

use crate::commands::Source;
use crate::network::connection::{Connection, ConnectionError};
use crate::resp::Value;
use crate::server::{self, Server};

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("could not reach master: {0}")]
    Io(#[from] std::io::Error),
    #[error("connection error during handshake: {0}")]
    Connection(#[from] ConnectionError),
    #[error("master sent an unexpected reply to {step}: {reply:?}")]
    UnexpectedReply { step: &'static str, reply: Value },
    #[error("malformed FULLRESYNC reply: {0:?}")]
    MalformedFullresync(String),
}

fn expect_simple_string(conn: &mut Connection, step: &'static str) -> Result<String, HandshakeError> {
    match conn.read_value()? {
        Value::SimpleString(s) => Ok(s),
        other => Err(HandshakeError::UnexpectedReply { step, reply: other }),
    }
}

fn send_command(conn: &mut Connection, parts: &[&[u8]]) -> Result<(), HandshakeError> {
    conn.write_value(&Value::command(parts))?;
    Ok(())
}

// "FULLRESYNC <replid> <offset>" -> (replid, offset)
fn parse_fullresync(line: &str) -> Result<(String, u64), HandshakeError> {
    let mut parts = line.split_whitespace();
    let keyword = parts.next();
    let replid = parts.next();
    let offset = parts.next();
    match (keyword, replid, offset) {
        (Some("FULLRESYNC"), Some(replid), Some(offset)) => {
            let offset: u64 = offset
                .parse()
                .map_err(|_| HandshakeError::MalformedFullresync(line.to_string()))?;
            Ok((replid.to_string(), offset))
        }
        _ => Err(HandshakeError::MalformedFullresync(line.to_string())),
    }
}

pub fn run(server: Arc<Server>, master_host: String, master_port: u16, own_port: u16) {
    if let Err(e) = try_run(&server, &master_host, master_port, own_port) {
        eprintln!("ERROR: replication handshake with {master_host}:{master_port} failed: {e}");
    }
}

fn try_run(
    server: &Arc<Server>,
    master_host: &str,
    master_port: u16,
    own_port: u16,
) -> Result<(), HandshakeError> {
    let stream = TcpStream::connect((master_host, master_port))?;
    let peer_addr = stream.peer_addr()?;
    let mut conn = Connection::new(stream);

    send_command(&mut conn, &[b"PING"])?;
    expect_simple_string(&mut conn, "PING")?;

    let port_str = own_port.to_string();
    send_command(
        &mut conn,
        &[b"REPLCONF", b"listening-port", port_str.as_bytes()],
    )?;
    expect_simple_string(&mut conn, "REPLCONF listening-port")?;

    send_command(&mut conn, &[b"REPLCONF", b"capa", b"eof", b"capa", b"psync2"])?;
    expect_simple_string(&mut conn, "REPLCONF capa")?;

    send_command(&mut conn, &[b"PSYNC", b"?", b"-1"])?;
    let fullresync = expect_simple_string(&mut conn, "PSYNC")?;
    let (replid, offset) = parse_fullresync(&fullresync)?;

    conn.read_snapshot()?;

    server.config.apply_fullresync(replid, offset);
    println!("INFO: full resync with {master_host}:{master_port} complete, applying master stream");

    server::run_command_loop(&mut conn, server, peer_addr, Source::MasterStream);
    Ok(())
}

pub fn spawn(server: Arc<Server>, master_host: String, master_port: u16, own_port: u16) {
    thread::spawn(move || run(server, master_host, master_port, own_port));
}
