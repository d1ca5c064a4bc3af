use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::commands::{self, Context, Source};
use crate::config::Config;
use crate::keyspace::Keyspace;
use crate::network::connection::Connection;
use crate::replication::ReplicaTable;

pub struct Server {
    pub config: Config,
    pub keyspace: Keyspace,
    pub replicas: Mutex<ReplicaTable>,
}

impl Server {
    pub fn new(config: Config) -> Server {
        Server {
            config,
            keyspace: Keyspace::new(),
            replicas: Mutex::new(ReplicaTable::new()),
        }
    }
}

pub fn run_listener(server: Arc<Server>, port: u16) -> std::io::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port))?;
    println!("INFO: listening on port {port}");

    for incoming in listener.incoming() {
        match incoming {
            Ok(stream) => {
                let server = server.clone();
                thread::spawn(move || serve_client(stream, server));
            }
            Err(e) => eprintln!("ERROR: failed to accept a connection: {e}"),
        }
    }
    Ok(())
}

fn serve_client(stream: TcpStream, server: Arc<Server>) {
    let peer_addr = match stream.peer_addr() {
        Ok(addr) => addr,
        Err(e) => {
            eprintln!("ERROR: failed to read peer address: {e}");
            return;
        }
    };
    println!("INFO: accepted connection from {peer_addr}");

    let mut conn = Connection::new(stream);
    run_command_loop(&mut conn, &server, peer_addr, Source::Client);

    server.replicas.lock().unwrap().remove(&peer_addr);
}

pub fn run_command_loop(
    conn: &mut Connection,
    server: &Arc<Server>,
    peer_addr: SocketAddr,
    source: Source,
) {
    loop {
        let parts = match conn.read_command() {
            Ok(Some(parts)) => parts,
            Ok(None) => {
                println!("INFO: connection {peer_addr} closed");
                return;
            }
            Err(e) => {
                eprintln!("ERROR: failed to read command from {peer_addr}: {e}");
                if source == Source::Client {
                    let _ = conn.write_value(&crate::resp::Value::error("ERR failed to parse command"));
                }
                return;
            }
        };

        let mut ctx = Context {
            server,
            conn,
            source,
            peer_addr,
        };

        if let Err(e) = commands::dispatch(&mut ctx, &parts) {
            eprintln!("ERROR: failed to write reply to {peer_addr}: {e}");
            return;
        }
    }
}
