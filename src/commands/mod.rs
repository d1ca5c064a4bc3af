mod handlers;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::OnceLock;

use crate::network::connection::{Connection, ConnectionError};
use crate::resp::Value;
use crate::server::Server;

// Replicated commands never get a reply and are never re-fanned-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Client,
    MasterStream,
}

pub struct Context<'a> {
    pub server: &'a Server,
    pub conn: &'a mut Connection,
    pub source: Source,
    pub peer_addr: SocketAddr,
}

// AlreadySent covers PSYNC, which writes its own reply plus the snapshot
// envelope and can't be represented as one Value.
pub enum Reply {
    Value(Value),
    AlreadySent,
}

type HandlerFn = fn(&mut Context, &[Vec<u8>]) -> Reply;

pub struct CommandSpec {
    pub is_write: bool,
    handler: HandlerFn,
}

pub struct Registry {
    commands: HashMap<&'static str, CommandSpec>,
}

impl Registry {
    fn new() -> Self {
        let mut commands = HashMap::new();
        let mut add = |name: &'static str, is_write: bool, handler: HandlerFn| {
            commands.insert(name, CommandSpec { is_write, handler });
        };

        add("PING", false, handlers::ping);
        add("ECHO", false, handlers::echo);
        add("GET", false, handlers::get);
        add("SET", true, handlers::set);
        add("DEL", true, handlers::del);
        add("CONFIG", false, handlers::config_get);
        add("INFO", false, handlers::info);
        add("REPLCONF", false, handlers::replconf);
        add("PSYNC", false, handlers::psync);

        Registry { commands }
    }

    pub fn lookup(&self, name: &str) -> Option<&CommandSpec> {
        self.commands.get(name)
    }
}

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(Registry::new)
}

pub fn dispatch(ctx: &mut Context, parts: &[Vec<u8>]) -> Result<(), ConnectionError> {
    let (name_bytes, args) = parts.split_first().expect("command frame is never empty");
    let name = String::from_utf8_lossy(name_bytes).to_ascii_uppercase();

    let Some(spec) = registry().lookup(name.as_str()) else {
        if ctx.source == Source::Client {
            ctx.conn
                .write_value(&Value::error(format!("ERR unknown command '{name}'")))?;
        }
        return Ok(());
    };

    let reply = (spec.handler)(ctx, args);

    if ctx.source == Source::Client {
        if let Reply::Value(value) = &reply {
            ctx.conn.write_value(value)?;
        }

        if spec.is_write && ctx.server.config.is_master() {
            let mut encoded_parts: Vec<&[u8]> = Vec::with_capacity(parts.len());
            encoded_parts.push(name_bytes.as_slice());
            encoded_parts.extend(args.iter().map(|a| a.as_slice()));
            let encoded = Value::command(&encoded_parts).encode();

            ctx.server.config.advance_master_offset(encoded.len() as u64);
            ctx.server.replicas.lock().unwrap().propagate(&encoded);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::{TcpListener, TcpStream};
    use std::sync::Arc;
    use std::time::Duration;

    use crate::config::{Cli, Config};
    use crate::resp::{Decoder, Value};

    fn test_server() -> Arc<Server> {
        let cli = Cli {
            port: 6379,
            replicaof: None,
            dir: String::new(),
            dbfilename: String::new(),
        };
        let config = Config::from_cli(&cli).unwrap();
        Arc::new(Server::new(config))
    }

    fn socket_pair() -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server_side, _) = listener.accept().unwrap();
        (Connection::new(server_side), client)
    }

    fn read_reply(client: &mut TcpStream) -> Value {
        let mut buf = [0u8; 4096];
        let n = client.read(&mut buf).expect("expected a reply");
        let mut d = Decoder::new(&buf[..n]);
        d.next_value().unwrap()
    }

    fn run(server: &Arc<Server>, conn: &mut Connection, parts: &[&[u8]], source: Source) {
        let peer_addr = conn.peer_addr().unwrap();
        let owned: Vec<Vec<u8>> = parts.iter().map(|p| p.to_vec()).collect();
        let mut ctx = Context {
            server,
            conn,
            source,
            peer_addr,
        };
        dispatch(&mut ctx, &owned).unwrap();
    }

    #[test]
    fn ping_with_no_args_replies_pong() {
        let server = test_server();
        let (mut conn, mut client) = socket_pair();
        run(&server, &mut conn, &[b"PING"], Source::Client);
        assert_eq!(read_reply(&mut client), Value::SimpleString("PONG".into()));
    }

    #[test]
    fn ping_with_too_many_args_is_an_arity_error() {
        let server = test_server();
        let (mut conn, mut client) = socket_pair();
        run(&server, &mut conn, &[b"PING", b"a", b"b"], Source::Client);
        match read_reply(&mut client) {
            Value::SimpleError(msg) => assert!(msg.contains("wrong number of arguments")),
            other => panic!("expected an arity error, got {other:?}"),
        }
    }

    #[test]
    fn set_then_get_round_trips_through_dispatch() {
        let server = test_server();
        let (mut conn, mut client) = socket_pair();
        run(&server, &mut conn, &[b"SET", b"foo", b"bar"], Source::Client);
        assert_eq!(read_reply(&mut client), Value::ok());

        run(&server, &mut conn, &[b"GET", b"foo"], Source::Client);
        assert_eq!(read_reply(&mut client), Value::bulk(b"bar".to_vec()));
    }

    #[test]
    fn set_nx_on_existing_key_replies_null_and_keeps_the_old_value() {
        let server = test_server();
        let (mut conn, mut client) = socket_pair();
        run(&server, &mut conn, &[b"SET", b"k", b"1"], Source::Client);
        read_reply(&mut client);

        run(&server, &mut conn, &[b"SET", b"k", b"2", b"NX"], Source::Client);
        assert_eq!(read_reply(&mut client), Value::NullBulkString);

        run(&server, &mut conn, &[b"GET", b"k"], Source::Client);
        assert_eq!(read_reply(&mut client), Value::bulk(b"1".to_vec()));
    }

    #[test]
    fn del_replies_count_of_keys_actually_removed() {
        let server = test_server();
        let (mut conn, mut client) = socket_pair();
        run(&server, &mut conn, &[b"SET", b"a", b"1"], Source::Client);
        read_reply(&mut client);
        run(&server, &mut conn, &[b"SET", b"b", b"2"], Source::Client);
        read_reply(&mut client);

        run(&server, &mut conn, &[b"DEL", b"a", b"b", b"c"], Source::Client);
        assert_eq!(read_reply(&mut client), Value::Integer(2));
    }

    #[test]
    fn unknown_command_replies_err_unknown_command() {
        let server = test_server();
        let (mut conn, mut client) = socket_pair();
        run(&server, &mut conn, &[b"FROBNICATE"], Source::Client);
        match read_reply(&mut client) {
            Value::SimpleError(msg) => assert!(msg.contains("unknown command")),
            other => panic!("expected an unknown-command error, got {other:?}"),
        }
    }

    #[test]
    fn commands_from_the_master_stream_produce_no_reply() {
        let server = test_server();
        let (mut conn, mut client) = socket_pair();
        client.set_read_timeout(Some(Duration::from_millis(50))).unwrap();

        run(&server, &mut conn, &[b"SET", b"k", b"v"], Source::MasterStream);

        let mut buf = [0u8; 16];
        let err = client.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::WouldBlock);

        // The mutation still applied even though no reply was written.
        run(&server, &mut conn, &[b"GET", b"k"], Source::Client);
        assert_eq!(read_reply(&mut client), Value::bulk(b"v".to_vec()));
    }

    #[test]
    fn master_stream_writes_never_fan_out_to_replicas() {
        let server = test_server();
        let (mut conn, mut client) = socket_pair();
        client.set_read_timeout(Some(Duration::from_millis(50))).unwrap();

        let (replica_conn, mut replica_client) = socket_pair();
        let replica_addr = replica_conn.peer_addr().unwrap();
        server
            .replicas
            .lock()
            .unwrap()
            .add(replica_addr, replica_conn.try_clone().unwrap());

        run(&server, &mut conn, &[b"SET", b"k", b"v"], Source::MasterStream);
        drop(client);

        let mut buf = [0u8; 16];
        replica_client
            .set_read_timeout(Some(Duration::from_millis(50)))
            .unwrap();
        let err = replica_client.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::WouldBlock);
    }

    #[test]
    fn client_write_commands_fan_out_to_attached_replicas_and_advance_offset() {
        let server = test_server();
        let (mut conn, mut client) = socket_pair();

        let (replica_conn, mut replica_client) = socket_pair();
        let replica_addr = replica_conn.peer_addr().unwrap();
        server
            .replicas
            .lock()
            .unwrap()
            .add(replica_addr, replica_conn.try_clone().unwrap());

        let offset_before = match server.config.replication() {
            crate::config::ReplicationState::Master { offset, .. } => offset,
            _ => unreachable!(),
        };

        run(&server, &mut conn, &[b"SET", b"k", b"v"], Source::Client);
        read_reply(&mut client);

        replica_client
            .set_read_timeout(Some(Duration::from_secs(1)))
            .unwrap();
        let mut buf = [0u8; 256];
        let n = replica_client
            .read(&mut buf)
            .expect("replica should receive the fanned-out command");
        let mut d = Decoder::new(&buf[..n]);
        assert_eq!(d.next_value().unwrap(), Value::command(&[b"SET", b"k", b"v"]));

        let offset_after = match server.config.replication() {
            crate::config::ReplicationState::Master { offset, .. } => offset,
            _ => unreachable!(),
        };
        assert_eq!(offset_after - offset_before, n as u64);
    }

    #[test]
    fn set_rejects_combining_nx_and_xx() {
        let server = test_server();
        let (mut conn, mut client) = socket_pair();
        run(&server, &mut conn, &[b"SET", b"k", b"v", b"NX", b"XX"], Source::Client);
        match read_reply(&mut client) {
            Value::SimpleError(msg) => assert_eq!(msg, "ERR syntax error"),
            other => panic!("expected a syntax error, got {other:?}"),
        }
    }

    #[test]
    fn set_rejects_non_positive_expire_time() {
        let server = test_server();
        let (mut conn, mut client) = socket_pair();
        run(&server, &mut conn, &[b"SET", b"k", b"v", b"EX", b"0"], Source::Client);
        match read_reply(&mut client) {
            Value::SimpleError(msg) => assert!(msg.contains("invalid expire time")),
            other => panic!("expected an invalid-expire-time error, got {other:?}"),
        }
    }

    #[test]
    fn set_get_modifier_replies_the_previous_value_then_replaces_it() {
        let server = test_server();
        let (mut conn, mut client) = socket_pair();
        run(&server, &mut conn, &[b"SET", b"k", b"old"], Source::Client);
        read_reply(&mut client);

        run(&server, &mut conn, &[b"SET", b"k", b"new", b"GET"], Source::Client);
        assert_eq!(read_reply(&mut client), Value::bulk(b"old".to_vec()));

        run(&server, &mut conn, &[b"GET", b"k"], Source::Client);
        assert_eq!(read_reply(&mut client), Value::bulk(b"new".to_vec()));
    }

    #[test]
    fn set_px_then_wait_makes_a_subsequent_get_return_null_bulk() {
        let server = test_server();
        let (mut conn, mut client) = socket_pair();
        run(&server, &mut conn, &[b"SET", b"k", b"v", b"PX", b"10"], Source::Client);
        read_reply(&mut client);

        std::thread::sleep(Duration::from_millis(50));

        run(&server, &mut conn, &[b"GET", b"k"], Source::Client);
        assert_eq!(read_reply(&mut client), Value::NullBulkString);
    }

    #[test]
    fn config_get_replies_the_recognized_dir_parameter() {
        let server = test_server();
        let (mut conn, mut client) = socket_pair();
        run(&server, &mut conn, &[b"CONFIG", b"GET", b"dir"], Source::Client);
        assert_eq!(
            read_reply(&mut client),
            Value::Array(vec![Value::bulk(b"dir".to_vec()), Value::bulk(b"".to_vec())])
        );
    }

    #[test]
    fn info_with_no_sections_reports_both_server_and_replication() {
        let server = test_server();
        let (mut conn, mut client) = socket_pair();
        run(&server, &mut conn, &[b"INFO"], Source::Client);
        match read_reply(&mut client) {
            Value::BulkString(body) => {
                let text = String::from_utf8(body).unwrap();
                assert!(text.contains("# Server"));
                assert!(text.contains("# Replication"));
                assert!(text.contains("role:master"));
            }
            other => panic!("expected a bulk string, got {other:?}"),
        }
    }
}
