use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::keyspace::{Expiry, SetMode, SetRequest};
use crate::replication::snapshot;
use crate::resp::Value;

use super::{Context, Reply};

fn arity_error(name: &str) -> Reply {
    Reply::Value(Value::error(format!(
        "ERR wrong number of arguments for '{}' command",
        name.to_ascii_lowercase()
    )))
}

fn syntax_error() -> Reply {
    Reply::Value(Value::error("ERR syntax error"))
}

pub fn ping(_ctx: &mut Context, args: &[Vec<u8>]) -> Reply {
    match args.len() {
        0 => Reply::Value(Value::SimpleString("PONG".to_string())),
        1 => Reply::Value(Value::bulk(args[0].clone())),
        _ => arity_error("ping"),
    }
}

pub fn echo(_ctx: &mut Context, args: &[Vec<u8>]) -> Reply {
    match args {
        [msg] => Reply::Value(Value::bulk(msg.clone())),
        _ => arity_error("echo"),
    }
}

pub fn get(ctx: &mut Context, args: &[Vec<u8>]) -> Reply {
    let [key] = args else {
        return arity_error("get");
    };
    match ctx.server.keyspace.get(key) {
        Some(value) => Reply::Value(Value::bulk(value)),
        None => Reply::Value(Value::NullBulkString),
    }
}

// EXAT/PXAT are absolute unix timestamps; a target already in the past
// collapses to an expiry of "now".
fn resolve_expiry(token: &str, raw: &[u8]) -> Result<Expiry, ()> {
    let text = std::str::from_utf8(raw).map_err(|_| ())?;
    let n: i64 = text.parse().map_err(|_| ())?;
    if n <= 0 {
        return Err(());
    }
    let n = n as u64;

    match token {
        "EX" => Ok(Expiry::from_duration(Duration::from_secs(n))),
        "PX" => Ok(Expiry::from_duration(Duration::from_millis(n))),
        "EXAT" | "PXAT" => {
            let target = if token == "EXAT" {
                Duration::from_secs(n)
            } else {
                Duration::from_millis(n)
            };
            let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
            let remaining = target.checked_sub(now).unwrap_or(Duration::ZERO);
            Ok(Expiry::from_duration(remaining))
        }
        _ => Err(()),
    }
}

pub fn set(ctx: &mut Context, args: &[Vec<u8>]) -> Reply {
    if args.len() < 2 {
        return arity_error("set");
    }
    let key = &args[0];
    let value = &args[1];

    let mut mode = SetMode::Default;
    let mut keep_ttl = false;
    let mut want_get = false;
    let mut expiry = Expiry::Never;

    let mut i = 2;
    while i < args.len() {
        let Ok(token) = std::str::from_utf8(&args[i]) else {
            return syntax_error();
        };
        let token = token.to_ascii_uppercase();
        match token.as_str() {
            "NX" => {
                if mode == SetMode::Xx {
                    return syntax_error();
                }
                mode = SetMode::Nx;
                i += 1;
            }
            "XX" => {
                if mode == SetMode::Nx {
                    return syntax_error();
                }
                mode = SetMode::Xx;
                i += 1;
            }
            "GET" => {
                want_get = true;
                i += 1;
            }
            "KEEPTTL" => {
                keep_ttl = true;
                i += 1;
            }
            "EX" | "PX" | "EXAT" | "PXAT" => {
                let Some(raw) = args.get(i + 1) else {
                    return Reply::Value(Value::error("ERR invalid expire time in 'set' command"));
                };
                match resolve_expiry(&token, raw) {
                    Ok(e) => expiry = e,
                    Err(()) => {
                        return Reply::Value(Value::error("ERR invalid expire time in 'set' command"))
                    }
                }
                i += 2;
            }
            _ => return syntax_error(),
        }
    }

    let outcome = ctx.server.keyspace.set(SetRequest {
        key,
        value,
        expiry,
        mode,
        keep_ttl,
    });

    let reply = if want_get {
        match outcome.previous {
            Some(prev) => Value::bulk(prev),
            None => Value::NullBulkString,
        }
    } else if outcome.was_set {
        Value::ok()
    } else {
        Value::NullBulkString
    };

    Reply::Value(reply)
}

pub fn del(ctx: &mut Context, args: &[Vec<u8>]) -> Reply {
    if args.is_empty() {
        return arity_error("del");
    }
    let removed = args.iter().filter(|key| ctx.server.keyspace.delete(key)).count();
    Reply::Value(Value::Integer(removed as i64))
}

pub fn config_get(ctx: &mut Context, args: &[Vec<u8>]) -> Reply {
    let [sub, param] = args else {
        return arity_error("config|get");
    };
    if !sub.eq_ignore_ascii_case(b"GET") {
        return syntax_error();
    }
    let param_name = String::from_utf8_lossy(param).to_string();
    let reply = match ctx.server.config.get_config_param(&param_name) {
        Some(value) => Value::Array(vec![Value::bulk(param_name.into_bytes()), Value::bulk(value.into_bytes())]),
        None => Value::Array(vec![]),
    };
    Reply::Value(reply)
}

pub fn info(ctx: &mut Context, args: &[Vec<u8>]) -> Reply {
    let sections: Vec<String> = args
        .iter()
        .map(|a| String::from_utf8_lossy(a).to_string())
        .collect();
    let connected_slaves = ctx.server.replicas.lock().unwrap().count();
    let body = ctx.server.config.render_info(&sections, connected_slaves);
    Reply::Value(Value::bulk(body.into_bytes()))
}

pub fn replconf(ctx: &mut Context, args: &[Vec<u8>]) -> Reply {
    if let [key, value] = args {
        if key.eq_ignore_ascii_case(b"listening-port") {
            if let Ok(port) = String::from_utf8_lossy(value).parse::<u16>() {
                ctx.server
                    .replicas
                    .lock()
                    .unwrap()
                    .set_listening_port(&ctx.peer_addr, port);
            }
        } else if key.eq_ignore_ascii_case(b"ack") {
            if let Ok(offset) = String::from_utf8_lossy(value).parse::<u64>() {
                ctx.server.replicas.lock().unwrap().record_ack(&ctx.peer_addr, offset);
            }
            return Reply::AlreadySent;
        }
    }

    Reply::Value(Value::ok())
}

pub fn psync(ctx: &mut Context, _args: &[Vec<u8>]) -> Reply {
    let replication = ctx.server.config.replication();
    let (replid, offset) = match replication {
        crate::config::ReplicationState::Master { replid, offset } => (replid, offset),
        crate::config::ReplicationState::Replica { .. } => {
            return Reply::Value(Value::error("ERR PSYNC is not supported on a replica"))
        }
    };

    let fullresync = Value::SimpleString(format!("FULLRESYNC {replid} {offset}"));
    if ctx.conn.write_value(&fullresync).is_err() {
        return Reply::AlreadySent;
    }

    let envelope = snapshot::encode_envelope(&snapshot::empty_snapshot());
    if ctx.conn.write_raw(&envelope).is_err() {
        return Reply::AlreadySent;
    }

    if let Ok(stream) = ctx.conn.try_clone() {
        ctx.server.replicas.lock().unwrap().add(ctx.peer_addr, stream);
    }

    Reply::AlreadySent
}
