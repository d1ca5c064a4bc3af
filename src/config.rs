use std::sync::RwLock;

use clap::Parser;
use rand::Rng;

#[derive(Parser, Debug)]
#[command(version, about = "A concurrent, in-memory RESP key-value server", long_about = None)]
pub struct Cli {
    #[arg(short, long, default_value_t = 6379)]
    pub port: u16,
    #[arg(long)]
    pub replicaof: Option<String>,
    #[arg(long, default_value = "")]
    pub dir: String,
    #[arg(long, default_value = "")]
    pub dbfilename: String,
}

impl Cli {
    pub fn master_address(&self) -> anyhow::Result<Option<(String, u16)>> {
        let Some(addr) = &self.replicaof else {
            return Ok(None);
        };
        let parts: Vec<&str> = addr.split_whitespace().collect();
        match parts.as_slice() {
            [host, port] => {
                let port: u16 = port
                    .parse()
                    .map_err(|_| anyhow::anyhow!("--replicaof port {:?} is not numeric", port))?;
                Ok(Some((host.to_string(), port)))
            }
            _ => Err(anyhow::anyhow!(
                "--replicaof must be in the form \"<host> <port>\", got {:?}",
                addr
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerState {
    pub port: u16,
    pub dir: String,
    pub dbfilename: String,
}

#[derive(Debug, Clone)]
pub enum ReplicationState {
    Master {
        replid: String,
        offset: u64,
    },
    Replica {
        master_host: String,
        master_port: u16,
        replid: String,
        offset: u64,
    },
}

impl ReplicationState {
    pub fn is_master(&self) -> bool {
        matches!(self, ReplicationState::Master { .. })
    }
}

struct Inner {
    server: ServerState,
    replication: ReplicationState,
}

pub struct Config {
    inner: RwLock<Inner>,
}

impl Config {
    pub fn from_cli(cli: &Cli) -> anyhow::Result<Config> {
        let server = ServerState {
            port: cli.port,
            dir: cli.dir.clone(),
            dbfilename: cli.dbfilename.clone(),
        };
        let replication = match cli.master_address()? {
            Some((master_host, master_port)) => ReplicationState::Replica {
                master_host,
                master_port,
                replid: "?".to_string(),
                offset: 0,
            },
            None => ReplicationState::Master {
                replid: generate_replid(),
                offset: 0,
            },
        };
        Ok(Config {
            inner: RwLock::new(Inner { server, replication }),
        })
    }

    pub fn server(&self) -> ServerState {
        self.inner.read().unwrap().server.clone()
    }

    pub fn replication(&self) -> ReplicationState {
        self.inner.read().unwrap().replication.clone()
    }

    pub fn is_master(&self) -> bool {
        self.inner.read().unwrap().replication.is_master()
    }

    // No-op (returns 0) if this config is not a master's.
    pub fn advance_master_offset(&self, n: u64) -> u64 {
        let mut inner = self.inner.write().unwrap();
        if let ReplicationState::Master { offset, .. } = &mut inner.replication {
            *offset += n;
            *offset
        } else {
            0
        }
    }

    pub fn apply_fullresync(&self, replid: String, offset: u64) {
        let mut inner = self.inner.write().unwrap();
        if let ReplicationState::Replica {
            replid: r, offset: o, ..
        } = &mut inner.replication
        {
            *r = replid;
            *o = offset;
        }
    }

    pub fn get_config_param(&self, name: &str) -> Option<String> {
        let server = &self.inner.read().unwrap().server;
        match name.to_ascii_lowercase().as_str() {
            "dir" => Some(server.dir.clone()),
            "dbfilename" => Some(server.dbfilename.clone()),
            _ => None,
        }
    }

    pub fn render_info(&self, sections: &[String], connected_slaves: usize) -> String {
        let want = |name: &str| sections.is_empty() || sections.iter().any(|s| s.eq_ignore_ascii_case(name));
        let inner = self.inner.read().unwrap();
        let mut out = String::new();

        if want("server") {
            out.push_str("# Server\r\n");
            out.push_str(&format!("tcp_port:{}\r\n", inner.server.port));
        }

        if want("replication") {
            out.push_str("# Replication\r\n");
            match &inner.replication {
                ReplicationState::Master { replid, offset } => {
                    out.push_str("role:master\r\n");
                    out.push_str(&format!("connected_slaves:{connected_slaves}\r\n"));
                    out.push_str(&format!("master_replid:{replid}\r\n"));
                    out.push_str(&format!("master_repl_offset:{offset}\r\n"));
                }
                ReplicationState::Replica {
                    master_host,
                    master_port,
                    replid,
                    offset,
                } => {
                    out.push_str("role:slave\r\n");
                    out.push_str(&format!("master_host:{master_host}\r\n"));
                    out.push_str(&format!("master_port:{master_port}\r\n"));
                    out.push_str(&format!("master_replid:{replid}\r\n"));
                    out.push_str(&format!("master_repl_offset:{offset}\r\n"));
                }
            }
        }

        out
    }
}

fn generate_replid() -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut rng = rand::thread_rng();
    (0..40).map(|_| HEX[rng.gen_range(0..16)] as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replid_is_forty_hex_characters() {
        let id = generate_replid();
        assert_eq!(id.len(), 40);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn master_address_rejects_non_numeric_port() {
        let cli = Cli {
            port: 6379,
            replicaof: Some("localhost notaport".to_string()),
            dir: String::new(),
            dbfilename: String::new(),
        };
        assert!(cli.master_address().is_err());
    }

    #[test]
    fn master_address_parses_host_and_port() {
        let cli = Cli {
            port: 6379,
            replicaof: Some("localhost 6380".to_string()),
            dir: String::new(),
            dbfilename: String::new(),
        };
        assert_eq!(
            cli.master_address().unwrap(),
            Some(("localhost".to_string(), 6380))
        );
    }

    #[test]
    fn offset_advances_monotonically_on_master() {
        let cli = Cli {
            port: 6379,
            replicaof: None,
            dir: String::new(),
            dbfilename: String::new(),
        };
        let cfg = Config::from_cli(&cli).unwrap();
        assert_eq!(cfg.advance_master_offset(10), 10);
        assert_eq!(cfg.advance_master_offset(5), 15);
    }
}
