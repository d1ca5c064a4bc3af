use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use respserve::config::{Cli, Config};
use respserve::replication::handshake;
use respserve::server::{self, Server};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let port = cli.port;
    let master_address = cli.master_address().context("parsing --replicaof")?;

    let config = Config::from_cli(&cli).context("building server configuration")?;
    let server = Arc::new(Server::new(config));

    if let Some((master_host, master_port)) = master_address {
        handshake::spawn(server.clone(), master_host, master_port, port);
    }

    server::run_listener(server, port).context("running the connection listener")?;
    Ok(())
}
