//! Server entry point.
//!
//! One positional argument: the broadcast interval in milliseconds. The
//! bound address is printed on stdout so the launching process can hand
//! it to clients. Operator commands are read from stdin.

mod console;

use std::time::Duration;

use quill_collab::{CollabServer, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let interval_ms: u64 = match std::env::args().nth(1) {
        Some(arg) => arg
            .parse()
            .map_err(|_| format!("invalid broadcast interval: {arg}"))?,
        None => return Err("usage: quill-server <broadcast-interval-ms>".into()),
    };

    let config = ServerConfig {
        broadcast_interval: Duration::from_millis(interval_ms),
        ..ServerConfig::default()
    };
    let server = CollabServer::new(config);

    tokio::spawn(console::run(server.context()));
    server.run().await?;
    Ok(())
}
