//! Interactive client.
//!
//! `quill-client <server-addr> <username>`: performs the handshake,
//! prints the bootstrap document, then forwards stdin lines to the
//! server and prints every line the server sends back (broadcast deltas
//! and query responses) until DISCONNECT or EOF.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};

use quill_collab::SyncClient;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let (Some(addr), Some(username)) = (args.next(), args.next()) else {
        return Err("usage: quill-client <server-addr> <username>".into());
    };

    let (client, bootstrap) =
        tokio::time::timeout(HANDSHAKE_TIMEOUT, SyncClient::connect(&addr, &username))
            .await
            .map_err(|_| "handshake timed out")??;

    println!(
        "connected as {username} ({}), document at version {}",
        bootstrap.role, bootstrap.version
    );
    let text = bootstrap.document_text();
    print!("{text}");
    if !text.is_empty() && !text.ends_with('\n') {
        println!();
    }

    let (mut reader, mut writer) = client.split();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            server_line = reader.next_line() => {
                match server_line? {
                    Some(line) => println!("{line}"),
                    None => {
                        println!("server closed the connection");
                        break;
                    }
                }
            }
            input = stdin.next_line() => {
                match input? {
                    Some(line) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        writer.send(line).await?;
                        if line == "DISCONNECT" {
                            break;
                        }
                    }
                    None => {
                        writer.send("DISCONNECT").await?;
                        break;
                    }
                }
            }
        }
    }
    Ok(())
}
