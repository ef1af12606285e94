//! Operator console on stdin.
//!
//! `QUIT` shuts the server down, but only once every session has left.
//! `DOC?` and `LOG?` are answered locally. Any other line is enqueued as
//! user `server`; like every queued command, its write capability
//! resolves through the role store, so list `server write` in the roles
//! file to edit from the console.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use quill_collab::{protocol, ServerContext};

pub async fn run(ctx: Arc<ServerContext>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if handle_line(&ctx, line.trim()).await {
                    break;
                }
            }
            Ok(None) => {
                log::info!("console stdin closed");
                break;
            }
            Err(err) => {
                log::error!("console read failed: {err}");
                break;
            }
        }
    }
}

/// Returns `true` when the console loop should stop.
async fn handle_line(ctx: &Arc<ServerContext>, line: &str) -> bool {
    match line {
        "" => false,
        "QUIT" => {
            let active = ctx.registry.active_count().await;
            if active > 0 {
                println!("QUIT rejected, {active} session(s) still connected");
                false
            } else {
                log::info!("operator requested shutdown");
                ctx.shutdown();
                true
            }
        }
        "DOC?" => {
            let flattened = ctx.document.read().await.flatten_text();
            print!("{}", protocol::doc_response(&flattened));
            false
        }
        "LOG?" => {
            let contents = ctx.audit.contents().await;
            print!("{}", protocol::log_response(&contents));
            false
        }
        _ => {
            if !ctx.queue.enqueue("server", line).await {
                log::warn!("command queue full, operator command dropped");
            }
            false
        }
    }
}
