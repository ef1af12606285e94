//! Snapshot writer for the committed document.
//!
//! Written on server shutdown and on every session disconnect. The
//! exclusive document lock is held for the whole write: concurrent
//! disconnects must not interleave on the snapshot file.

use std::io;

use crate::server::ServerContext;

pub async fn write_snapshot(ctx: &ServerContext) -> io::Result<()> {
    let doc = ctx.document.write().await;
    let bytes = doc.flatten();
    tokio::fs::write(&ctx.config.snapshot_path, &bytes).await?;
    log::debug!(
        "snapshot: {} bytes to {}",
        bytes.len(),
        ctx.config.snapshot_path.display()
    );
    Ok(())
}
