//! The batch/commit/broadcast loop.
//!
//! One tick per broadcast interval:
//!
//! 1. detach the command queue
//! 2. take the document write lock
//! 3. apply every record in arrival order, collecting per-command results
//! 4. commit, producing exactly one new version for the whole batch
//! 5. append the rendered delta to the audit log
//! 6. push the delta to every active session
//!
//! All commands of a batch share the committed baseline as coordinate
//! system, so their positions are stable against each other. Rejected
//! commands still consume a delta line; that is the audit contract.
//!
//! Lock order when several are needed: queue, document, registry, audit.

use std::collections::HashMap;
use std::sync::Arc;

use quill_core::Document;

use crate::protocol::{Command, CommandOutcome, Delta, DeltaEntry};
use crate::queue::QueuedCommand;
use crate::roles::Role;
use crate::server::ServerContext;

/// Runs the tick loop until shutdown is signalled.
pub async fn run(ctx: Arc<ServerContext>) {
    // interval_at: the first tick comes one full interval after start.
    let mut ticker = tokio::time::interval_at(
        tokio::time::Instant::now() + ctx.config.broadcast_interval,
        ctx.config.broadcast_interval,
    );
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut shutdown = ctx.shutdown_signal();
    log::info!(
        "batch loop running, interval {:?}",
        ctx.config.broadcast_interval
    );
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tick(&ctx).await;
            }
            _ = shutdown.changed() => break,
        }
    }
    log::info!("batch loop stopped");
}

/// One tick: drain, apply, commit, log, broadcast. Returns the rendered
/// delta, or `None` when the queue was empty and nothing happened.
pub async fn tick(ctx: &ServerContext) -> Option<Arc<str>> {
    let records = ctx.queue.drain().await;
    if records.is_empty() {
        return None;
    }

    let mut doc = ctx.document.write().await;

    // Resolve each submitter's write capability once per batch: an active
    // session wins, otherwise the role store decides (this is how the
    // operator console submits without holding a session slot).
    let mut capability: HashMap<&str, bool> = HashMap::new();
    for record in &records {
        if !capability.contains_key(record.user.as_str()) {
            let allowed = ctx.registry.can_write(&record.user).await
                || ctx
                    .roles
                    .lookup(&record.user)
                    .is_some_and(Role::can_write);
            capability.insert(&record.user, allowed);
        }
    }

    let delta = apply_batch(&mut doc, &records, |user| {
        capability.get(user).copied().unwrap_or(false)
    });
    let rendered: Arc<str> = Arc::from(delta.to_string());

    ctx.audit.append(&rendered).await;
    let delivered = ctx.registry.broadcast(rendered.clone()).await;
    log::debug!(
        "version {} committed: {} command(s), {} session(s) notified",
        delta.version,
        delta.entries.len(),
        delivered
    );
    Some(rendered)
}

/// Applies a drained batch against the document and commits it as one
/// new version. Pure and synchronous so the scenarios are testable
/// without a running server.
pub fn apply_batch(
    doc: &mut Document,
    records: &[QueuedCommand],
    can_write: impl Fn(&str) -> bool,
) -> Delta {
    let old_version = doc.version();
    let mut entries = Vec::with_capacity(records.len());
    for record in records {
        let outcome = apply_record(doc, record, &can_write);
        if outcome != CommandOutcome::Success {
            log::debug!("command from {} rejected: {outcome} ({})", record.user, record.line);
        }
        entries.push(DeltaEntry {
            user: record.user.clone(),
            command: record.line.clone(),
            outcome,
        });
    }
    doc.commit();
    Delta {
        version: old_version + 1,
        entries,
    }
}

fn apply_record(
    doc: &mut Document,
    record: &QueuedCommand,
    can_write: &impl Fn(&str) -> bool,
) -> CommandOutcome {
    let command = match Command::parse(&record.line) {
        Ok(command) => command,
        Err(_) => return CommandOutcome::InvalidPosition,
    };
    if !command.is_mutator() {
        // Queries are answered inline by the session task; one that ends
        // up here is not a valid edit.
        return CommandOutcome::InvalidPosition;
    }
    if !can_write(&record.user) {
        return CommandOutcome::Unauthorised;
    }
    let version = record.version.unwrap_or_else(|| doc.version());
    let result = match command {
        Command::Insert { pos, text } => doc.insert(version, pos, &text),
        Command::Delete { pos, len } => doc.delete(version, pos, len),
        Command::Newline { pos } => doc.newline(version, pos),
        Command::Heading { level, pos } => doc.heading(version, level, pos),
        Command::Bold { start, end } => doc.bold(version, start, end),
        Command::Italic { start, end } => doc.italic(version, start, end),
        Command::Blockquote { pos } => doc.blockquote(version, pos),
        Command::OrderedList { pos } => doc.ordered_list(version, pos),
        Command::UnorderedList { pos } => doc.unordered_list(version, pos),
        Command::Code { start, end } => doc.code(version, start, end),
        Command::HorizontalRule { pos } => doc.horizontal_rule(version, pos),
        Command::Link { start, end, url } => doc.link(version, start, end, &url),
        Command::Doc | Command::Perm | Command::Log | Command::Disconnect => {
            return CommandOutcome::InvalidPosition;
        }
    };
    match result {
        Ok(()) => CommandOutcome::Success,
        Err(err) => err.into(),
    }
}
