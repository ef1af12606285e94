//! Line-oriented wire protocol.
//!
//! Commands arrive as one ASCII line each:
//!
//! ```text
//! INSERT <pos> <text-to-end-of-line>
//! DEL <pos> <len>
//! NEWLINE <pos>
//! HEADING <level> <pos>
//! BOLD <start> <end>          ITALIC <start> <end>     CODE <start> <end>
//! BLOCKQUOTE <pos>            ORDERED_LIST <pos>       UNORDERED_LIST <pos>
//! HORIZONTAL_RULE <pos>       LINK <start> <end> <url>
//! DOC? | PERM? | LOG? | DISCONNECT
//! ```
//!
//! The server answers queries directly; edit results only ever travel in
//! the next broadcast delta:
//!
//! ```text
//! VERSION <n>
//! EDIT <user> <full-command-line> <result>
//! END
//! ```

use std::fmt;

use thiserror::Error;

use quill_core::EditError;

use crate::roles::Role;

/// Handshake rejection line for names missing from the role store.
pub const REJECT_UNAUTHORISED: &str = "Reject UNAUTHORISED";
/// Handshake rejection line when every session slot is taken.
pub const REJECT_FULL: &str = "Reject FULL";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("malformed arguments for {0}")]
    BadArguments(&'static str),
}

/// One parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Insert { pos: usize, text: String },
    Delete { pos: usize, len: usize },
    Newline { pos: usize },
    Heading { level: u8, pos: usize },
    Bold { start: usize, end: usize },
    Italic { start: usize, end: usize },
    Blockquote { pos: usize },
    OrderedList { pos: usize },
    UnorderedList { pos: usize },
    Code { start: usize, end: usize },
    HorizontalRule { pos: usize },
    Link { start: usize, end: usize, url: String },
    Doc,
    Perm,
    Log,
    Disconnect,
}

impl Command {
    /// Parses one command line. Trailing CR/LF is tolerated; anything
    /// else is taken literally (INSERT text runs to the end of the line).
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim_end_matches(['\r', '\n']);
        match line {
            "DOC?" => return Ok(Command::Doc),
            "PERM?" => return Ok(Command::Perm),
            "LOG?" => return Ok(Command::Log),
            "DISCONNECT" => return Ok(Command::Disconnect),
            _ => {}
        }
        let (keyword, rest) = line.split_once(' ').unwrap_or((line, ""));
        match keyword {
            "INSERT" => {
                let (pos, text) = rest
                    .split_once(' ')
                    .ok_or(ProtocolError::BadArguments("INSERT"))?;
                if text.is_empty() {
                    return Err(ProtocolError::BadArguments("INSERT"));
                }
                Ok(Command::Insert {
                    pos: index(pos, "INSERT")?,
                    text: text.to_string(),
                })
            }
            "DEL" => {
                let (pos, len) = pair(rest, "DEL")?;
                Ok(Command::Delete { pos, len })
            }
            "NEWLINE" => Ok(Command::Newline {
                pos: single(rest, "NEWLINE")?,
            }),
            "HEADING" => {
                let mut parts = rest.split_whitespace();
                let level = parts
                    .next()
                    .and_then(|t| t.parse::<u8>().ok())
                    .ok_or(ProtocolError::BadArguments("HEADING"))?;
                let pos = parts
                    .next()
                    .and_then(|t| t.parse::<usize>().ok())
                    .ok_or(ProtocolError::BadArguments("HEADING"))?;
                if parts.next().is_some() {
                    return Err(ProtocolError::BadArguments("HEADING"));
                }
                Ok(Command::Heading { level, pos })
            }
            "BOLD" => {
                let (start, end) = pair(rest, "BOLD")?;
                Ok(Command::Bold { start, end })
            }
            "ITALIC" => {
                let (start, end) = pair(rest, "ITALIC")?;
                Ok(Command::Italic { start, end })
            }
            "BLOCKQUOTE" => Ok(Command::Blockquote {
                pos: single(rest, "BLOCKQUOTE")?,
            }),
            "ORDERED_LIST" => Ok(Command::OrderedList {
                pos: single(rest, "ORDERED_LIST")?,
            }),
            "UNORDERED_LIST" => Ok(Command::UnorderedList {
                pos: single(rest, "UNORDERED_LIST")?,
            }),
            "CODE" => {
                let (start, end) = pair(rest, "CODE")?;
                Ok(Command::Code { start, end })
            }
            "HORIZONTAL_RULE" => Ok(Command::HorizontalRule {
                pos: single(rest, "HORIZONTAL_RULE")?,
            }),
            "LINK" => {
                let mut parts = rest.split_whitespace();
                let start = parts
                    .next()
                    .and_then(|t| t.parse::<usize>().ok())
                    .ok_or(ProtocolError::BadArguments("LINK"))?;
                let end = parts
                    .next()
                    .and_then(|t| t.parse::<usize>().ok())
                    .ok_or(ProtocolError::BadArguments("LINK"))?;
                let url = parts
                    .next()
                    .ok_or(ProtocolError::BadArguments("LINK"))?
                    .to_string();
                if parts.next().is_some() {
                    return Err(ProtocolError::BadArguments("LINK"));
                }
                Ok(Command::Link { start, end, url })
            }
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }

    /// Whether this command mutates the document (and therefore requires
    /// the write role and a trip through the queue).
    pub fn is_mutator(&self) -> bool {
        !matches!(
            self,
            Command::Doc | Command::Perm | Command::Log | Command::Disconnect
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Insert { pos, text } => write!(f, "INSERT {pos} {text}"),
            Command::Delete { pos, len } => write!(f, "DEL {pos} {len}"),
            Command::Newline { pos } => write!(f, "NEWLINE {pos}"),
            Command::Heading { level, pos } => write!(f, "HEADING {level} {pos}"),
            Command::Bold { start, end } => write!(f, "BOLD {start} {end}"),
            Command::Italic { start, end } => write!(f, "ITALIC {start} {end}"),
            Command::Blockquote { pos } => write!(f, "BLOCKQUOTE {pos}"),
            Command::OrderedList { pos } => write!(f, "ORDERED_LIST {pos}"),
            Command::UnorderedList { pos } => write!(f, "UNORDERED_LIST {pos}"),
            Command::Code { start, end } => write!(f, "CODE {start} {end}"),
            Command::HorizontalRule { pos } => write!(f, "HORIZONTAL_RULE {pos}"),
            Command::Link { start, end, url } => write!(f, "LINK {start} {end} {url}"),
            Command::Doc => write!(f, "DOC?"),
            Command::Perm => write!(f, "PERM?"),
            Command::Log => write!(f, "LOG?"),
            Command::Disconnect => write!(f, "DISCONNECT"),
        }
    }
}

fn index(token: &str, cmd: &'static str) -> Result<usize, ProtocolError> {
    token
        .parse::<usize>()
        .map_err(|_| ProtocolError::BadArguments(cmd))
}

fn single(rest: &str, cmd: &'static str) -> Result<usize, ProtocolError> {
    let mut parts = rest.split_whitespace();
    let value = parts
        .next()
        .ok_or(ProtocolError::BadArguments(cmd))
        .and_then(|t| index(t, cmd))?;
    if parts.next().is_some() {
        return Err(ProtocolError::BadArguments(cmd));
    }
    Ok(value)
}

fn pair(rest: &str, cmd: &'static str) -> Result<(usize, usize), ProtocolError> {
    let mut parts = rest.split_whitespace();
    let a = parts
        .next()
        .ok_or(ProtocolError::BadArguments(cmd))
        .and_then(|t| index(t, cmd))?;
    let b = parts
        .next()
        .ok_or(ProtocolError::BadArguments(cmd))
        .and_then(|t| index(t, cmd))?;
    if parts.next().is_some() {
        return Err(ProtocolError::BadArguments(cmd));
    }
    Ok((a, b))
}

/// Per-command result carried in the broadcast delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Success,
    Unauthorised,
    InvalidPosition,
    DeletedPosition,
    OutdatedVersion,
}

impl From<EditError> for CommandOutcome {
    fn from(err: EditError) -> Self {
        match err {
            EditError::InvalidPosition => CommandOutcome::InvalidPosition,
            EditError::DeletedPosition => CommandOutcome::DeletedPosition,
            EditError::OutdatedVersion => CommandOutcome::OutdatedVersion,
        }
    }
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandOutcome::Success => write!(f, "SUCCESS"),
            CommandOutcome::Unauthorised => write!(f, "Reject UNAUTHORISED"),
            CommandOutcome::InvalidPosition => write!(f, "Reject INVALID_POSITION"),
            CommandOutcome::DeletedPosition => write!(f, "Reject DELETED_POSITION"),
            CommandOutcome::OutdatedVersion => write!(f, "Reject OUTDATED_VERSION"),
        }
    }
}

/// One processed command inside a delta: submitter, the command line as
/// it was received, and its outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaEntry {
    pub user: String,
    pub command: String,
    pub outcome: CommandOutcome,
}

/// The versioned block broadcast to every session after a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    pub version: u64,
    pub entries: Vec<DeltaEntry>,
}

impl fmt::Display for Delta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "VERSION {}", self.version)?;
        for entry in &self.entries {
            writeln!(f, "EDIT {} {} {}", entry.user, entry.command, entry.outcome)?;
        }
        writeln!(f, "END")
    }
}

/// `DOC?` reply: the flattened committed document.
pub fn doc_response(flattened: &str) -> String {
    format!("DOC?\n{flattened}\n")
}

/// `PERM?` reply: the session's role.
pub fn perm_response(role: Role) -> String {
    format!("PERM?\n{}\n", role.as_str())
}

/// `LOG?` reply: every delta record ever produced, in order.
pub fn log_response(contents: &str) -> String {
    format!("LOG?\n{contents}")
}
