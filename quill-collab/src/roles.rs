//! On-disk role store.
//!
//! One `name role` pair per line, `role` being `write` or `read`. The
//! file is re-read on every lookup so role changes apply to the next
//! authentication attempt without a restart. Unlisted names and
//! malformed lines are rejected; name matching is case-sensitive.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// What a user may do with the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Write,
    Read,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Write => "write",
            Role::Read => "read",
        }
    }

    pub fn can_write(self) -> bool {
        self == Role::Write
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "write" => Ok(Role::Write),
            "read" => Ok(Role::Read),
            _ => Err(()),
        }
    }
}

/// Lookup handle over the roles file.
#[derive(Debug, Clone)]
pub struct RoleStore {
    path: PathBuf,
}

impl RoleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-reads the file and returns the user's role, or `None` for
    /// unlisted names. A missing or unreadable file rejects everyone.
    pub fn lookup(&self, user: &str) -> Option<Role> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) => {
                log::debug!("role store {} unreadable: {err}", self.path.display());
                return None;
            }
        };
        for line in contents.lines() {
            let mut fields = line.split_whitespace();
            let (Some(name), Some(role)) = (fields.next(), fields.next()) else {
                continue;
            };
            if name == user {
                return role.parse().ok();
            }
        }
        None
    }
}
