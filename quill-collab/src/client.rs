//! Line client for the collaboration server.
//!
//! Connection lifecycle: send the username, read the bootstrap
//! (`role`, `version`, `byte length`, document bytes), then exchange
//! lines: commands out, broadcast deltas and query responses in. Edit
//! results never come back directly; they arrive in the next delta.

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};

use thiserror::Error;

use crate::protocol::Command;
use crate::roles::Role;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("server rejected the handshake: {0}")]
    Rejected(String),
    #[error("malformed handshake: {0}")]
    Handshake(String),
}

/// What the server sends right after admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bootstrap {
    pub role: Role,
    pub version: u64,
    pub document: Vec<u8>,
}

impl Bootstrap {
    pub fn document_text(&self) -> String {
        String::from_utf8_lossy(&self.document).into_owned()
    }
}

/// A connected, admitted client.
#[derive(Debug)]
pub struct SyncClient {
    reader: ClientReader,
    writer: ClientWriter,
}

impl SyncClient {
    /// Connects, sends the username and performs the bootstrap.
    pub async fn connect(
        addr: impl ToSocketAddrs,
        username: &str,
    ) -> Result<(Self, Bootstrap), ClientError> {
        let stream = TcpStream::connect(addr).await?;
        let (read_half, mut write_half) = stream.into_split();

        write_half
            .write_all(format!("{username}\n").as_bytes())
            .await?;
        write_half.flush().await?;

        let mut reader = BufReader::new(read_half);
        let first = handshake_line(&mut reader).await?;
        if first.starts_with("Reject") {
            return Err(ClientError::Rejected(first));
        }
        let role: Role = first
            .parse()
            .map_err(|()| ClientError::Handshake(format!("unexpected role line: {first}")))?;

        let version_line = handshake_line(&mut reader).await?;
        let version: u64 = version_line
            .parse()
            .map_err(|_| ClientError::Handshake(format!("unexpected version line: {version_line}")))?;

        let length_line = handshake_line(&mut reader).await?;
        let length: usize = length_line
            .parse()
            .map_err(|_| ClientError::Handshake(format!("unexpected length line: {length_line}")))?;

        let mut document = vec![0u8; length];
        reader.read_exact(&mut document).await?;

        let client = Self {
            reader: ClientReader {
                lines: reader.lines(),
            },
            writer: ClientWriter { writer: write_half },
        };
        Ok((
            client,
            Bootstrap {
                role,
                version,
                document,
            },
        ))
    }

    /// Sends one raw command line.
    pub async fn send(&mut self, line: &str) -> std::io::Result<()> {
        self.writer.send(line).await
    }

    /// Sends a typed command.
    pub async fn send_command(&mut self, command: &Command) -> std::io::Result<()> {
        self.writer.send(&command.to_string()).await
    }

    /// Next line from the server, `None` on EOF.
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        self.reader.next_line().await
    }

    /// Tells the server we are leaving and drops the connection.
    pub async fn disconnect(mut self) -> std::io::Result<()> {
        self.writer.send("DISCONNECT").await
    }

    /// Splits into independent reader and writer halves, so broadcasts
    /// can be consumed concurrently with user input.
    pub fn split(self) -> (ClientReader, ClientWriter) {
        (self.reader, self.writer)
    }
}

#[derive(Debug)]
pub struct ClientReader {
    lines: Lines<BufReader<OwnedReadHalf>>,
}

impl ClientReader {
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        self.lines.next_line().await
    }
}

#[derive(Debug)]
pub struct ClientWriter {
    writer: OwnedWriteHalf,
}

impl ClientWriter {
    pub async fn send(&mut self, line: &str) -> std::io::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }
}

async fn handshake_line(reader: &mut BufReader<OwnedReadHalf>) -> Result<String, ClientError> {
    let mut line = String::new();
    let read = reader.read_line(&mut line).await?;
    if read == 0 {
        return Err(ClientError::Handshake(
            "connection closed during handshake".to_string(),
        ));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
