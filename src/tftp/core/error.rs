use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Broad category of a [`TftpError`], used by the batch engine to title
/// error events and by tests to assert on failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Protocol,
    Io,
    Filesystem,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Config => "Configuration error",
            ErrorKind::Protocol => "Protocol error",
            ErrorKind::Io => "Network error",
            ErrorKind::Filesystem => "Filesystem error",
        };
        f.write_str(name)
    }
}

/// Errors produced by the packet codec and the transfer state machine.
///
/// Every variant carries enough context (offending byte, opcode, block
/// numbers, peer) to diagnose a failed transfer without packet captures.
#[derive(Debug, Error)]
pub enum TftpError {
    #[error("{0}")]
    Config(String),

    #[error("Incoming packet has invalid first byte ({0})")]
    InvalidFirstByte(u8),

    #[error("Incoming packet is truncated ({len} bytes)")]
    Truncated { len: usize },

    #[error("Incoming packet has unknown operation code ({0})")]
    UnknownOpcode(u16),

    #[error("Incoming packet returned invalid operation code ({found}), expected {expected}")]
    UnexpectedOpcode { expected: u16, found: u16 },

    #[error("Error on incoming packet number {found} vs expected {expected}")]
    OutOfSequence { expected: u16, found: u16 },

    #[error("Malformed packet: {0}")]
    Malformed(String),

    #[error("Server error {code}: {message}")]
    Remote { code: u16, message: String },

    #[error("Cannot bind socket: {0}")]
    Bind(#[source] io::Error),

    #[error("Cannot send packet to host: wrote {sent} of {expected} bytes")]
    ShortWrite { sent: usize, expected: usize },

    #[error("No message received from host {peer} within {timeout:?}")]
    NoResponse { peer: SocketAddr, timeout: Duration },

    #[error("Socket error: {0}")]
    Io(#[from] io::Error),

    #[error("{action} {}: {source}", .path.display())]
    Filesystem {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl TftpError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TftpError::Config(_) => ErrorKind::Config,
            TftpError::InvalidFirstByte(_)
            | TftpError::Truncated { .. }
            | TftpError::UnknownOpcode(_)
            | TftpError::UnexpectedOpcode { .. }
            | TftpError::OutOfSequence { .. }
            | TftpError::Malformed(_)
            | TftpError::Remote { .. } => ErrorKind::Protocol,
            TftpError::Bind(_)
            | TftpError::ShortWrite { .. }
            | TftpError::NoResponse { .. }
            | TftpError::Io(_) => ErrorKind::Io,
            TftpError::Filesystem { .. } => ErrorKind::Filesystem,
        }
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        TftpError::Config(msg.into())
    }

    pub(crate) fn filesystem(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        TftpError::Filesystem {
            action,
            path: path.into(),
            source,
        }
    }
}
