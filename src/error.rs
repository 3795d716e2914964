//! Error taxonomy shared by client and server

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FtpError>;

#[derive(Debug, Error)]
pub enum FtpError {
    /// Bad magic, unknown opcode or an impossible length
    #[error("framing error: {0}")]
    Framing(String),

    /// Well-formed message that is not valid in the current state
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Socket failure or incomplete read/write
    #[error("connection i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("authentication rejected")]
    AuthRejected,

    #[error("server refused the connection")]
    Refused,

    #[error("file not found on server: {0}")]
    NotFound(String),

    #[error("local file error on {}: {source}", .path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("credential store unavailable: {0}")]
    Credentials(#[source] io::Error),

    #[error("{0}")]
    InvalidState(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl FtpError {
    pub fn local(path: impl Into<PathBuf>, source: io::Error) -> Self {
        FtpError::LocalIo {
            path: path.into(),
            source,
        }
    }

    /// Whether the side that observed this error must drop the connection.
    /// NotFound, LocalIo and argument/state errors only fail one operation.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            FtpError::Framing(_)
                | FtpError::ProtocolViolation(_)
                | FtpError::Io(_)
                | FtpError::AuthRejected
                | FtpError::Refused
                | FtpError::Credentials(_)
        )
    }
}
