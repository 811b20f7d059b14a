#![forbid(unsafe_code)]

use std::{fmt, io, path::PathBuf};

use thiserror::Error as ThisError;

/// Status reported by the sftp server in a `SSH_FXP_STATUS` response.
#[non_exhaustive]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum SftpErrorKind {
    /// `SSH_FX_EOF`
    Eof,
    /// `SSH_FX_NO_SUCH_FILE`
    NoSuchFile,
    /// `SSH_FX_PERMISSION_DENIED`
    PermissionDenied,
    /// `SSH_FX_FAILURE`, the catch-all status of sftp v3.
    Failure,
    /// `SSH_FX_BAD_MESSAGE`
    BadMessage,
    /// `SSH_FX_NO_CONNECTION`
    NoConnection,
    /// `SSH_FX_CONNECTION_LOST`
    ConnectionLost,
    /// `SSH_FX_OP_UNSUPPORTED`
    OpUnsupported,
    /// `SSH_FX_FILE_ALREADY_EXISTS`, only sent by servers speaking a
    /// protocol newer than v3.
    FileAlreadyExists,
    /// Any other status code.
    Other(u32),
}

impl SftpErrorKind {
    /// Map a raw `SSH_FX_*` status code.
    pub const fn from_status(status: u32) -> Self {
        match status {
            1 => Self::Eof,
            2 => Self::NoSuchFile,
            3 => Self::PermissionDenied,
            4 => Self::Failure,
            5 => Self::BadMessage,
            6 => Self::NoConnection,
            7 => Self::ConnectionLost,
            8 => Self::OpUnsupported,
            11 => Self::FileAlreadyExists,
            other => Self::Other(other),
        }
    }

    /// The raw `SSH_FX_*` status code.
    pub const fn status(self) -> u32 {
        match self {
            Self::Eof => 1,
            Self::NoSuchFile => 2,
            Self::PermissionDenied => 3,
            Self::Failure => 4,
            Self::BadMessage => 5,
            Self::NoConnection => 6,
            Self::ConnectionLost => 7,
            Self::OpUnsupported => 8,
            Self::FileAlreadyExists => 11,
            Self::Other(other) => other,
        }
    }
}

impl fmt::Display for SftpErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Eof => "FX_EOF",
            Self::NoSuchFile => "FX_NO_SUCH_FILE",
            Self::PermissionDenied => "FX_PERMISSION_DENIED",
            Self::Failure => "FX_FAILURE",
            Self::BadMessage => "FX_BAD_MESSAGE",
            Self::NoConnection => "FX_NO_CONNECTION",
            Self::ConnectionLost => "FX_CONNECTION_LOST",
            Self::OpUnsupported => "FX_OP_UNSUPPORTED",
            Self::FileAlreadyExists => "FX_FILE_ALREADY_EXISTS",
            Self::Other(status) => return write!(f, "FX_UNKNOWN({status})"),
        };
        f.write_str(name)
    }
}

/// Where a [`TransportError`] came from.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TransportErrorCode {
    /// Error code of the ssh session layer (libssh2 uses negative numbers).
    Session(i32),
    /// Status returned by the sftp server.
    Sftp(SftpErrorKind),
    /// The socket or a local system call failed.
    Io(io::ErrorKind),
}

impl fmt::Display for TransportErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session(code) => write!(f, "session error {code}"),
            Self::Sftp(kind) => kind.fmt(f),
            Self::Io(kind) => write!(f, "io error {kind:?}"),
        }
    }
}

/// Failure reported by the underlying ssh transport for a single call.
#[derive(Debug, Clone, Eq, PartialEq, ThisError)]
#[error("{msg} ({code})")]
pub struct TransportError {
    code: TransportErrorCode,
    msg: String,
}

impl TransportError {
    /// Create a new transport error.
    pub fn new(code: TransportErrorCode, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
        }
    }

    /// Shorthand for an error of the ssh session layer.
    pub fn session(code: i32, msg: impl Into<String>) -> Self {
        Self::new(TransportErrorCode::Session(code), msg)
    }

    /// Shorthand for a status returned by the sftp server.
    pub fn sftp(kind: SftpErrorKind, msg: impl Into<String>) -> Self {
        Self::new(TransportErrorCode::Sftp(kind), msg)
    }

    /// Where the error came from.
    pub fn code(&self) -> TransportErrorCode {
        self.code
    }

    /// Human readable message sent along with the error.
    pub fn message(&self) -> &str {
        &self.msg
    }

    /// Return the sftp status if the error was reported by the sftp server.
    pub fn sftp_kind(&self) -> Option<SftpErrorKind> {
        match self.code {
            TransportErrorCode::Sftp(kind) => Some(kind),
            _ => None,
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        Self::new(TransportErrorCode::Io(err.kind()), err.to_string())
    }
}

/// Error returned by [`sftp-folder`](https://docs.rs/sftp-folder).
#[non_exhaustive]
#[derive(Debug, ThisError)]
pub enum Error {
    /// TCP connect or ssh handshake failed.
    #[error("Failed to connect to {host}:{port}: {source}")]
    Connection {
        /// Host that was dialled.
        host: String,
        /// Port that was dialled.
        port: u16,
        /// Failure reported by the transport.
        #[source]
        source: TransportError,
    },

    /// The transport failed in the middle of an operation.
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    /// Every authentication method was exhausted or unsupported.
    #[error("Authentication failed for user {user}: {summary}")]
    Authentication {
        /// User name presented to the server.
        user: String,
        /// Outcome of each method offered by the server.
        summary: String,
    },

    /// The user (or the credential supplier on its behalf) cancelled the
    /// operation.
    ///
    /// Unlike [`Error::Authentication`], callers should not offer to retry.
    #[error("Operation aborted by user")]
    Aborted,

    /// The server refused to start the sftp subsystem.
    #[error("Failed to start sftp channel: {0}")]
    Channel(#[source] TransportError),

    /// Remote directory could not be opened or read.
    #[error("Failed opening remote directory {path:?}: {source}")]
    Directory {
        /// Directory being listed.
        path: PathBuf,
        /// Failure reported by the transport.
        #[source]
        source: TransportError,
    },

    /// Remote file or directory does not exist.
    #[error("Failed opening remote file {path:?}: FX_NO_SUCH_FILE ({msg})")]
    NotFound {
        /// Path that was not found.
        path: PathBuf,
        /// Message sent by the server.
        msg: String,
    },

    /// Server denied access to the path.
    #[error("Permission denied for {path:?}: {msg}")]
    PermissionDenied {
        /// Path access was denied for.
        path: PathBuf,
        /// Message sent by the server.
        msg: String,
    },

    /// The path was expected to be absent.
    #[error("{path:?} already exists")]
    AlreadyExists {
        /// Path that already exists.
        path: PathBuf,
    },

    /// Any other failure reported by the sftp server.
    #[error("Sftp server reported error kind {kind} for {path:?}: {msg}")]
    Sftp {
        /// Path the request was about.
        path: PathBuf,
        /// Status returned by the server.
        kind: SftpErrorKind,
        /// Message sent by the server.
        msg: String,
    },

    /// Overwriting rename took effect but the displaced target, moved aside
    /// to `temp`, could not be removed.
    #[error("Renamed successfully but failed to remove temporary {temp:?}: {source}")]
    TempCleanup {
        /// The leftover temporary.
        temp: PathBuf,
        /// Why removal failed.
        #[source]
        source: Box<Error>,
    },

    /// IO Error: {0}.
    #[error("IO Error: {0}.")]
    IOError(#[from] io::Error),

    /// Raised 2 errors when cleaning up.
    #[error(transparent)]
    RecursiveErrors(Box<RecursiveError>),

    /// The path cannot be used for the requested operation.
    #[error("Invalid remote path {0:?}")]
    InvalidPath(PathBuf),
}

impl Error {
    /// Return `true` if the error is a user abort.
    ///
    /// Aborts are looked for in nested cleanup errors as well.
    pub fn is_abort(&self) -> bool {
        match self {
            Error::Aborted => true,
            Error::RecursiveErrors(err) => err.original_error.is_abort(),
            _ => false,
        }
    }

    /// Return the sftp status carried by this error, if any.
    pub fn sftp_kind(&self) -> Option<SftpErrorKind> {
        match self {
            Error::NotFound { .. } => Some(SftpErrorKind::NoSuchFile),
            Error::PermissionDenied { .. } => Some(SftpErrorKind::PermissionDenied),
            Error::Sftp { kind, .. } => Some(*kind),
            Error::Transport(err) | Error::Channel(err) | Error::Directory { source: err, .. } => {
                err.sftp_kind()
            }
            Error::RecursiveErrors(err) => err.original_error.sftp_kind(),
            _ => None,
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        let kind = match &err {
            Error::IOError(err) => err.kind(),
            Error::NotFound { .. } => io::ErrorKind::NotFound,
            Error::PermissionDenied { .. } => io::ErrorKind::PermissionDenied,
            Error::AlreadyExists { .. } => io::ErrorKind::AlreadyExists,
            Error::Aborted => io::ErrorKind::Interrupted,
            Error::InvalidPath(_) => io::ErrorKind::InvalidInput,
            Error::Transport(err) => match err.code() {
                TransportErrorCode::Io(kind) => kind,
                _ => io::ErrorKind::Other,
            },
            _ => io::ErrorKind::Other,
        };

        match err {
            Error::IOError(err) => err,
            err => io::Error::new(kind, err),
        }
    }
}

#[derive(Debug, ThisError)]
#[error("OriginalError: {original_error}, curr err raised when cleaning up: {occuring_error}.")]
pub struct RecursiveError {
    /// Original error
    pub original_error: Error,

    /// Current error raised when performing cleanup
    /// for original error.
    #[source]
    pub occuring_error: Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_both_ways() {
        for status in 1..=12 {
            assert_eq!(SftpErrorKind::from_status(status).status(), status);
        }
        assert_eq!(SftpErrorKind::from_status(2), SftpErrorKind::NoSuchFile);
        assert_eq!(SftpErrorKind::NoSuchFile.to_string(), "FX_NO_SUCH_FILE");
    }

    #[test]
    fn abort_is_found_through_cleanup_errors() {
        let err = Error::RecursiveErrors(Box::new(RecursiveError {
            original_error: Error::Aborted,
            occuring_error: Error::InvalidPath("/".into()),
        }));
        assert!(err.is_abort());
        assert!(!Error::InvalidPath("/".into()).is_abort());
    }

    #[test]
    fn converts_into_io_error_kind() {
        let err: io::Error = Error::NotFound {
            path: "/missing".into(),
            msg: "no such file".into(),
        }
        .into();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);

        let err: io::Error = Error::AlreadyExists {
            path: "/there".into(),
        }
        .into();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }
}
