use crate::{Error, RecursiveError, SftpErrorKind, TransportError};

use std::path::Path;

pub(crate) trait ErrorExt {
    fn error_on_cleanup(self, occuring_error: Error) -> Self;
}

impl ErrorExt for Error {
    fn error_on_cleanup(self, occuring_error: Error) -> Self {
        Error::RecursiveErrors(Box::new(RecursiveError {
            original_error: self,
            occuring_error,
        }))
    }
}

/// Attach `path` to a failed transport call, picking the most specific
/// [`Error`] variant for the sftp status.
pub(crate) fn path_error(path: &Path, err: TransportError) -> Error {
    match err.sftp_kind() {
        Some(SftpErrorKind::NoSuchFile) => Error::NotFound {
            path: path.into(),
            msg: err.message().into(),
        },
        Some(SftpErrorKind::PermissionDenied) => Error::PermissionDenied {
            path: path.into(),
            msg: err.message().into(),
        },
        Some(SftpErrorKind::FileAlreadyExists) => Error::AlreadyExists { path: path.into() },
        Some(kind) => Error::Sftp {
            path: path.into(),
            kind,
            msg: err.message().into(),
        },
        None => Error::Transport(err),
    }
}

pub(crate) trait ResultExt<T> {
    fn at_path(self, path: &Path) -> Result<T, Error>;
}

impl<T> ResultExt<T> for Result<T, TransportError> {
    fn at_path(self, path: &Path) -> Result<T, Error> {
        self.map_err(|err| path_error(path, err))
    }
}
