//! Expose remote sftp servers as browsable folders.
//!
//! The crate is layered leaf first:
//!
//!  - [`Session`] owns the ssh transport handle and the lock serialising
//!    every call into it,
//!  - [`auth`] negotiates authentication against a [`CredentialSupplier`],
//!  - [`SftpChannel`] runs the sftp subsystem on top of an authenticated
//!    session,
//!  - [`fs::Fs`] implements listing, rename, recursive removal and
//!    directory creation,
//!  - [`file::File`] exposes one remote file as a seekable byte stream.
//!
//! All calls are blocking and run on the caller's thread. The session lock
//! is taken for each individual transport call, never for a whole composite
//! operation, so concurrent callers sharing a session interleave at
//! transport-call granularity.

#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub use sftp_folder_error::{
    Error, RecursiveError, SftpErrorKind, TransportError, TransportErrorCode,
};

mod constants;
pub use constants::RENAME_TEMP_SUFFIX;

mod utils;

mod unix_timestamp;
pub use unix_timestamp::UnixTimeStamp;

/// Module contains the traits a ssh transport backend implements.
pub mod lowlevel;

mod session;
pub use session::{Session, SessionGuard};

/// Module contains the authentication negotiation.
pub mod auth;
pub use auth::{CredentialSupplier, Reply};

mod options;
pub use options::SftpOptions;

mod sftp;
pub use sftp::{ChannelGuard, SftpChannel};

mod connection;
pub use connection::{AuthenticatedSession, ConnectionSpec};

/// Module contains types for manipulating files.
pub mod file;

/// Module contains types for manipulating directories.
pub mod fs;

/// Module contains types for manipulating metadata of files or directories.
pub mod metadata;

mod provider;
pub use provider::{Overwrite, OverwriteConfirmation, Provider};

#[cfg(feature = "libssh2")]
mod libssh2;
#[cfg(feature = "libssh2")]
pub use libssh2::{Libssh2Connector, Libssh2Sftp, Libssh2Transport};

#[cfg(doc)]
/// Changelog for this crate.
pub mod changelog;

/// Default size of buffer for up/download in openssh-portable
pub const OPENSSH_PORTABLE_DEFAULT_COPY_BUFLEN: usize = 32768;

/// Default ssh port.
pub const DEFAULT_SSH_PORT: u16 = 22;
