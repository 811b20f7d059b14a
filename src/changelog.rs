#[allow(unused_imports)]
use crate::*;

/// ## Changed
///  - [`SftpChannel::close`] no longer returns an error, shutdown failures
///    are logged like on drop
///  - The session lock is fair: a call waiting behind a transfer gets its
///    turn between two chunks
///
/// ## Fixed
///  - Overwriting rename of a target given with a trailing slash moves it
///    aside to a sibling temporary
///  - An unreadable or wrongly decrypted key file is treated as a refused
///    key by the `libssh2` backend
pub mod unreleased {}

/// ## Added
///  - [`Session`], owning the transport handle behind a per-call lock
///  - [`auth::authenticate`] and [`auth::Negotiation`], trying the methods
///    the server offers in its order against a [`CredentialSupplier`]
///  - [`SftpChannel`] and [`SftpOptions`]
///  - [`ConnectionSpec::create_session`] returning an [`AuthenticatedSession`]
///  - [`fs::Fs`] with listing, overwriting rename, recursive removal and
///    directory creation
///  - [`fs::DirEntry`] with owner and group parsed from the `ls -l` line
///    sent by the server, or a synthesised one
///  - [`file::File`], a remote file as [`std::io::Read`],
///    [`std::io::Write`] and [`std::io::Seek`] stream
///  - [`Provider`] trait implemented by [`fs::Fs`]
///  - Feature `libssh2` with a backend built on `ssh2`
///  - Feature `tracing` logging cleanup failures
pub mod v0_1_0 {}
