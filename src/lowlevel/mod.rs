//! Traits implemented by a ssh transport backend.
//!
//! A backend provides three things: a [`Connector`] that dials a host, the
//! [`Transport`] handle of one ssh session and the [`SftpHandle`] of an sftp
//! channel opened on it.
//!
//! Neither handle is expected to be thread-safe. The crate only ever calls
//! them through a [`crate::SessionGuard`], so at most one call is in flight
//! per session at any instant, and each call below is exactly one such
//! guarded transport call.

use crate::{metadata::FileAttrs, TransportError};

use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};

/// Dial a host and perform the ssh handshake.
pub trait Connector {
    /// Transport produced by this connector.
    type Transport: Transport;

    /// Open the connection and finish the key exchange.
    ///
    /// The returned transport is connected but not yet authenticated.
    fn connect(&self, host: &str, port: u16) -> Result<Self::Transport, TransportError>;
}

/// Ssh authentication method, named as on the wire (RFC 4252).
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum AuthMethod {
    /// `publickey`
    PublicKey,
    /// `keyboard-interactive`
    KeyboardInteractive,
    /// `password`
    Password,
    /// Any method this crate has no support for, e.g. `hostbased`.
    Other(String),
}

impl AuthMethod {
    /// Parse a method name.
    pub fn from_name(name: &str) -> Self {
        match name {
            "publickey" => Self::PublicKey,
            "keyboard-interactive" => Self::KeyboardInteractive,
            "password" => Self::Password,
            other => Self::Other(other.into()),
        }
    }

    /// Parse the comma separated list sent in `SSH_MSG_USERAUTH_FAILURE`,
    /// keeping the server's order.
    pub fn parse_list(list: &str) -> Vec<Self> {
        list.split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(Self::from_name)
            .collect()
    }

    /// Wire name of the method.
    pub fn name(&self) -> &str {
        match self {
            Self::PublicKey => "publickey",
            Self::KeyboardInteractive => "keyboard-interactive",
            Self::Password => "password",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Key pair used for `publickey` authentication.
#[derive(Clone, Eq, PartialEq)]
pub struct KeyPair {
    /// Public half; backends derive it from the private key when absent.
    pub public_key: Option<PathBuf>,
    /// Private key file.
    pub private_key: PathBuf,
    /// Passphrase protecting the private key.
    pub passphrase: Option<String>,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .field("private_key", &self.private_key)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// One prompt of a keyboard-interactive exchange.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Prompt<'a> {
    /// Text shown to the user.
    pub text: Cow<'a, str>,
    /// Whether the answer may be echoed back while typing.
    pub echo: bool,
}

/// Answers the prompts of a keyboard-interactive exchange.
///
/// The backend calls it once per `SSH_MSG_USERAUTH_INFO_REQUEST`.
pub trait KeyboardInteractivePrompt {
    /// Return one response per prompt.
    ///
    /// Returning fewer responses than prompts makes the exchange fail.
    fn prompt(&mut self, username: &str, instructions: &str, prompts: &[Prompt<'_>])
        -> Vec<String>;
}

/// Handle of one ssh session.
pub trait Transport: Send + 'static {
    /// Handle of an sftp channel opened on this transport.
    type Sftp: SftpHandle;

    /// Authentication methods the server accepts for `username`, in the
    /// order the server advertised them.
    ///
    /// Return an empty list if the server let the user in with the `none`
    /// method.
    fn auth_methods(&mut self, username: &str) -> Result<Vec<AuthMethod>, TransportError>;

    /// Whether authentication has completed.
    fn authenticated(&self) -> bool;

    /// Try `password` authentication.
    fn userauth_password(&mut self, username: &str, password: &str)
        -> Result<(), TransportError>;

    /// Run one `keyboard-interactive` exchange.
    fn userauth_keyboard_interactive(
        &mut self,
        username: &str,
        prompter: &mut dyn KeyboardInteractivePrompt,
    ) -> Result<(), TransportError>;

    /// Try `publickey` authentication.
    fn userauth_pubkey(&mut self, username: &str, key: &KeyPair) -> Result<(), TransportError>;

    /// Start the sftp subsystem on a new channel.
    fn open_sftp(&mut self) -> Result<Self::Sftp, TransportError>;

    /// Shut an sftp channel down.
    fn shutdown_sftp(&mut self, sftp: Self::Sftp) -> Result<(), TransportError>;

    /// Send `SSH_MSG_DISCONNECT` and close the socket.
    fn disconnect(&mut self, description: &str) -> Result<(), TransportError>;
}

/// Entry returned by [`SftpHandle::read_dir`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NameEntry {
    /// Name relative to the directory being read.
    pub filename: String,
    /// `ls -l` style line, if the server sent one.
    pub longname: Option<String>,
    /// Attributes of the entry.
    pub attrs: FileAttrs,
}

/// Flags of an `SSH_FXP_OPEN` request.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct OpenFlags {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub create: bool,
    pub truncate: bool,
    pub exclusive: bool,
}

/// Handle of an sftp channel.
///
/// File and directory handles are plain values owned by the caller; they
/// can only be used through the channel, and therefore only under the
/// session lock.
pub trait SftpHandle: Send + 'static {
    /// Handle of an open file.
    type File: Send + 'static;
    /// Handle of an open directory.
    type Dir: Send + 'static;

    /// `SSH_FXP_OPENDIR`
    fn open_dir(&mut self, path: &Path) -> Result<Self::Dir, TransportError>;

    /// `SSH_FXP_READDIR`, returning one entry at a time and `None` at the
    /// end of the directory.
    fn read_dir(&mut self, dir: &mut Self::Dir) -> Result<Option<NameEntry>, TransportError>;

    /// `SSH_FXP_CLOSE` on a directory handle.
    fn close_dir(&mut self, dir: Self::Dir) -> Result<(), TransportError>;

    /// `SSH_FXP_STAT`, following symlinks.
    fn stat(&mut self, path: &Path) -> Result<FileAttrs, TransportError>;

    /// `SSH_FXP_LSTAT`, not following symlinks.
    fn lstat(&mut self, path: &Path) -> Result<FileAttrs, TransportError>;

    /// `SSH_FXP_RENAME`.
    ///
    /// Must fail rather than replace an existing `to`.
    fn rename(&mut self, from: &Path, to: &Path) -> Result<(), TransportError>;

    /// `SSH_FXP_REMOVE`
    fn unlink(&mut self, path: &Path) -> Result<(), TransportError>;

    /// `SSH_FXP_RMDIR`
    fn rmdir(&mut self, path: &Path) -> Result<(), TransportError>;

    /// `SSH_FXP_MKDIR`
    fn mkdir(&mut self, path: &Path, mode: u32) -> Result<(), TransportError>;

    /// `SSH_FXP_REALPATH`
    fn realpath(&mut self, path: &Path) -> Result<PathBuf, TransportError>;

    /// `SSH_FXP_READLINK`
    fn readlink(&mut self, path: &Path) -> Result<PathBuf, TransportError>;

    /// `SSH_FXP_OPEN`
    fn open(&mut self, path: &Path, flags: OpenFlags, mode: u32)
        -> Result<Self::File, TransportError>;

    /// `SSH_FXP_READ` at `offset`.
    ///
    /// Return `Ok(0)` at the end of the file.
    fn read(
        &mut self,
        file: &mut Self::File,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<usize, TransportError>;

    /// `SSH_FXP_WRITE` at `offset`, returning how many bytes were written.
    fn write(
        &mut self,
        file: &mut Self::File,
        offset: u64,
        buf: &[u8],
    ) -> Result<usize, TransportError>;

    /// `SSH_FXP_FSTAT`
    fn fstat(&mut self, file: &mut Self::File) -> Result<FileAttrs, TransportError>;

    /// `SSH_FXP_CLOSE` on a file handle.
    fn close(&mut self, file: Self::File) -> Result<(), TransportError>;
}
