//! Transport backend on top of libssh2, through the `ssh2` crate.

use crate::{
    lowlevel::{
        AuthMethod, Connector, KeyPair, KeyboardInteractivePrompt, NameEntry, OpenFlags, Prompt,
        SftpHandle, Transport,
    },
    metadata::FileAttrs,
    SftpErrorKind, TransportError, UnixTimeStamp,
};

use std::borrow::Cow;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use ssh2::{ErrorCode, FileStat, OpenType, RenameFlags};
#[cfg(feature = "tracing")]
use ssh2::HashType;

/// `LIBSSH2_ERROR_FILE`, returned by `readdir` at the end of a directory
/// and by `userauth_publickey_fromfile` when the key cannot be read or
/// decrypted.
const LIBSSH2_ERROR_FILE: i32 = -16;

fn from_ssh2(err: ssh2::Error) -> TransportError {
    match err.code() {
        ErrorCode::Session(code) => TransportError::session(code, err.message()),
        ErrorCode::SFTP(status) => {
            TransportError::sftp(SftpErrorKind::from_status(status as u32), err.message())
        }
    }
}

/// An unreadable key file or a wrong passphrase rejects the key pair like
/// the server would, so negotiation asks for another one.
fn pubkey_error(err: ssh2::Error) -> TransportError {
    match err.code() {
        ErrorCode::Session(LIBSSH2_ERROR_FILE) => {
            TransportError::session(crate::auth::PUBLICKEY_UNVERIFIED, err.message())
        }
        _ => from_ssh2(err),
    }
}

fn to_attrs(stat: &FileStat) -> FileAttrs {
    let mut attrs = FileAttrs::new();

    if let Some(size) = stat.size {
        attrs.set_size(size);
    }
    if let (Some(uid), Some(gid)) = (stat.uid, stat.gid) {
        attrs.set_id(uid, gid);
    }
    if let Some(perm) = stat.perm {
        attrs.set_permissions(perm);
    }
    if let Some(atime) = stat.atime.and_then(|atime| u32::try_from(atime).ok()) {
        attrs.set_accessed(UnixTimeStamp::from_raw(atime));
    }
    if let Some(mtime) = stat.mtime.and_then(|mtime| u32::try_from(mtime).ok()) {
        attrs.set_modified(UnixTimeStamp::from_raw(mtime));
    }

    attrs
}

/// Dial hosts over TCP and run the ssh handshake with libssh2.
#[derive(Debug, Default, Copy, Clone)]
pub struct Libssh2Connector {
    timeout: Option<Duration>,
}

impl Libssh2Connector {
    pub const fn new() -> Self {
        Self { timeout: None }
    }

    /// Set the timeout for connecting and for every blocking libssh2 call.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn connect_tcp(&self, host: &str, port: u16) -> io::Result<TcpStream> {
        let timeout = match self.timeout {
            Some(timeout) => timeout,
            None => return TcpStream::connect((host, port)),
        };

        let mut last_err = None;
        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return Ok(stream),
                Err(err) => last_err = Some(err),
            }
        }

        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "host resolved to no address")
        }))
    }
}

impl Connector for Libssh2Connector {
    type Transport = Libssh2Transport;

    fn connect(&self, host: &str, port: u16) -> Result<Libssh2Transport, TransportError> {
        let tcp = self.connect_tcp(host, port)?;

        let mut session = ssh2::Session::new().map_err(from_ssh2)?;
        if let Some(timeout) = self.timeout {
            session.set_timeout(timeout.as_millis().try_into().unwrap_or(u32::MAX));
        }
        session.set_tcp_stream(tcp);
        session.handshake().map_err(from_ssh2)?;

        #[cfg(feature = "tracing")]
        log_host_key(host, &session);

        Ok(Libssh2Transport { session })
    }
}

#[cfg(feature = "tracing")]
fn log_host_key(host: &str, session: &ssh2::Session) {
    if let Some(hash) = session.host_key_hash(HashType::Sha256) {
        let fingerprint: Vec<_> = hash.iter().map(|byte| format!("{byte:02x}")).collect();
        tracing::debug!(host, fingerprint = %fingerprint.join(":"), "handshake complete");
    }
}

/// Adapts a [`KeyboardInteractivePrompt`] to the one libssh2 calls.
struct PromptAdapter<'p>(&'p mut dyn KeyboardInteractivePrompt);

impl ssh2::KeyboardInteractivePrompt for PromptAdapter<'_> {
    fn prompt<'a>(
        &mut self,
        username: &str,
        instructions: &str,
        prompts: &[ssh2::Prompt<'a>],
    ) -> Vec<String> {
        let prompts: Vec<_> = prompts
            .iter()
            .map(|prompt| Prompt {
                text: Cow::Borrowed(prompt.text.as_ref()),
                echo: prompt.echo,
            })
            .collect();

        self.0.prompt(username, instructions, &prompts)
    }
}

/// A libssh2 session.
pub struct Libssh2Transport {
    session: ssh2::Session,
}

impl Libssh2Transport {
    /// libssh2 reports success for a partial success too.
    fn check_authenticated(&self) -> Result<(), TransportError> {
        if self.session.authenticated() {
            Ok(())
        } else {
            Err(TransportError::session(
                crate::auth::AUTHENTICATION_FAILED,
                "server requires further authentication",
            ))
        }
    }
}

impl Transport for Libssh2Transport {
    type Sftp = Libssh2Sftp;

    fn auth_methods(&mut self, username: &str) -> Result<Vec<AuthMethod>, TransportError> {
        match self.session.auth_methods(username) {
            Ok(methods) => Ok(AuthMethod::parse_list(methods)),
            // libssh2 fails the query once the `none` method succeeded.
            Err(_) if self.session.authenticated() => Ok(Vec::new()),
            Err(err) => Err(from_ssh2(err)),
        }
    }

    fn authenticated(&self) -> bool {
        self.session.authenticated()
    }

    fn userauth_password(&mut self, username: &str, password: &str) -> Result<(), TransportError> {
        self.session
            .userauth_password(username, password)
            .map_err(from_ssh2)?;
        self.check_authenticated()
    }

    fn userauth_keyboard_interactive(
        &mut self,
        username: &str,
        prompter: &mut dyn KeyboardInteractivePrompt,
    ) -> Result<(), TransportError> {
        self.session
            .userauth_keyboard_interactive(username, &mut PromptAdapter(prompter))
            .map_err(from_ssh2)?;
        self.check_authenticated()
    }

    fn userauth_pubkey(&mut self, username: &str, key: &KeyPair) -> Result<(), TransportError> {
        self.session
            .userauth_pubkey_file(
                username,
                key.public_key.as_deref(),
                &key.private_key,
                key.passphrase.as_deref(),
            )
            .map_err(pubkey_error)?;
        self.check_authenticated()
    }

    fn open_sftp(&mut self) -> Result<Libssh2Sftp, TransportError> {
        self.session
            .sftp()
            .map(|sftp| Libssh2Sftp { sftp })
            .map_err(from_ssh2)
    }

    fn shutdown_sftp(&mut self, sftp: Libssh2Sftp) -> Result<(), TransportError> {
        // Dropping the handle shuts the subsystem down and frees the channel.
        drop(sftp);
        Ok(())
    }

    fn disconnect(&mut self, description: &str) -> Result<(), TransportError> {
        self.session
            .disconnect(None, description, None)
            .map_err(from_ssh2)
    }
}

/// A libssh2 sftp channel.
pub struct Libssh2Sftp {
    sftp: ssh2::Sftp,
}

impl SftpHandle for Libssh2Sftp {
    type File = ssh2::File;
    type Dir = ssh2::File;

    fn open_dir(&mut self, path: &Path) -> Result<ssh2::File, TransportError> {
        self.sftp.opendir(path).map_err(from_ssh2)
    }

    fn read_dir(&mut self, dir: &mut ssh2::File) -> Result<Option<NameEntry>, TransportError> {
        match dir.readdir() {
            Ok((filename, stat)) => Ok(Some(NameEntry {
                filename: filename.to_string_lossy().into_owned(),
                // libssh2 drops the long name.
                longname: None,
                attrs: to_attrs(&stat),
            })),
            Err(err) if matches!(err.code(), ErrorCode::Session(LIBSSH2_ERROR_FILE)) => Ok(None),
            Err(err) => Err(from_ssh2(err)),
        }
    }

    fn close_dir(&mut self, mut dir: ssh2::File) -> Result<(), TransportError> {
        dir.close().map_err(from_ssh2)
    }

    fn stat(&mut self, path: &Path) -> Result<FileAttrs, TransportError> {
        self.sftp.stat(path).map(|stat| to_attrs(&stat)).map_err(from_ssh2)
    }

    fn lstat(&mut self, path: &Path) -> Result<FileAttrs, TransportError> {
        self.sftp.lstat(path).map(|stat| to_attrs(&stat)).map_err(from_ssh2)
    }

    fn rename(&mut self, from: &Path, to: &Path) -> Result<(), TransportError> {
        // Without OVERWRITE, so an existing target makes the rename fail.
        self.sftp
            .rename(from, to, Some(RenameFlags::ATOMIC | RenameFlags::NATIVE))
            .map_err(from_ssh2)
    }

    fn unlink(&mut self, path: &Path) -> Result<(), TransportError> {
        self.sftp.unlink(path).map_err(from_ssh2)
    }

    fn rmdir(&mut self, path: &Path) -> Result<(), TransportError> {
        self.sftp.rmdir(path).map_err(from_ssh2)
    }

    fn mkdir(&mut self, path: &Path, mode: u32) -> Result<(), TransportError> {
        self.sftp.mkdir(path, mode as i32).map_err(from_ssh2)
    }

    fn realpath(&mut self, path: &Path) -> Result<PathBuf, TransportError> {
        self.sftp.realpath(path).map_err(from_ssh2)
    }

    fn readlink(&mut self, path: &Path) -> Result<PathBuf, TransportError> {
        self.sftp.readlink(path).map_err(from_ssh2)
    }

    fn open(
        &mut self,
        path: &Path,
        flags: OpenFlags,
        mode: u32,
    ) -> Result<ssh2::File, TransportError> {
        let mut open_flags = ssh2::OpenFlags::empty();
        if flags.read {
            open_flags |= ssh2::OpenFlags::READ;
        }
        if flags.write {
            open_flags |= ssh2::OpenFlags::WRITE;
        }
        if flags.append {
            open_flags |= ssh2::OpenFlags::APPEND;
        }
        if flags.create {
            open_flags |= ssh2::OpenFlags::CREATE;
        }
        if flags.truncate {
            open_flags |= ssh2::OpenFlags::TRUNCATE;
        }
        if flags.exclusive {
            open_flags |= ssh2::OpenFlags::EXCLUSIVE;
        }

        self.sftp
            .open_mode(path, open_flags, mode as i32, OpenType::File)
            .map_err(from_ssh2)
    }

    fn read(
        &mut self,
        file: &mut ssh2::File,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<usize, TransportError> {
        file.seek(SeekFrom::Start(offset))?;
        Ok(file.read(buf)?)
    }

    fn write(
        &mut self,
        file: &mut ssh2::File,
        offset: u64,
        buf: &[u8],
    ) -> Result<usize, TransportError> {
        file.seek(SeekFrom::Start(offset))?;
        Ok(file.write(buf)?)
    }

    fn fstat(&mut self, file: &mut ssh2::File) -> Result<FileAttrs, TransportError> {
        file.stat().map(|stat| to_attrs(&stat)).map_err(from_ssh2)
    }

    fn close(&mut self, mut file: ssh2::File) -> Result<(), TransportError> {
        file.close().map_err(from_ssh2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TransportErrorCode;

    #[test]
    fn sftp_status_codes_are_mapped() {
        let err = from_ssh2(ssh2::Error::new(ErrorCode::SFTP(2), "no such file"));
        assert_eq!(err.sftp_kind(), Some(SftpErrorKind::NoSuchFile));

        let err = from_ssh2(ssh2::Error::new(ErrorCode::Session(-18), "auth failed"));
        assert_eq!(err.sftp_kind(), None);
        assert_eq!(err.message(), "auth failed");
    }

    #[test]
    fn unreadable_key_is_rejected_like_a_refused_one() {
        let err = pubkey_error(ssh2::Error::new(
            ErrorCode::Session(LIBSSH2_ERROR_FILE),
            "Unable to extract public key from private key file: Wrong passphrase or invalid/unrecognized private key file format",
        ));
        assert_eq!(
            err.code(),
            TransportErrorCode::Session(crate::auth::PUBLICKEY_UNVERIFIED)
        );

        let err = pubkey_error(ssh2::Error::new(ErrorCode::Session(-18), "auth failed"));
        assert_eq!(err.code(), TransportErrorCode::Session(-18));
    }

    #[test]
    fn file_stat_times_are_kept() {
        let stat = FileStat {
            size: Some(767),
            uid: Some(1001),
            gid: Some(0),
            perm: Some(0o100644),
            atime: Some(1_134_036_000),
            mtime: Some(1_134_036_000),
        };

        let attrs = to_attrs(&stat);
        assert_eq!(attrs.get_size(), Some(767));
        assert_eq!(attrs.get_id(), Some((1001, 0)));
        assert_eq!(attrs.get_modified(), Some(UnixTimeStamp::from_raw(1_134_036_000)));
    }
}
