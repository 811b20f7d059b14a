use crate::{
    constants::DEFAULT_DIR_MODE,
    file::{File, OpenMode},
    lowlevel::{SftpHandle, Transport},
    metadata::{FileType, MetaData},
    utils::{path_error, ResultExt},
    Error, SftpChannel, SftpErrorKind,
};

use std::borrow::Cow;
use std::fmt;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::BytesMut;

mod dir;
pub use dir::DirEntry;

mod remove;

mod rename;

/// A struct used to perform operations on remote filesystem.
///
/// Every operation takes the session lock once per underlying transport
/// call. Composite operations such as [`Fs::remove_all`] and
/// [`Fs::rename`] therefore interleave with other operations sharing the
/// session instead of running atomically.
pub struct Fs<T: Transport> {
    channel: Arc<SftpChannel<T>>,
    cwd: Box<Path>,
}

impl<T: Transport> Clone for Fs<T> {
    fn clone(&self) -> Self {
        Self {
            channel: Arc::clone(&self.channel),
            cwd: self.cwd.clone(),
        }
    }
}

impl<T: Transport> fmt::Debug for Fs<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fs")
            .field("channel", &self.channel)
            .field("cwd", &self.cwd)
            .finish()
    }
}

impl<T: Transport> Fs<T> {
    pub(crate) fn new(channel: Arc<SftpChannel<T>>) -> Self {
        Self {
            channel,
            cwd: Path::new("").into(),
        }
    }

    /// The channel every operation goes through.
    pub fn channel(&self) -> &Arc<SftpChannel<T>> {
        &self.channel
    }

    /// Return current working dir.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Set current working dir.
    ///
    /// * `cwd` - Can include `~`.
    ///           If it is empty, then it is set to use the default
    ///           directory set by the remote `sftp-server`.
    pub fn set_cwd(&mut self, cwd: impl AsRef<Path>) {
        self.cwd = cwd.as_ref().into();
    }

    fn concat_path_if_needed<'path>(&self, path: &'path Path) -> Cow<'path, Path> {
        if path.is_absolute() || self.cwd.as_os_str().is_empty() {
            Cow::Borrowed(path)
        } else {
            Cow::Owned(self.cwd.join(path))
        }
    }

    /// `lstat` that reports a missing path as `None`.
    fn lstat_if_exists(&self, path: &Path) -> Result<Option<MetaData>, Error> {
        let res = self.channel.acquire_lock().lstat(path);

        match res {
            Ok(attrs) => Ok(Some(MetaData::new(attrs))),
            Err(err) if err.sftp_kind() == Some(SftpErrorKind::NoSuchFile) => Ok(None),
            Err(err) => Err(path_error(path, err)),
        }
    }

    /// Queries the file type of `path` without following symlinks.
    fn file_type_of(&self, path: &Path, known: Option<FileType>) -> Result<Option<FileType>, Error> {
        match known {
            Some(file_type) => Ok(Some(file_type)),
            None => {
                let attrs = self.channel.acquire_lock().lstat(path).at_path(path)?;
                Ok(MetaData::new(attrs).file_type())
            }
        }
    }

    /// Queries metadata of `path`.
    ///
    /// * `follow_links` - whether the metadata of a symlink or of its
    ///   target is returned.
    pub fn stat(&self, path: impl AsRef<Path>, follow_links: bool) -> Result<MetaData, Error> {
        let path = self.concat_path_if_needed(path.as_ref());

        let res = {
            let mut guard = self.channel.acquire_lock();
            if follow_links {
                guard.stat(&path)
            } else {
                guard.lstat(&path)
            }
        };

        res.at_path(&path).map(MetaData::new)
    }

    /// Queries metadata of `path`, following symlinks.
    pub fn metadata(&self, path: impl AsRef<Path>) -> Result<MetaData, Error> {
        self.stat(path, true)
    }

    /// Queries metadata of `path`, not following symlinks.
    pub fn symlink_metadata(&self, path: impl AsRef<Path>) -> Result<MetaData, Error> {
        self.stat(path, false)
    }

    /// Returns the canonical, absolute form of a path with all intermediate
    /// components normalized and symbolic links resolved.
    pub fn canonicalize(&self, path: impl AsRef<Path>) -> Result<PathBuf, Error> {
        let path = self.concat_path_if_needed(path.as_ref());
        let res = self.channel.acquire_lock().realpath(&path);
        res.at_path(&path)
    }

    /// Reads a symbolic link, returning the file that the link points to.
    pub fn read_link(&self, path: impl AsRef<Path>) -> Result<PathBuf, Error> {
        let path = self.concat_path_if_needed(path.as_ref());
        let res = self.channel.acquire_lock().readlink(&path);
        res.at_path(&path)
    }

    /// Resolve the symlink at `path` to the absolute path of its target.
    ///
    /// A relative target is interpreted against the directory holding the
    /// link.
    pub fn resolve_link(&self, path: impl AsRef<Path>) -> Result<PathBuf, Error> {
        let path = self.concat_path_if_needed(path.as_ref());

        let target = self.channel.acquire_lock().readlink(&path).at_path(&path)?;

        let target = if target.is_absolute() {
            target
        } else {
            path.parent().unwrap_or_else(|| Path::new("")).join(target)
        };

        let res = self.channel.acquire_lock().realpath(&target);
        res.at_path(&target)
    }

    /// Create one directory level at `path`.
    ///
    /// Fails with [`Error::AlreadyExists`] if anything exists at `path`,
    /// leaving it untouched, and with [`Error::NotFound`] if the parent
    /// directory does not exist.
    pub fn create_new_directory(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = self.concat_path_if_needed(path.as_ref());

        let res = self.channel.acquire_lock().mkdir(&path, DEFAULT_DIR_MODE);
        let err = match res {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };

        match err.sftp_kind() {
            Some(SftpErrorKind::FileAlreadyExists) => Err(Error::AlreadyExists {
                path: path.into_owned(),
            }),
            // sftp v3 servers only have the generic failure status for this.
            Some(SftpErrorKind::Failure)
                if matches!(self.lstat_if_exists(&path), Ok(Some(_))) =>
            {
                Err(Error::AlreadyExists {
                    path: path.into_owned(),
                })
            }
            _ => Err(path_error(&path, err)),
        }
    }

    /// Creates a new, empty directory at the provided path.
    ///
    /// Unlike [`Fs::create_new_directory`], the server's error is returned
    /// as is.
    pub fn create_dir(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = self.concat_path_if_needed(path.as_ref());
        let res = self.channel.acquire_lock().mkdir(&path, DEFAULT_DIR_MODE);
        res.at_path(&path)
    }

    /// Removes an existing, empty directory.
    pub fn remove_dir(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = self.concat_path_if_needed(path.as_ref());
        let res = self.channel.acquire_lock().rmdir(&path);
        res.at_path(&path)
    }

    /// Removes a file from remote filesystem.
    pub fn remove_file(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = self.concat_path_if_needed(path.as_ref());
        let res = self.channel.acquire_lock().unlink(&path);
        res.at_path(&path)
    }

    /// Open the file at `path` as a seekable stream.
    ///
    /// Opening a missing file read-only fails with [`Error::NotFound`];
    /// write modes create it.
    pub fn get_file(&self, path: impl AsRef<Path>, mode: OpenMode) -> Result<File<T>, Error> {
        let path = self.concat_path_if_needed(path.as_ref());
        File::open(Arc::clone(&self.channel), &path, mode)
    }

    /// Read the entire contents of a file.
    pub fn read(&self, path: impl AsRef<Path>) -> Result<BytesMut, Error> {
        let mut file = self.get_file(path, OpenMode::read())?;

        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        file.close()?;

        Ok(BytesMut::from(buffer.as_slice()))
    }

    /// Write a slice as the entire contents of a file, creating it if
    /// necessary.
    pub fn write(&self, path: impl AsRef<Path>, content: impl AsRef<[u8]>) -> Result<(), Error> {
        let mut file = self.get_file(path, OpenMode::write())?;

        file.write_all(content.as_ref())?;
        file.close()
    }
}
