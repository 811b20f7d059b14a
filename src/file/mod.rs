use super::{
    constants::DEFAULT_FILE_MODE,
    lowlevel::{OpenFlags, SftpHandle, Transport},
    metadata::MetaData,
    utils::{path_error, ResultExt},
    Error, SftpChannel, TransportError,
};

use std::cmp::min;
use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::BytesMut;

type FileHandle<T> = <<T as Transport>::Sftp as SftpHandle>::File;

/// How a remote file is opened by [`crate::fs::Fs::get_file`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct OpenMode {
    read: bool,
    write: bool,
    append: bool,
    create: bool,
    truncate: bool,
}

impl OpenMode {
    /// Read only. The file must exist.
    pub const fn read() -> Self {
        Self {
            read: true,
            write: false,
            append: false,
            create: false,
            truncate: false,
        }
    }

    /// Write only, creating the file if it does not exist and truncating it
    /// if it does.
    pub const fn write() -> Self {
        Self {
            read: false,
            write: true,
            append: false,
            create: true,
            truncate: true,
        }
    }

    /// Read and write, creating the file if it does not exist. Existing
    /// content is kept.
    pub const fn read_write() -> Self {
        Self {
            read: true,
            write: true,
            append: false,
            create: true,
            truncate: false,
        }
    }

    /// Sets the option for the append mode.
    ///
    /// Writes then always land at the end of the file and the stream starts
    /// positioned there. Existing content is never truncated in this mode.
    #[must_use]
    pub const fn append(mut self, append: bool) -> Self {
        self.append = append;
        if append {
            self.write = true;
            self.truncate = false;
        }
        self
    }

    /// Sets the option to create the file if it does not exist.
    #[must_use]
    pub const fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    /// Sets the option for truncating an existing file.
    #[must_use]
    pub const fn truncate(mut self, truncate: bool) -> Self {
        self.truncate = truncate;
        self
    }

    pub const fn is_readable(&self) -> bool {
        self.read
    }

    pub const fn is_writable(&self) -> bool {
        self.write
    }

    fn flags(&self) -> OpenFlags {
        OpenFlags {
            read: self.read,
            write: self.write,
            append: self.append,
            create: self.create,
            truncate: self.truncate && self.write,
            exclusive: false,
        }
    }
}

/// Name and size of a [`File`], as returned by [`File::stat`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StreamStat {
    /// Last component of the remote path.
    pub name: String,
    /// Current size in bytes.
    pub size: u64,
}

/// A remote file exposed as a seekable byte stream.
///
/// The stream position is kept here, since sftp has no notion of one: each
/// read and write request carries its offset. Data moves in chunks of at
/// most [`crate::SftpOptions::max_read_len`] and
/// [`crate::SftpOptions::max_write_len`] bytes and the session lock is held
/// for one chunk at a time, so other users of the session interleave
/// between chunks of a large transfer.
///
/// The remote handle is closed on drop. Use [`File::close`] to observe
/// errors on close.
pub struct File<T: Transport> {
    channel: Arc<SftpChannel<T>>,

    /// `None` only once closed.
    handle: Option<FileHandle<T>>,
    path: PathBuf,

    is_readable: bool,
    is_writable: bool,
    offset: u64,
}

impl<T: Transport> File<T> {
    pub(crate) fn open(
        channel: Arc<SftpChannel<T>>,
        path: &Path,
        mode: OpenMode,
    ) -> Result<Self, Error> {
        let res = channel
            .acquire_lock()
            .open(path, mode.flags(), DEFAULT_FILE_MODE);
        let handle = res.at_path(path)?;

        let mut file = Self {
            channel,
            handle: Some(handle),
            path: path.into(),
            is_readable: mode.read,
            is_writable: mode.write,
            offset: 0,
        };

        if mode.append {
            file.offset = file.len()?;
        }

        Ok(file)
    }

    /// Run one transport call on the file handle under the session lock.
    fn call<R>(
        &mut self,
        f: impl FnOnce(&mut T::Sftp, &mut FileHandle<T>) -> Result<R, TransportError>,
    ) -> Result<R, TransportError> {
        let handle = self
            .handle
            .as_mut()
            .expect("file handle is present until the file is closed");

        let mut guard = self.channel.acquire_lock();
        f(&mut guard, handle)
    }

    fn check_for_readable(&self) -> Result<(), io::Error> {
        if !self.is_readable {
            Err(io::Error::new(
                io::ErrorKind::Other,
                "This file is not opened for reading",
            ))
        } else {
            Ok(())
        }
    }

    fn check_for_writable(&self) -> Result<(), io::Error> {
        if !self.is_writable {
            Err(io::Error::new(
                io::ErrorKind::Other,
                "This file is not opened for writing",
            ))
        } else {
            Ok(())
        }
    }

    /// Remote path the file was opened with.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the offset of the file.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Queries metadata about the underlying file.
    pub fn metadata(&mut self) -> Result<MetaData, Error> {
        let res = self.call(|sftp, handle| sftp.fstat(handle));
        res.at_path(&self.path).map(MetaData::new)
    }

    fn len(&mut self) -> Result<u64, Error> {
        Ok(self.metadata()?.len().unwrap_or(0))
    }

    /// Name and current size of the file, queried from the server on every
    /// call.
    pub fn stat(&mut self) -> Result<StreamStat, Error> {
        let size = self.len()?;
        let name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(StreamStat { name, size })
    }

    /// * `n` - number of bytes to read in.
    ///
    /// Appends exactly `n` bytes to `buffer`, failing with
    /// [`io::ErrorKind::UnexpectedEof`] if the file ends first.
    pub fn read_all(&mut self, n: usize, mut buffer: BytesMut) -> Result<BytesMut, Error> {
        if n == 0 {
            return Ok(buffer);
        }

        let start = buffer.len();
        buffer.resize(start + n, 0);

        let mut filled = 0;
        while filled < n {
            match self.read(&mut buffer[start + filled..])? {
                0 => return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "").into()),
                read => filled += read,
            }
        }

        Ok(buffer)
    }

    /// Close the [`File`], surfacing any error the server reports.
    pub fn close(mut self) -> Result<(), Error> {
        match self.handle.take() {
            Some(handle) => {
                let res = self.channel.acquire_lock().close(handle);
                res.at_path(&self.path)
            }
            None => Ok(()),
        }
    }
}

/// Move `base` by `n`, failing on under- or overflow.
fn offset_by(base: u64, n: i64) -> Option<u64> {
    if n >= 0 {
        base.checked_add(n.unsigned_abs())
    } else {
        base.checked_sub(n.unsigned_abs())
    }
}

impl<T: Transport> Read for File<T> {
    /// Read chunk after chunk until `buf` is full or the file ends.
    ///
    /// An error before any byte arrived is returned with the offset left
    /// unchanged. An error after some bytes arrived ends the read early
    /// with what was read so far.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check_for_readable()?;

        let max_read_len = self.channel.options().get_max_read_len();
        let mut filled = 0;

        while filled < buf.len() {
            let end = min(buf.len(), filled + max_read_len);
            let offset = self.offset;

            match self.call(|sftp, handle| sftp.read(handle, offset, &mut buf[filled..end])) {
                Ok(0) => break,
                Ok(n) => {
                    filled += n;
                    self.offset += n as u64;
                }
                Err(err) if filled == 0 => return Err(path_error(&self.path, err).into()),
                Err(_err) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(?_err, filled, "read ended early");
                    break;
                }
            }
        }

        Ok(filled)
    }
}

impl<T: Transport> Write for File<T> {
    /// Write chunk after chunk.
    ///
    /// Like [`File::read`], an error after some chunks were written ends the
    /// write early with the number of bytes written.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check_for_writable()?;

        let max_write_len = self.channel.options().get_max_write_len();
        let mut written = 0;

        while written < buf.len() {
            let end = min(buf.len(), written + max_write_len);
            let offset = self.offset;

            match self.call(|sftp, handle| sftp.write(handle, offset, &buf[written..end])) {
                Ok(0) => break,
                Ok(n) => {
                    written += n;
                    self.offset += n as u64;
                }
                Err(err) if written == 0 => return Err(path_error(&self.path, err).into()),
                Err(_err) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(?_err, written, "write ended early");
                    break;
                }
            }
        }

        Ok(written)
    }

    /// Every chunk is sent as soon as it is written.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<T: Transport> Seek for File<T> {
    /// Only adjusts the local offset, since sftp protocol does not provide
    /// a seek request. [`SeekFrom::End`] queries the current size first.
    fn seek(&mut self, position: SeekFrom) -> io::Result<u64> {
        let offset = match position {
            SeekFrom::Start(pos) => Some(pos),
            SeekFrom::End(n) => offset_by(self.len()?, n),
            SeekFrom::Current(n) => offset_by(self.offset, n),
        };

        self.offset = offset.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "Seeking to a negative or overflowing position",
            )
        })?;

        Ok(self.offset)
    }
}

impl<T: Transport> fmt::Debug for File<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("File")
            .field("path", &self.path)
            .field("is_readable", &self.is_readable)
            .field("is_writable", &self.is_writable)
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Drop for File<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let res = self.channel.acquire_lock().close(handle);

            if let Err(_err) = res {
                #[cfg(feature = "tracing")]
                tracing::error!(?_err, path = ?self.path, "failed to close remote file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_never_wrap() {
        assert_eq!(offset_by(10, -4), Some(6));
        assert_eq!(offset_by(10, 4), Some(14));
        assert_eq!(offset_by(3, -4), None);
        assert_eq!(offset_by(u64::MAX, 1), None);
        assert_eq!(offset_by(0, i64::MIN), None);
    }

    #[test]
    fn write_mode_creates_and_truncates() {
        let flags = OpenMode::write().flags();
        assert!(flags.write && flags.create && flags.truncate);
        assert!(!flags.read);

        let flags = OpenMode::read().truncate(true).flags();
        assert!(!flags.truncate, "read only streams never truncate");

        let mode = OpenMode::read().append(true);
        assert!(mode.is_readable() && mode.is_writable());
    }
}
