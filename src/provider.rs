use crate::{
    file::{File, OpenMode},
    fs::{DirEntry, Fs},
    lowlevel::Transport,
    metadata::MetaData,
    Error,
};

use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};

/// Answer to [`OverwriteConfirmation::confirm_overwrite`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Overwrite {
    Allow,
    Deny,
}

/// Decides whether a rename may replace an existing entry.
pub trait OverwriteConfirmation {
    /// `from` is about to be renamed onto the existing `to`.
    fn confirm_overwrite(&mut self, from: &Path, to: &Path) -> Overwrite;
}

impl<F> OverwriteConfirmation for F
where
    F: FnMut(&Path, &Path) -> Overwrite,
{
    fn confirm_overwrite(&mut self, from: &Path, to: &Path) -> Overwrite {
        self(from, to)
    }
}

/// Operations a folder view needs from a remote filesystem.
pub trait Provider {
    /// Stream returned by [`Provider::get_file`].
    type Stream: Read + Write + Seek;

    /// Entries of the directory at `path`, without `.` and `..`.
    fn listing(&self, path: &Path) -> Result<Vec<DirEntry>, Error>;

    /// Rename `from` to `to`, asking `confirm` before replacing an
    /// existing `to`.
    ///
    /// Returns whether an existing `to` was replaced.
    fn rename(
        &self,
        confirm: &mut dyn OverwriteConfirmation,
        from: &Path,
        to: &Path,
    ) -> Result<bool, Error>;

    /// Remove `path` and everything below it.
    fn remove_all(&self, path: &Path) -> Result<(), Error>;

    /// Create the directory `path`, failing if anything exists there.
    fn create_new_directory(&self, path: &Path) -> Result<(), Error>;

    /// Open `path` as a stream.
    fn get_file(&self, path: &Path, mode: OpenMode) -> Result<Self::Stream, Error>;

    /// Metadata of `path`, of the link target if `follow_links` is set.
    fn stat(&self, path: &Path, follow_links: bool) -> Result<MetaData, Error>;

    /// Absolute path of the target of the symlink `path`.
    fn resolve_link(&self, path: &Path) -> Result<PathBuf, Error>;
}

impl<T: Transport> Provider for Fs<T> {
    type Stream = File<T>;

    fn listing(&self, path: &Path) -> Result<Vec<DirEntry>, Error> {
        Fs::listing(self, path)
    }

    fn rename(
        &self,
        confirm: &mut dyn OverwriteConfirmation,
        from: &Path,
        to: &Path,
    ) -> Result<bool, Error> {
        Fs::rename(self, from, to, confirm)
    }

    fn remove_all(&self, path: &Path) -> Result<(), Error> {
        Fs::remove_all(self, path)
    }

    fn create_new_directory(&self, path: &Path) -> Result<(), Error> {
        Fs::create_new_directory(self, path)
    }

    fn get_file(&self, path: &Path, mode: OpenMode) -> Result<Self::Stream, Error> {
        Fs::get_file(self, path, mode)
    }

    fn stat(&self, path: &Path, follow_links: bool) -> Result<MetaData, Error> {
        Fs::stat(self, path, follow_links)
    }

    fn resolve_link(&self, path: &Path) -> Result<PathBuf, Error> {
        Fs::resolve_link(self, path)
    }
}
